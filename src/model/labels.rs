// 该文件是 Blueprint Detector （蓝图符号检测） 项目的一部分。
// src/model/labels.rs - 类别名称表
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::path::Path;

use serde::Deserialize;
use tracing::info;

use super::ModelError;

/// 训练数据集中的类别
const BLUEPRINT_CLASSES: [&str; 3] = ["evse", "panel", "gfi"];

/// 类别 ID 到名称的映射，与模型训练时的 names 一致
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LabelMap {
  names: Vec<String>,
}

impl Default for LabelMap {
  fn default() -> Self {
    Self::new(BLUEPRINT_CLASSES)
  }
}

impl LabelMap {
  pub fn new<I, S>(names: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    Self {
      names: names.into_iter().map(Into::into).collect(),
    }
  }

  pub fn from_toml_str(content: &str) -> Result<Self, ModelError> {
    let labels: LabelMap = toml::from_str(content).map_err(|e| ModelError::Labels(e.to_string()))?;
    if labels.names.is_empty() {
      return Err(ModelError::Labels("names 不能为空".to_string()));
    }
    Ok(labels)
  }

  pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ModelError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)
      .map_err(|e| ModelError::Labels(format!("{}: {}", path.display(), e)))?;
    let labels = Self::from_toml_str(&content)?;
    info!("加载类别文件 {}: {:?}", path.display(), labels.names);
    Ok(labels)
  }

  pub fn len(&self) -> usize {
    self.names.len()
  }

  pub fn is_empty(&self) -> bool {
    self.names.is_empty()
  }

  pub fn name(&self, class_id: u32) -> String {
    self
      .names
      .get(class_id as usize)
      .cloned()
      .unwrap_or_else(|| format!("class_{}", class_id))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_names_from_toml() {
    let labels = LabelMap::from_toml_str(r#"names = ["outlet", "switch"]"#).unwrap();
    assert_eq!(labels.len(), 2);
    assert_eq!(labels.name(1), "switch");
  }

  #[test]
  fn unknown_ids_get_placeholder() {
    assert_eq!(LabelMap::default().name(0), "evse");
    assert_eq!(LabelMap::default().name(7), "class_7");
  }

  #[test]
  fn empty_names_are_rejected() {
    assert!(LabelMap::from_toml_str("names = []").is_err());
    assert!(LabelMap::from_toml_str("labels = 3").is_err());
  }

  #[test]
  fn shipped_label_file_matches_defaults() {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("labels/blueprint.toml");
    assert_eq!(LabelMap::from_toml_file(path).unwrap(), LabelMap::default());
  }
}
