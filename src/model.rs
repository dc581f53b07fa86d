// 该文件是 Blueprint Detector （蓝图符号检测） 项目的一部分。
// src/model.rs - 模型
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use image::RgbImage;
use serde::{Deserialize, Serialize};
use thiserror::Error;

mod labels;
mod yolo;

pub use self::labels::LabelMap;
pub use self::yolo::{Yolo, YoloBuilder};

#[derive(Error, Debug)]
pub enum ModelError {
  #[error("模型加载错误: {0}")]
  Load(String),
  #[error("推理错误: {0}")]
  Runtime(String),
  #[error("模型输出形状无效: {0:?}")]
  OutputShape(Vec<usize>),
  #[error("类别文件错误: {0}")]
  Labels(String),
}

/// 检测模型，输入整幅 RGB 图像，输出原图像素坐标下的检测框
pub trait Model: Send + Sync {
  fn infer(&self, image: &RgbImage) -> Result<DetectResult, ModelError>;
  fn labels(&self) -> &LabelMap;
}

#[derive(Debug, Clone, PartialEq)]
pub struct DetectItem {
  pub class_id: u32,
  pub score: f32,
  pub bbox: [f32; 4], // [x_min, y_min, x_max, y_max]，像素坐标
}

#[derive(Debug, Clone, Default)]
pub struct DetectResult {
  pub items: Box<[DetectItem]>,
}

impl DetectResult {
  pub fn new(items: Vec<DetectItem>) -> Self {
    Self {
      items: items.into_boxed_slice(),
    }
  }

  pub fn len(&self) -> usize {
    self.items.len()
  }

  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }

  /// 转换为响应中的检测记录：按阈值再过滤一次，置信度限制在 [0, 1]，
  /// 边框裁剪到图像范围内，顺序与模型输出一致
  pub fn to_detections(
    &self,
    labels: &LabelMap,
    threshold: f32,
    (width, height): (u32, u32),
  ) -> Vec<Detection> {
    let (w, h) = (width as f32, height as f32);

    self
      .items
      .iter()
      .filter(|item| item.score.is_finite() && item.score >= threshold)
      .map(|item| {
        let [x1, y1, x2, y2] = item.bbox;
        let (x1, x2) = (x1.clamp(0.0, w), x2.clamp(0.0, w));
        let (y1, y2) = (y1.clamp(0.0, h), y2.clamp(0.0, h));

        Detection {
          label: labels.name(item.class_id),
          confidence: item.score.clamp(0.0, 1.0),
          bbox: [x1.min(x2), y1.min(y2), x1.max(x2), y1.max(y2)],
        }
      })
      .collect()
  }
}

/// 单个检测结果，bbox 为 [x1, y1, x2, y2] 像素坐标
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
  pub label: String,
  pub confidence: f32,
  pub bbox: [f32; 4],
}

#[cfg(test)]
mod tests {
  use super::*;

  fn item(class_id: u32, score: f32, bbox: [f32; 4]) -> DetectItem {
    DetectItem {
      class_id,
      score,
      bbox,
    }
  }

  #[test]
  fn low_scores_are_dropped_and_order_is_kept() {
    let result = DetectResult::new(vec![
      item(1, 0.5, [0.0, 0.0, 5.0, 5.0]),
      item(0, 0.2, [0.0, 0.0, 5.0, 5.0]),
      item(0, 0.9, [1.0, 1.0, 4.0, 4.0]),
    ]);

    let detections = result.to_detections(&LabelMap::default(), 0.3, (10, 10));
    let labels: Vec<_> = detections.iter().map(|d| d.label.as_str()).collect();
    assert_eq!(labels, ["panel", "evse"]);
  }

  #[test]
  fn boxes_are_clamped_to_image() {
    let result = DetectResult::new(vec![item(2, 1.2, [-4.0, 3.0, 80.0, 120.0])]);

    let detections = result.to_detections(&LabelMap::default(), 0.3, (50, 60));
    assert_eq!(detections.len(), 1);
    assert_eq!(detections[0].label, "gfi");
    assert_eq!(detections[0].confidence, 1.0);
    assert_eq!(detections[0].bbox, [0.0, 3.0, 50.0, 60.0]);
  }

  #[test]
  fn nan_scores_are_dropped() {
    let result = DetectResult::new(vec![item(0, f32::NAN, [0.0, 0.0, 1.0, 1.0])]);
    assert!(
      result
        .to_detections(&LabelMap::default(), 0.0, (10, 10))
        .is_empty()
    );
  }
}
