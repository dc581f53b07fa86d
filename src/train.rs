// 该文件是 Blueprint Detector （蓝图符号检测） 项目的一部分。
// src/train.rs - 模型训练流程
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use std::{
  path::{Path, PathBuf},
  process::Command,
};

use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum TrainError {
  #[error("无法启动 {program}: {source}")]
  Spawn {
    program: String,
    source: std::io::Error,
  },
  #[error("{step} 步骤失败，退出码 {code:?}")]
  StepFailed { step: &'static str, code: Option<i32> },
  #[error("未找到导出的权重文件: {0}")]
  MissingWeights(PathBuf),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
}

/// 训练超参数，默认值与首次训练时使用的一致
#[derive(Debug, Clone, PartialEq)]
pub struct TrainPlan {
  /// Ultralytics 命令行程序
  pub yolo: String,
  pub base_model: String,
  pub data: PathBuf,
  pub epochs: u32,
  pub image_size: u32,
  pub batch: u32,
  pub device: String,
  pub patience: u32,
  pub project: PathBuf,
  pub name: String,
  pub optimizer: String,
  pub lr0: f32,
  pub augment: bool,
  /// 导出后的 ONNX 权重最终存放位置
  pub output: PathBuf,
}

impl Default for TrainPlan {
  fn default() -> Self {
    Self {
      yolo: "yolo".to_string(),
      base_model: "yolov8n.pt".to_string(),
      data: PathBuf::from("data.yaml"),
      epochs: 100,
      image_size: 640,
      batch: 16,
      device: "cpu".to_string(),
      patience: 20,
      project: PathBuf::from("runs/train"),
      name: "blueprint_detector".to_string(),
      optimizer: "AdamW".to_string(),
      lr0: 0.001,
      augment: true,
      output: PathBuf::from("best.onnx"),
    }
  }
}

fn flag(value: bool) -> &'static str {
  if value { "True" } else { "False" }
}

impl TrainPlan {
  pub fn weights_dir(&self) -> PathBuf {
    self.project.join(&self.name).join("weights")
  }

  pub fn best_weights(&self) -> PathBuf {
    self.weights_dir().join("best.pt")
  }

  pub fn exported_weights(&self) -> PathBuf {
    self.weights_dir().join("best.onnx")
  }

  pub fn train_args(&self) -> Vec<String> {
    vec![
      "detect".to_string(),
      "train".to_string(),
      format!("model={}", self.base_model),
      format!("data={}", self.data.display()),
      format!("epochs={}", self.epochs),
      format!("imgsz={}", self.image_size),
      format!("batch={}", self.batch),
      format!("device={}", self.device),
      format!("patience={}", self.patience),
      format!("project={}", self.project.display()),
      format!("name={}", self.name),
      "exist_ok=True".to_string(),
      "pretrained=True".to_string(),
      format!("optimizer={}", self.optimizer),
      format!("lr0={}", self.lr0),
      format!("augment={}", flag(self.augment)),
    ]
  }

  pub fn val_args(&self) -> Vec<String> {
    vec![
      "detect".to_string(),
      "val".to_string(),
      format!("model={}", self.best_weights().display()),
      format!("data={}", self.data.display()),
      format!("imgsz={}", self.image_size),
      format!("device={}", self.device),
    ]
  }

  pub fn export_args(&self) -> Vec<String> {
    vec![
      "export".to_string(),
      format!("model={}", self.best_weights().display()),
      "format=onnx".to_string(),
      format!("imgsz={}", self.image_size),
    ]
  }

  fn step(&self, step: &'static str, args: &[String]) -> Result<(), TrainError> {
    info!("{}: {} {}", step, self.yolo, args.join(" "));
    let status = Command::new(&self.yolo)
      .args(args)
      .status()
      .map_err(|source| TrainError::Spawn {
        program: self.yolo.clone(),
        source,
      })?;

    if !status.success() {
      return Err(TrainError::StepFailed {
        step,
        code: status.code(),
      });
    }
    Ok(())
  }

  /// 训练、验证、导出，并把导出的权重移动到服务使用的位置
  pub fn run(&self) -> Result<PathBuf, TrainError> {
    self.step("train", &self.train_args())?;
    self.step("val", &self.val_args())?;
    self.step("export", &self.export_args())?;

    let exported = self.exported_weights();
    if !exported.exists() {
      return Err(TrainError::MissingWeights(exported));
    }
    move_file(&exported, &self.output)?;
    info!("训练完成，模型已保存为 {}", self.output.display());
    Ok(self.output.clone())
  }
}

/// 跨文件系统时退化为复制后删除
fn move_file(from: &Path, to: &Path) -> Result<(), TrainError> {
  if let Some(parent) = to.parent()
    && !parent.as_os_str().is_empty()
  {
    std::fs::create_dir_all(parent)?;
  }

  if let Err(e) = std::fs::rename(from, to) {
    warn!("重命名失败 ({})，改为复制", e);
    std::fs::copy(from, to)?;
    std::fs::remove_file(from)?;
  }
  Ok(())
}
