// 该文件是 Blueprint Detector （蓝图符号检测） 项目的一部分。
// src/bin/train.rs - 训练检测模型并导出 ONNX
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing::info;

use blueprint_detector::train::TrainPlan;

/// 调用 Ultralytics 训练、验证并导出模型
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 数据集描述文件
  #[arg(long, default_value = "data.yaml", value_name = "FILE")]
  pub data: PathBuf,

  /// 预训练权重
  #[arg(long, default_value = "yolov8n.pt")]
  pub base_model: String,

  #[arg(long, default_value_t = 100)]
  pub epochs: u32,

  #[arg(long, default_value_t = 16)]
  pub batch: u32,

  #[arg(long, default_value = "cpu")]
  pub device: String,

  /// 导出模型的保存位置
  #[arg(long, default_value = "best.onnx", value_name = "FILE")]
  pub output: PathBuf,

  /// Ultralytics 命令行程序
  #[arg(long, env = "YOLO_BIN", default_value = "yolo")]
  pub yolo: String,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();
  let plan = TrainPlan {
    yolo: args.yolo,
    base_model: args.base_model,
    data: args.data,
    epochs: args.epochs,
    batch: args.batch,
    device: args.device,
    output: args.output,
    ..TrainPlan::default()
  };

  info!("数据集: {}", plan.data.display());
  info!("训练轮数: {}, 批大小: {}", plan.epochs, plan.batch);

  let model = plan.run()?;
  println!("Training complete. Model saved as {}", model.display());
  Ok(())
}
