// 该文件是 Blueprint Detector （蓝图符号检测） 项目的一部分。
// src/main.rs - 检测服务主程序
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpListener;
use tracing::{info, warn};

use blueprint_detector::{
  args::ServeArgs,
  input::PdfiumRasterizer,
  model::{LabelMap, YoloBuilder},
  output::{Draw, S3BlobStore},
  server,
  task::DetectTask,
};

#[tokio::main]
async fn main() -> Result<()> {
  dotenv::dotenv().ok();
  tracing_subscriber::fmt::init();

  let args = ServeArgs::parse();
  let config = args.pipeline_config();

  info!("Blueprint Detector 检测服务");
  info!("模型文件路径: {}", args.model.display());
  info!("置信度阈值: {}", config.confidence_threshold);
  info!("NMS 阈值: {}", config.iou_threshold);

  // 存储配置不完整时直接退出
  let settings = args.s3.settings().context("对象存储配置无效")?;

  let labels = match LabelMap::from_toml_file(&args.labels) {
    Ok(labels) => labels,
    Err(e) => {
      warn!("无法读取类别文件 {}: {}，使用内置类别", args.labels.display(), e);
      LabelMap::default()
    }
  };
  info!("类别数: {}", labels.len());

  info!("正在加载模型...");
  let model = YoloBuilder::new(&args.model)
    .labels(labels)
    .confidence(config.confidence_threshold)
    .iou(config.iou_threshold)
    .input_size(args.input_size)
    .intra_threads(args.threads)
    .build()
    .with_context(|| format!("无法加载模型 {}", args.model.display()))?;
  info!("模型加载完成");

  let mut draw = Draw::new(args.label_colors());
  if let Some(path) = &args.font {
    match Draw::load_font(path) {
      Ok(font) => draw = draw.with_font(font),
      Err(e) => warn!("无法加载字体 {}: {}，使用内置字体", path.display(), e),
    }
  }
  if !draw.has_font() {
    warn!("没有可用字体，标注将不含文字");
  }

  let rasterizer = PdfiumRasterizer::new(args.pdfium_dir.clone());
  if let Err(e) = rasterizer.probe() {
    warn!("pdfium 不可用，PDF 上传将失败: {}", e);
  }

  let store = S3BlobStore::connect(&settings).await;

  let task = DetectTask::new(
    config,
    Arc::new(model),
    Arc::new(rasterizer),
    Arc::new(draw),
    Arc::new(store),
  );

  let listener = TcpListener::bind(args.listen)
    .await
    .with_context(|| format!("无法监听 {}", args.listen))?;
  server::serve(listener, server::router(task)).await?;

  info!("服务已停止");
  Ok(())
}
