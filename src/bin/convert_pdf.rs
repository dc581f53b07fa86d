// 该文件是 Blueprint Detector （蓝图符号检测） 项目的一部分。
// src/bin/convert_pdf.rs - PDF 转训练数据集图像
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use image::ImageFormat;
use tracing::{error, info};

use blueprint_detector::{
  config::DEFAULT_PDF_DPI,
  input::{PageSelection, PdfiumRasterizer, Rasterizer, dataset_image_name},
};

/// 将 PDF 每一页转换为 JPEG 图像
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 源 PDF 文件
  #[arg(long, default_value = "The Egyptian EV - Sample Data.pdf", value_name = "FILE")]
  pub pdf: PathBuf,

  /// 输出目录
  #[arg(long, default_value = "dataset/train/images", value_name = "DIR")]
  pub output: PathBuf,

  /// 光栅化分辨率
  #[arg(long, default_value_t = DEFAULT_PDF_DPI)]
  pub dpi: f32,

  /// 文件名前缀
  #[arg(long, default_value = "E")]
  pub prefix: String,

  /// 第一页的序号
  #[arg(long, default_value_t = 3)]
  pub start: usize,

  /// pdfium 动态库所在目录
  #[arg(long, env = "PDFIUM_DYNAMIC_LIB_PATH", value_name = "DIR")]
  pub pdfium_dir: Option<PathBuf>,
}

fn convert(args: &Args) -> Result<usize> {
  std::fs::create_dir_all(&args.output)
    .with_context(|| format!("无法创建输出目录 {}", args.output.display()))?;

  let document =
    std::fs::read(&args.pdf).with_context(|| format!("无法读取 {}", args.pdf.display()))?;

  let rasterizer = PdfiumRasterizer::new(args.pdfium_dir.clone());
  let pages = rasterizer.rasterize(&document, args.dpi, PageSelection::All)?;

  for (offset, page) in pages.iter().enumerate() {
    let path = args
      .output
      .join(dataset_image_name(&args.prefix, args.start + offset));
    page
      .save_with_format(&path, ImageFormat::Jpeg)
      .with_context(|| format!("无法保存 {}", path.display()))?;
    println!("Saved image: {}", path.display());
  }

  Ok(pages.len())
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();
  info!("源文件: {}", args.pdf.display());
  info!("输出目录: {}", args.output.display());

  match convert(&args) {
    Ok(count) => {
      info!("转换完成，共 {} 页", count);
      Ok(())
    }
    Err(e) => {
      error!("转换失败: {:#}", e);
      Err(e)
    }
  }
}
