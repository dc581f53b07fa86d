// 该文件是 Blueprint Detector （蓝图符号检测） 项目的一部分。
// src/args.rs - 项目参数配置
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::{net::SocketAddr, path::PathBuf};

use clap::Parser;

use crate::{
  config::{
    DEFAULT_CONFIDENCE_THRESHOLD, DEFAULT_INPUT_SIZE, DEFAULT_INTRA_THREADS,
    DEFAULT_IOU_THRESHOLD, DEFAULT_MAX_INFLIGHT, DEFAULT_MAX_UPLOAD_BYTES, DEFAULT_PDF_DPI,
    LabelColors, PipelineConfig,
  },
  output::{S3Settings, StorageError},
};

/// 对象存储参数，检测服务与存储自检工具共用
#[derive(clap::Args, Debug, Clone)]
pub struct S3Args {
  /// 存放标注图像的 S3 桶名称
  #[arg(long, env = "S3_BUCKET_NAME", value_name = "BUCKET")]
  pub bucket: String,

  /// 访问密钥 ID（不提供时使用默认凭证链）
  #[arg(long, env = "AWS_ACCESS_KEY_ID", hide_env_values = true)]
  pub access_key_id: Option<String>,

  /// 访问密钥
  #[arg(long, env = "AWS_SECRET_ACCESS_KEY", hide_env_values = true)]
  pub secret_access_key: Option<String>,

  /// 桶所在区域
  #[arg(long, env = "AWS_REGION", default_value = "us-east-1")]
  pub region: String,
}

impl S3Args {
  pub fn settings(&self) -> Result<S3Settings, StorageError> {
    S3Settings::new(
      &self.bucket,
      self.access_key_id.clone(),
      self.secret_access_key.clone(),
      &self.region,
    )
  }
}

/// 检测服务参数配置
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct ServeArgs {
  /// ONNX 模型文件路径
  #[arg(long, default_value = "best.onnx", value_name = "FILE")]
  pub model: PathBuf,

  /// 类别名称文件（TOML，包含 names 数组）
  #[arg(long, default_value = "labels/blueprint.toml", value_name = "FILE")]
  pub labels: PathBuf,

  /// 标注文字使用的字体文件（不提供时使用内置字体）
  #[arg(long, env = "DETECTOR_FONT", value_name = "FILE")]
  pub font: Option<PathBuf>,

  /// pdfium 动态库所在目录（不提供时使用系统库）
  #[arg(long, env = "PDFIUM_DYNAMIC_LIB_PATH", value_name = "DIR")]
  pub pdfium_dir: Option<PathBuf>,

  /// 监听地址
  #[arg(long, env = "DETECTOR_LISTEN", default_value = "0.0.0.0:8000")]
  pub listen: SocketAddr,

  /// 置信度阈值 (0.0 - 1.0)
  #[arg(long, default_value_t = DEFAULT_CONFIDENCE_THRESHOLD, value_name = "THRESHOLD")]
  pub confidence: f32,

  /// NMS IOU 阈值 (0.0 - 1.0)
  #[arg(long, default_value_t = DEFAULT_IOU_THRESHOLD, value_name = "THRESHOLD")]
  pub nms_threshold: f32,

  /// 模型输入边长
  #[arg(long, default_value_t = DEFAULT_INPUT_SIZE, value_name = "PIXELS")]
  pub input_size: u32,

  /// ONNX Runtime 单次推理的线程数
  #[arg(long, default_value_t = DEFAULT_INTRA_THREADS, value_name = "COUNT")]
  pub threads: usize,

  /// 上传文件大小上限（字节）
  #[arg(long, default_value_t = DEFAULT_MAX_UPLOAD_BYTES, value_name = "BYTES")]
  pub max_upload_bytes: usize,

  /// PDF 光栅化分辨率
  #[arg(long, default_value_t = DEFAULT_PDF_DPI, value_name = "DPI")]
  pub pdf_dpi: f32,

  /// 同时进行推理的最大请求数
  #[arg(long, default_value_t = DEFAULT_MAX_INFLIGHT, value_name = "COUNT")]
  pub max_inflight: usize,

  /// 自定义标签颜色，格式为 label=r,g,b，可重复
  #[arg(long = "label-color", value_name = "LABEL=R,G,B", value_parser = parse_label_color)]
  pub label_colors: Vec<(String, [u8; 3])>,

  #[command(flatten)]
  pub s3: S3Args,
}

impl ServeArgs {
  pub fn pipeline_config(&self) -> PipelineConfig {
    PipelineConfig {
      confidence_threshold: self.confidence.clamp(0.0, 1.0),
      iou_threshold: self.nms_threshold.clamp(0.0, 1.0),
      max_upload_bytes: self.max_upload_bytes,
      pdf_dpi: self.pdf_dpi,
      max_inflight: self.max_inflight.max(1),
    }
  }

  pub fn label_colors(&self) -> LabelColors {
    self
      .label_colors
      .iter()
      .fold(LabelColors::default(), |colors, (label, color)| {
        colors.with_color(label.clone(), *color)
      })
  }
}

fn parse_label_color(value: &str) -> Result<(String, [u8; 3]), String> {
  let (label, rgb) = value
    .split_once('=')
    .ok_or_else(|| format!("缺少 '=': {value}"))?;

  let channels = rgb
    .split(',')
    .map(|c| c.trim().parse::<u8>().map_err(|e| format!("颜色分量无效 '{c}': {e}")))
    .collect::<Result<Vec<_>, _>>()?;

  match channels.as_slice() {
    [r, g, b] => Ok((label.trim().to_string(), [*r, *g, *b])),
    _ => Err(format!("颜色需要 3 个分量: {rgb}")),
  }
}
