// 该文件是 Blueprint Detector （蓝图符号检测） 项目的一部分。
// src/config.rs - 流水线配置
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

use std::collections::HashMap;

pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.3;
pub const DEFAULT_IOU_THRESHOLD: f32 = 0.45;
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;
pub const DEFAULT_PDF_DPI: f32 = 150.0;
pub const DEFAULT_MAX_INFLIGHT: usize = 4;
pub const DEFAULT_INPUT_SIZE: u32 = 640;
pub const DEFAULT_INTRA_THREADS: usize = 4;

const RED: [u8; 3] = [255, 0, 0];
const BLUE: [u8; 3] = [0, 0, 255];
const GREEN: [u8; 3] = [0, 255, 0];
const YELLOW: [u8; 3] = [255, 255, 0];

/// 单次检测请求所使用的参数
#[derive(Debug, Clone)]
pub struct PipelineConfig {
  /// 置信度阈值，低于该值的检测结果会被丢弃
  pub confidence_threshold: f32,
  /// NMS IoU 阈值
  pub iou_threshold: f32,
  /// 上传文件的最大字节数
  pub max_upload_bytes: usize,
  /// PDF 光栅化分辨率
  pub pdf_dpi: f32,
  /// 同时处理的最大请求数
  pub max_inflight: usize,
}

impl Default for PipelineConfig {
  fn default() -> Self {
    Self {
      confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
      iou_threshold: DEFAULT_IOU_THRESHOLD,
      max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
      pdf_dpi: DEFAULT_PDF_DPI,
      max_inflight: DEFAULT_MAX_INFLIGHT,
    }
  }
}

/// 标签到边框颜色的映射，未登记的标签使用默认颜色
#[derive(Debug, Clone)]
pub struct LabelColors {
  colors: HashMap<String, [u8; 3]>,
  fallback: [u8; 3],
}

impl Default for LabelColors {
  fn default() -> Self {
    let colors = [("evse", RED), ("panel", BLUE), ("gfi", GREEN)]
      .into_iter()
      .map(|(label, color)| (label.to_string(), color))
      .collect();

    Self {
      colors,
      fallback: YELLOW,
    }
  }
}

impl LabelColors {
  pub fn with_color(mut self, label: impl Into<String>, color: [u8; 3]) -> Self {
    self.colors.insert(label.into(), color);
    self
  }

  pub fn with_fallback(mut self, color: [u8; 3]) -> Self {
    self.fallback = color;
    self
  }

  pub fn color_of(&self, label: &str) -> [u8; 3] {
    self.colors.get(label).copied().unwrap_or(self.fallback)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn default_colors_follow_known_labels() {
    let colors = LabelColors::default();
    assert_eq!(colors.color_of("evse"), RED);
    assert_eq!(colors.color_of("panel"), BLUE);
    assert_eq!(colors.color_of("gfi"), GREEN);
    assert_eq!(colors.color_of("breaker"), YELLOW);
  }

  #[test]
  fn overrides_replace_defaults() {
    let colors = LabelColors::default()
      .with_color("evse", [1, 2, 3])
      .with_fallback([9, 9, 9]);
    assert_eq!(colors.color_of("evse"), [1, 2, 3]);
    assert_eq!(colors.color_of("unknown"), [9, 9, 9]);
  }

  #[test]
  fn pipeline_defaults() {
    let config = PipelineConfig::default();
    assert_eq!(config.max_upload_bytes, 10 * 1024 * 1024);
    assert_eq!(config.pdf_dpi, 150.0);
    assert!((config.confidence_threshold - 0.3).abs() < f32::EPSILON);
    assert!((config.iou_threshold - 0.45).abs() < f32::EPSILON);
  }
}
