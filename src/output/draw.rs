// 该文件是 Blueprint Detector （蓝图符号检测） 项目的一部分。
// src/output/draw.rs - 目标检测结果可视化
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::path::Path;

use ab_glyph::{FontArc, PxScale};
use image::{Rgb, RgbImage};
use imageproc::{
  drawing::{draw_hollow_rect_mut, draw_text_mut},
  rect::Rect,
};
use thiserror::Error;
use tracing::{info, warn};

use crate::{config::LabelColors, model::Detection};

// 默认字体
const EMBEDDED_FONT: &[u8] = include_bytes!("../../assets/DejaVuSans.ttf");

// 文本渲染常量
const LABEL_FONT_SIZE: f32 = 16.0;
const LABEL_TEXT_HEIGHT: i32 = 20;
const BOX_LINE_WIDTH: u32 = 2;

#[derive(Error, Debug)]
pub enum DrawError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("字体无效: {0}")]
  InvalidFont(#[from] ab_glyph::InvalidFont),
}

/// 标注后的图像
#[derive(Debug, Clone)]
pub struct Annotated {
  pub image: RgbImage,
  /// 实际绘制的边框数量
  pub rectangles: usize,
}

pub struct Draw {
  font: Option<FontArc>,
  font_size: f32,
  label_text_height: i32,
  line_width: u32,
  colors: LabelColors,
}

impl Default for Draw {
  fn default() -> Self {
    Self::new(LabelColors::default())
  }
}

impl Draw {
  pub fn new(colors: LabelColors) -> Self {
    let font = match FontArc::try_from_slice(EMBEDDED_FONT) {
      Ok(font) => Some(font),
      Err(e) => {
        warn!("内置字体无效: {}，标注将不含文字", e);
        None
      }
    };

    Self {
      font,
      font_size: LABEL_FONT_SIZE,
      label_text_height: LABEL_TEXT_HEIGHT,
      line_width: BOX_LINE_WIDTH,
      colors,
    }
  }

  pub fn with_font(mut self, font: FontArc) -> Self {
    self.font = Some(font);
    self
  }

  pub fn has_font(&self) -> bool {
    self.font.is_some()
  }

  pub fn load_font(path: impl AsRef<Path>) -> Result<FontArc, DrawError> {
    let path = path.as_ref();
    let data = std::fs::read(path)?;
    let font = FontArc::try_from_vec(data)?;
    info!("加载字体: {}", path.display());
    Ok(font)
  }

  /// 在原图副本上按顺序绘制全部检测结果，后绘制的覆盖先绘制的
  pub fn annotate(&self, image: &RgbImage, detections: &[Detection]) -> Annotated {
    let mut canvas = image.clone();
    let rectangles = detections
      .iter()
      .filter(|detection| self.draw_bbox_with_label(&mut canvas, detection))
      .count();

    Annotated {
      image: canvas,
      rectangles,
    }
  }

  // bbox 为像素坐标 [x_min, y_min, x_max, y_max]，返回是否绘制了边框
  // 贴边或退化的框至少绘制 1 像素，保证每个检测结果都有对应边框
  fn draw_bbox_with_label(&self, image: &mut RgbImage, detection: &Detection) -> bool {
    let (w, h) = (image.width() as i32, image.height() as i32);
    if w == 0 || h == 0 {
      return false;
    }

    let [x1, y1, x2, y2] = detection.bbox;
    let x_min = (x1.floor() as i32).clamp(0, w - 1);
    let y_min = (y1.floor() as i32).clamp(0, h - 1);
    let x_max = (x2.ceil() as i32).clamp(x_min, w - 1);
    let y_max = (y2.ceil() as i32).clamp(y_min, h - 1);

    let color = Rgb(self.colors.color_of(&detection.label));

    // 向内逐像素收缩以加粗边框
    for inset in 0..self.line_width as i32 {
      let width = x_max - x_min + 1 - 2 * inset;
      let height = y_max - y_min + 1 - 2 * inset;
      if width <= 0 || height <= 0 {
        break;
      }
      let rect = Rect::at(x_min + inset, y_min + inset).of_size(width as u32, height as u32);
      draw_hollow_rect_mut(image, rect, color);
    }

    if let Some(font) = &self.font {
      let caption = format!("{} {:.2}", detection.label, detection.confidence);
      let label_y = (y_min - self.label_text_height).max(0);
      draw_text_mut(
        image,
        color,
        x_min,
        label_y,
        PxScale::from(self.font_size),
        font,
        &caption,
      );
    }

    true
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn detection(label: &str, confidence: f32, bbox: [f32; 4]) -> Detection {
    Detection {
      label: label.to_string(),
      confidence,
      bbox,
    }
  }

  // 不绘制文字，便于逐像素断言
  fn boxes_only() -> Draw {
    Draw {
      font: None,
      ..Draw::default()
    }
  }

  #[test]
  fn embedded_font_is_loaded_by_default() {
    assert!(Draw::default().has_font());
    assert!(!boxes_only().has_font());
  }

  #[test]
  fn caption_is_drawn_above_the_box() {
    let source = RgbImage::new(80, 80);
    let detections = [detection("evse", 0.91, [10.0, 40.0, 60.0, 70.0])];

    let annotated = Draw::default().annotate(&source, &detections);
    let caption_pixels = (0..38)
      .flat_map(|y| (0..80).map(move |x| (x, y)))
      .filter(|&(x, y)| annotated.image.get_pixel(x, y).0 != [0, 0, 0])
      .count();
    assert!(caption_pixels > 0);

    let plain = boxes_only().annotate(&source, &detections);
    assert!(
      (0..38).all(|y| (0..80).all(|x| plain.image.get_pixel(x, y).0 == [0, 0, 0]))
    );
  }

  #[test]
  fn draws_one_rectangle_per_detection() {
    let source = RgbImage::new(50, 50);
    let detections = [
      detection("evse", 0.91, [10.0, 10.0, 30.0, 30.0]),
      detection("breaker", 0.5, [35.0, 5.0, 45.0, 15.0]),
    ];

    let annotated = boxes_only().annotate(&source, &detections);

    assert_eq!(annotated.rectangles, 2);
    assert_eq!(annotated.image.get_pixel(10, 10).0, [255, 0, 0]);
    assert_eq!(annotated.image.get_pixel(30, 20).0, [255, 0, 0]);
    // 第二像素宽度
    assert_eq!(annotated.image.get_pixel(11, 20).0, [255, 0, 0]);
    assert_eq!(annotated.image.get_pixel(20, 20).0, [0, 0, 0]);
    // 未登记标签使用默认颜色
    assert_eq!(annotated.image.get_pixel(35, 10).0, [255, 255, 0]);
  }

  #[test]
  fn source_image_is_untouched() {
    let source = RgbImage::new(20, 20);
    let detections = [detection("gfi", 0.4, [2.0, 2.0, 8.0, 8.0])];

    let annotated = boxes_only().annotate(&source, &detections);
    assert_eq!(annotated.image.get_pixel(2, 2).0, [0, 255, 0]);

    Draw::default().annotate(&source, &detections);
    assert!(source.pixels().all(|p| p.0 == [0, 0, 0]));
  }

  #[test]
  fn later_detections_paint_over_earlier_ones() {
    let source = RgbImage::new(20, 20);
    let detections = [
      detection("evse", 0.9, [2.0, 2.0, 10.0, 10.0]),
      detection("panel", 0.8, [2.0, 2.0, 10.0, 10.0]),
    ];

    let annotated = boxes_only().annotate(&source, &detections);
    assert_eq!(annotated.rectangles, 2);
    assert_eq!(annotated.image.get_pixel(2, 2).0, [0, 0, 255]);
  }

  #[test]
  fn edge_and_degenerate_boxes_are_still_drawn() {
    let source = RgbImage::new(50, 50);
    let detections = [
      // 贴右边缘
      detection("evse", 0.9, [49.2, 10.0, 50.0, 30.0]),
      // 贴下边缘
      detection("panel", 0.8, [10.0, 50.0, 20.0, 50.0]),
      // 零宽度
      detection("gfi", 0.7, [5.0, 5.0, 5.0, 12.0]),
    ];

    let annotated = boxes_only().annotate(&source, &detections);
    assert_eq!(annotated.rectangles, detections.len());
    assert_eq!(annotated.image.get_pixel(49, 20).0, [255, 0, 0]);
    assert_eq!(annotated.image.get_pixel(15, 49).0, [0, 0, 255]);
    assert_eq!(annotated.image.get_pixel(5, 8).0, [0, 255, 0]);
  }

  #[test]
  fn missing_font_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    assert!(matches!(
      Draw::load_font(dir.path().join("missing.ttf")),
      Err(DrawError::IoError(_))
    ));

    let bogus = dir.path().join("bogus.ttf");
    std::fs::write(&bogus, b"not a font").unwrap();
    assert!(matches!(
      Draw::load_font(&bogus),
      Err(DrawError::InvalidFont(_))
    ));
  }
}
