// 该文件是 Blueprint Detector （蓝图符号检测） 项目的一部分。
// src/input/pdf.rs - PDF 光栅化输入
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

use std::path::PathBuf;

use image::RgbImage;
use pdfium_render::prelude::{PdfRenderConfig, Pdfium};
use tracing::{debug, info};

use super::InputError;

// PDF 用户空间单位为 1/72 英寸
const PDF_POINTS_PER_INCH: f32 = 72.0;

/// 需要光栅化的页面
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageSelection {
  /// 仅第一页（在线检测）
  First,
  /// 全部页面（离线生成数据集）
  All,
}

pub trait Rasterizer: Send + Sync {
  fn rasterize(
    &self,
    document: &[u8],
    dpi: f32,
    pages: PageSelection,
  ) -> Result<Vec<RgbImage>, InputError>;
}

/// 基于 pdfium 的光栅化器
///
/// pdfium 绑定不能跨线程共享，每次调用时重新绑定动态库。
#[derive(Debug, Clone, Default)]
pub struct PdfiumRasterizer {
  library_dir: Option<PathBuf>,
}

impl PdfiumRasterizer {
  pub fn new(library_dir: Option<PathBuf>) -> Self {
    Self { library_dir }
  }

  fn bind(&self) -> Result<Pdfium, InputError> {
    let bindings = match &self.library_dir {
      Some(dir) => {
        Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(dir))
      }
      None => Pdfium::bind_to_system_library(),
    }
    .map_err(|e| InputError::Backend(e.to_string()))?;

    Ok(Pdfium::new(bindings))
  }

  /// 检查 pdfium 动态库能否加载
  pub fn probe(&self) -> Result<(), InputError> {
    self.bind().map(|_| ())
  }
}

impl Rasterizer for PdfiumRasterizer {
  fn rasterize(
    &self,
    document: &[u8],
    dpi: f32,
    pages: PageSelection,
  ) -> Result<Vec<RgbImage>, InputError> {
    let pdfium = self.bind()?;
    let document = pdfium
      .load_pdf_from_byte_slice(document, None)
      .map_err(|e| InputError::InvalidPdf(e.to_string()))?;

    let total = document.pages().len() as usize;
    let wanted = match pages {
      PageSelection::First => total.min(1),
      PageSelection::All => total,
    };
    info!("PDF 共 {} 页，光栅化 {} 页 ({} DPI)", total, wanted, dpi);

    let config = PdfRenderConfig::new().scale_page_by_factor(dpi / PDF_POINTS_PER_INCH);

    let mut images = Vec::with_capacity(wanted);
    for (index, page) in document.pages().iter().take(wanted).enumerate() {
      let bitmap = page
        .render_with_config(&config)
        .map_err(|e| InputError::InvalidPdf(format!("page {}: {}", index + 1, e)))?;
      let image = bitmap.as_image().into_rgb8();
      debug!("第 {} 页: {}x{}", index + 1, image.width(), image.height());
      images.push(image);
    }

    if images.is_empty() {
      return Err(InputError::InvalidPdf("document has no pages".to_string()));
    }

    Ok(images)
  }
}

/// 数据集图像文件名，序号补零到三位
pub fn dataset_image_name(prefix: &str, index: usize) -> String {
  format!("{}{:03}.jpg", prefix, index)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn dataset_names_are_numbered() {
    assert_eq!(dataset_image_name("E", 3), "E003.jpg");
    assert_eq!(dataset_image_name("E", 12), "E012.jpg");
    assert_eq!(dataset_image_name("page-", 1234), "page-1234.jpg");
  }
}
