// 该文件是 Blueprint Detector （蓝图符号检测） 项目的一部分。
// src/input.rs - 上传文件输入
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

use image::RgbImage;
use thiserror::Error;
use tracing::debug;

mod decode;
mod pdf;

pub use self::decode::decode_image;
pub use self::pdf::{PageSelection, PdfiumRasterizer, Rasterizer, dataset_image_name};

pub const PDF_MEDIA_TYPE: &str = "application/pdf";

#[derive(Error, Debug)]
pub enum InputError {
  #[error("File size exceeds {}MB limit", .limit / (1024 * 1024))]
  TooLarge { size: usize, limit: usize },
  #[error("Unsupported file type: {0}")]
  UnsupportedType(String),
  #[error("Invalid image: {0}")]
  ImageDecode(#[from] image::ImageError),
  #[error("Invalid image: {0}")]
  IoError(#[from] std::io::Error),
  #[error("Invalid PDF: {0}")]
  InvalidPdf(String),
  #[error("PDF backend unavailable: {0}")]
  Backend(String),
}

/// 上传文件的媒体类别
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
  Image,
  Pdf,
}

impl MediaKind {
  /// 根据声明的 Content-Type 判断类别，忽略参数部分与大小写
  pub fn from_content_type(content_type: Option<&str>) -> Result<Self, InputError> {
    let raw = content_type.unwrap_or_default();
    let essence = raw
      .split(';')
      .next()
      .unwrap_or_default()
      .trim()
      .to_ascii_lowercase();

    if essence == PDF_MEDIA_TYPE {
      Ok(MediaKind::Pdf)
    } else if essence.starts_with("image/") {
      Ok(MediaKind::Image)
    } else if essence.is_empty() {
      Err(InputError::UnsupportedType("<none>".to_string()))
    } else {
      Err(InputError::UnsupportedType(raw.to_string()))
    }
  }
}

/// 已通过大小与类型校验的上传内容
#[derive(Debug, Clone)]
pub struct Upload {
  bytes: Vec<u8>,
  kind: MediaKind,
}

impl Upload {
  /// 校验上传内容：先检查大小，再检查声明的类型
  pub fn accept(
    bytes: Vec<u8>,
    content_type: Option<&str>,
    max_bytes: usize,
  ) -> Result<Self, InputError> {
    if bytes.len() > max_bytes {
      return Err(InputError::TooLarge {
        size: bytes.len(),
        limit: max_bytes,
      });
    }

    let kind = MediaKind::from_content_type(content_type)?;
    debug!("接受上传: {:?}, {} 字节", kind, bytes.len());
    Ok(Self { bytes, kind })
  }

  pub fn kind(&self) -> MediaKind {
    self.kind
  }

  /// 解码为 RGB 图像；PDF 仅取第一页
  pub fn into_image(self, rasterizer: &dyn Rasterizer, dpi: f32) -> Result<RgbImage, InputError> {
    match self.kind {
      MediaKind::Image => decode_image(&self.bytes),
      MediaKind::Pdf => rasterizer
        .rasterize(&self.bytes, dpi, PageSelection::First)?
        .into_iter()
        .next()
        .ok_or_else(|| InputError::InvalidPdf("document has no pages".to_string())),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  struct NoPdf;

  impl Rasterizer for NoPdf {
    fn rasterize(
      &self,
      _document: &[u8],
      _dpi: f32,
      _pages: PageSelection,
    ) -> Result<Vec<RgbImage>, InputError> {
      Ok(Vec::new())
    }
  }

  #[test]
  fn classifies_content_types() {
    assert_eq!(
      MediaKind::from_content_type(Some("image/png")).unwrap(),
      MediaKind::Image
    );
    assert_eq!(
      MediaKind::from_content_type(Some("IMAGE/JPEG")).unwrap(),
      MediaKind::Image
    );
    assert_eq!(
      MediaKind::from_content_type(Some("application/pdf; charset=binary")).unwrap(),
      MediaKind::Pdf
    );
    assert!(matches!(
      MediaKind::from_content_type(Some("text/plain")),
      Err(InputError::UnsupportedType(_))
    ));
    assert!(matches!(
      MediaKind::from_content_type(None),
      Err(InputError::UnsupportedType(_))
    ));
  }

  #[test]
  fn size_is_checked_before_type() {
    let err = Upload::accept(vec![0; 11], Some("text/plain"), 10).unwrap_err();
    assert!(matches!(err, InputError::TooLarge { size: 11, limit: 10 }));
  }

  #[test]
  fn size_limit_message_uses_megabytes() {
    let upload = Upload::accept(vec![0; 16], Some("image/png"), 10 * 1024 * 1024).unwrap();
    assert_eq!(upload.kind(), MediaKind::Image);

    let err = InputError::TooLarge {
      size: 11 * 1024 * 1024,
      limit: 10 * 1024 * 1024,
    };
    assert_eq!(err.to_string(), "File size exceeds 10MB limit");
  }

  #[test]
  fn pdf_without_pages_is_invalid() {
    let upload = Upload::accept(b"%PDF-1.4".to_vec(), Some(PDF_MEDIA_TYPE), 1024).unwrap();
    let err = upload.into_image(&NoPdf, 150.0).unwrap_err();
    assert!(matches!(err, InputError::InvalidPdf(_)));
  }
}
