// 该文件是 Blueprint Detector （蓝图符号检测） 项目的一部分。
// src/input/decode.rs - 图像解码
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::io::Cursor;

use image::{ImageReader, RgbImage};
use tracing::debug;

use super::InputError;

/// 从内存解码图像，格式由内容推断；带透明通道的图像丢弃 alpha 转为 RGB
pub fn decode_image(bytes: &[u8]) -> Result<RgbImage, InputError> {
  let reader = ImageReader::new(Cursor::new(bytes)).with_guessed_format()?;
  debug!("图像格式: {:?}", reader.format());

  let image = reader.decode()?;
  debug!(
    "解码完成: {}x{}, {:?}",
    image.width(),
    image.height(),
    image.color()
  );

  Ok(image.into_rgb8())
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::{ImageFormat, Rgba, RgbaImage};

  #[test]
  fn rgba_png_is_normalized_to_rgb() {
    let mut source = RgbaImage::from_pixel(4, 3, Rgba([10, 20, 30, 0]));
    source.put_pixel(1, 1, Rgba([200, 100, 50, 255]));

    let mut encoded = Cursor::new(Vec::new());
    source.write_to(&mut encoded, ImageFormat::Png).unwrap();

    let image = decode_image(encoded.get_ref()).unwrap();
    assert_eq!(image.dimensions(), (4, 3));
    assert_eq!(image.get_pixel(0, 0).0, [10, 20, 30]);
    assert_eq!(image.get_pixel(1, 1).0, [200, 100, 50]);
  }

  #[test]
  fn garbage_is_rejected() {
    let err = decode_image(b"definitely not an image").unwrap_err();
    assert!(matches!(err, InputError::ImageDecode(_)));
  }
}
