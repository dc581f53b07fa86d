// 该文件是 Blueprint Detector （蓝图符号检测） 项目的一部分。
// src/output/storage.rs - 标注图像上传
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

use std::io::Cursor;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::{
  Client,
  config::{Credentials, Region, retry::RetryConfig},
  error::ProvideErrorMetadata,
  primitives::ByteStream,
};
use image::{ImageFormat, RgbImage};
use thiserror::Error;
use tracing::{debug, info};
use url::Url;
use uuid::Uuid;

pub const OVERLAY_PREFIX: &str = "overlays/";
pub const PNG_CONTENT_TYPE: &str = "image/png";

#[derive(Error, Debug)]
pub enum StorageError {
  #[error("图像编码错误: {0}")]
  Encode(#[from] image::ImageError),
  #[error("URL 错误: {0}")]
  Url(#[from] url::ParseError),
  #[error("未配置存储桶名称")]
  MissingBucket,
  #[error("{operation} 失败: {code} - {message}")]
  Service {
    operation: &'static str,
    code: String,
    message: String,
  },
}

impl StorageError {
  fn service<E: ProvideErrorMetadata + std::fmt::Display>(operation: &'static str, err: E) -> Self {
    StorageError::Service {
      operation,
      code: err.code().unwrap_or("Unknown").to_string(),
      message: err
        .message()
        .map(str::to_string)
        .unwrap_or_else(|| err.to_string()),
    }
  }
}

/// 只写的对象存储
#[async_trait]
pub trait BlobStore: Send + Sync {
  async fn put(&self, key: &str, body: Vec<u8>, content_type: &str) -> Result<(), StorageError>;
  fn url_for(&self, key: &str) -> Result<Url, StorageError>;
}

/// 生成新的标注图像对象键
pub fn overlay_key() -> String {
  format!("{}{}.png", OVERLAY_PREFIX, Uuid::new_v4())
}

pub fn encode_png(image: &RgbImage) -> Result<Vec<u8>, StorageError> {
  let mut buffer = Cursor::new(Vec::new());
  image.write_to(&mut buffer, ImageFormat::Png)?;
  Ok(buffer.into_inner())
}

/// 公开访问地址：https://<bucket>.s3.amazonaws.com/<key>
pub fn public_url(bucket: &str, key: &str) -> Result<Url, StorageError> {
  let base = Url::parse(&format!("https://{}.s3.amazonaws.com/", bucket))?;
  Ok(base.join(key)?)
}

#[derive(Debug, Clone)]
pub struct S3Settings {
  bucket: String,
  access_key_id: Option<String>,
  secret_access_key: Option<String>,
  region: String,
}

impl S3Settings {
  pub fn new(
    bucket: &str,
    access_key_id: Option<String>,
    secret_access_key: Option<String>,
    region: &str,
  ) -> Result<Self, StorageError> {
    let bucket = bucket.trim();
    if bucket.is_empty() {
      return Err(StorageError::MissingBucket);
    }
    // 提前校验桶名能组成合法 URL
    public_url(bucket, OVERLAY_PREFIX)?;

    Ok(Self {
      bucket: bucket.to_string(),
      access_key_id,
      secret_access_key,
      region: region.to_string(),
    })
  }

  pub fn bucket(&self) -> &str {
    &self.bucket
  }
}

pub struct S3BlobStore {
  client: Client,
  bucket: String,
}

impl S3BlobStore {
  pub async fn connect(settings: &S3Settings) -> Self {
    let mut loader = aws_config::defaults(BehaviorVersion::latest())
      .region(Region::new(settings.region.clone()))
      .retry_config(RetryConfig::disabled());

    if let (Some(id), Some(secret)) = (&settings.access_key_id, &settings.secret_access_key) {
      loader = loader.credentials_provider(Credentials::new(
        id.clone(),
        secret.clone(),
        None,
        None,
        "environment",
      ));
    }

    let config = loader.load().await;
    info!("S3 客户端就绪: 桶 {}, 区域 {}", settings.bucket, settings.region);

    Self {
      client: Client::new(&config),
      bucket: settings.bucket.clone(),
    }
  }

  pub fn bucket(&self) -> &str {
    &self.bucket
  }

  /// 列出桶内至多一个对象，用于连通性检查
  pub async fn list_first(&self) -> Result<Vec<String>, StorageError> {
    let output = self
      .client
      .list_objects_v2()
      .bucket(&self.bucket)
      .max_keys(1)
      .send()
      .await
      .map_err(|e| StorageError::service("ListObjectsV2", e))?;

    Ok(
      output
        .contents()
        .iter()
        .filter_map(|object| object.key().map(str::to_string))
        .collect(),
    )
  }
}

#[async_trait]
impl BlobStore for S3BlobStore {
  async fn put(&self, key: &str, body: Vec<u8>, content_type: &str) -> Result<(), StorageError> {
    debug!("上传 s3://{}/{} ({} 字节)", self.bucket, key, body.len());
    self
      .client
      .put_object()
      .bucket(&self.bucket)
      .key(key)
      .content_type(content_type)
      .body(ByteStream::from(body))
      .send()
      .await
      .map_err(|e| StorageError::service("PutObject", e))?;
    Ok(())
  }

  fn url_for(&self, key: &str) -> Result<Url, StorageError> {
    public_url(&self.bucket, key)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn overlay_keys_are_unique_pngs() {
    let a = overlay_key();
    let b = overlay_key();
    assert_ne!(a, b);
    for key in [&a, &b] {
      assert!(key.starts_with(OVERLAY_PREFIX));
      assert!(key.ends_with(".png"));
      let id = &key[OVERLAY_PREFIX.len()..key.len() - 4];
      assert!(Uuid::parse_str(id).is_ok());
    }
  }

  #[test]
  fn public_url_uses_bucket_host() {
    let url = public_url("drawings", "overlays/abc.png").unwrap();
    assert_eq!(url.as_str(), "https://drawings.s3.amazonaws.com/overlays/abc.png");
  }

  #[test]
  fn empty_bucket_fails_fast() {
    assert!(matches!(
      S3Settings::new("  ", None, None, "us-east-1"),
      Err(StorageError::MissingBucket)
    ));
    assert!(matches!(
      S3Settings::new("bad bucket/name", None, None, "us-east-1"),
      Err(StorageError::Url(_))
    ));
    assert_eq!(
      S3Settings::new("drawings", None, None, "us-east-1")
        .unwrap()
        .bucket(),
      "drawings"
    );
  }

  #[test]
  fn png_encoding_round_trips_dimensions() {
    let png = encode_png(&RgbImage::new(7, 5)).unwrap();
    let decoded = image::load_from_memory_with_format(&png, ImageFormat::Png).unwrap();
    assert_eq!((decoded.width(), decoded.height()), (7, 5));
  }
}
