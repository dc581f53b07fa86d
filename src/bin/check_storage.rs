// 该文件是 Blueprint Detector （蓝图符号检测） 项目的一部分。
// src/bin/check_storage.rs - 对象存储连通性检查
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use anyhow::Result;
use clap::Parser;
use tracing::info;

use blueprint_detector::{
  args::S3Args,
  output::{S3BlobStore, StorageError},
};

/// 使用服务的凭证列出桶内对象，确认存储可用
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  #[command(flatten)]
  pub s3: S3Args,
}

#[tokio::main]
async fn main() -> Result<()> {
  dotenv::dotenv().ok();
  tracing_subscriber::fmt::init();

  let args = Args::parse();
  let settings = args.s3.settings()?;
  info!("检查桶: {}", settings.bucket());

  let store = S3BlobStore::connect(&settings).await;
  match store.list_first().await {
    Ok(keys) => {
      println!("Successfully connected to S3 bucket '{}'", store.bucket());
      if keys.is_empty() {
        println!("Bucket is empty or you don't have list permissions.");
      } else {
        println!("Found objects:");
        for key in &keys {
          println!("  {}", key);
        }
      }
      Ok(())
    }
    Err(e) => {
      match &e {
        StorageError::Service { code, message, .. } => {
          println!("Error: {} - {}", code, message)
        }
        other => println!("Error: {}", other),
      }
      Err(e.into())
    }
  }
}
