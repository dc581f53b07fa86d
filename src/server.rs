// 该文件是 Blueprint Detector （蓝图符号检测） 项目的一部分。
// src/server.rs - HTTP 接口
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

use axum::{
  Json, Router,
  extract::{DefaultBodyLimit, Multipart, State},
  routing::{get, post},
};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::{
  error::DetectError,
  task::{DetectTask, DetectionResult},
};

/// 上传字段名
pub const UPLOAD_FIELD: &str = "file";

pub const WELCOME_MESSAGE: &str =
  "Welcome to the Blueprint Detector API! POST a file to /detect to run detection.";

pub fn router(task: DetectTask) -> Router {
  // 请求体上限放宽到文件上限的两倍，超限文件由校验逻辑返回 400
  let body_limit = task.config().max_upload_bytes.saturating_mul(2);

  Router::new()
    .route("/", get(root))
    .route("/detect", post(detect))
    .layer(DefaultBodyLimit::max(body_limit))
    .layer(TraceLayer::new_for_http())
    .with_state(task)
}

async fn root() -> Json<Value> {
  Json(json!({ "message": WELCOME_MESSAGE }))
}

async fn detect(
  State(task): State<DetectTask>,
  mut multipart: Multipart,
) -> Result<Json<DetectionResult>, DetectError> {
  let mut upload = None;

  while let Some(field) = multipart
    .next_field()
    .await
    .map_err(|e| DetectError::Validation(format!("Multipart error: {}", e)))?
  {
    if field.name() != Some(UPLOAD_FIELD) {
      continue;
    }

    let content_type = field.content_type().map(str::to_string);
    let file_name = field.file_name().map(str::to_string);
    let bytes = field
      .bytes()
      .await
      .map_err(|e| DetectError::Validation(format!("Failed to read file: {}", e)))?;

    info!(
      "收到文件: {:?} ({:?}, {} 字节)",
      file_name,
      content_type,
      bytes.len()
    );
    upload = Some(task.accept(bytes.to_vec(), content_type.as_deref())?);
    break;
  }

  let upload = upload.ok_or_else(|| {
    DetectError::Validation(format!("Missing multipart field '{}'", UPLOAD_FIELD))
  })?;

  let result = task.run(upload).await?;
  info!("返回 {} 个检测结果", result.detections.len());
  Ok(Json(result))
}

/// 运行服务直到收到 Ctrl-C
pub async fn serve(listener: TcpListener, app: Router) -> std::io::Result<()> {
  info!("监听地址: {}", listener.local_addr()?);
  axum::serve(listener, app)
    .with_graceful_shutdown(shutdown_signal())
    .await
}

async fn shutdown_signal() {
  match tokio::signal::ctrl_c().await {
    Ok(()) => info!("收到中断信号，准备退出..."),
    Err(e) => {
      warn!("无法监听中断信号: {}", e);
      std::future::pending::<()>().await
    }
  }
}
