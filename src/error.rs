// 该文件是 Blueprint Detector （蓝图符号检测） 项目的一部分。
// src/error.rs - 请求级错误
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
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, warn};

use crate::{input::InputError, model::ModelError, output::StorageError};

/// 一次检测请求可能出现的错误
#[derive(Error, Debug)]
pub enum DetectError {
  /// 输入无效：超出大小、类型不支持或无法解码
  #[error("{0}")]
  Validation(String),
  /// 推理失败
  #[error("Error processing file: {0}")]
  Inference(String),
  /// PDF 光栅化后端不可用，属于部署问题
  #[error("PDF rendering unavailable: {0}")]
  Backend(String),
  /// 编码或上传失败
  #[error("Error uploading overlay: {0}")]
  Egress(String),
}

/// 错误响应体
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorBody {
  pub error: String,
  pub detail: String,
}

impl DetectError {
  pub fn kind(&self) -> &'static str {
    match self {
      DetectError::Validation(_) => "validation_error",
      DetectError::Inference(_) => "inference_error",
      DetectError::Backend(_) => "backend_unavailable",
      DetectError::Egress(_) => "egress_error",
    }
  }

  pub fn status(&self) -> StatusCode {
    match self {
      DetectError::Validation(_) => StatusCode::BAD_REQUEST,
      DetectError::Inference(_) | DetectError::Backend(_) | DetectError::Egress(_) => {
        StatusCode::INTERNAL_SERVER_ERROR
      }
    }
  }
}

impl From<InputError> for DetectError {
  fn from(err: InputError) -> Self {
    match err {
      InputError::Backend(reason) => DetectError::Backend(reason),
      _ => DetectError::Validation(err.to_string()),
    }
  }
}

impl From<ModelError> for DetectError {
  fn from(err: ModelError) -> Self {
    DetectError::Inference(err.to_string())
  }
}

impl From<StorageError> for DetectError {
  fn from(err: StorageError) -> Self {
    DetectError::Egress(err.to_string())
  }
}

impl IntoResponse for DetectError {
  fn into_response(self) -> Response {
    let status = self.status();
    if status.is_client_error() {
      warn!("请求被拒绝: {}", self);
    } else {
      error!("处理文件失败: {}", self);
    }

    let body = ErrorBody {
      error: self.kind().to_string(),
      detail: self.to_string(),
    };
    (status, Json(body)).into_response()
  }
}
