// 该文件是 Blueprint Detector （蓝图符号检测） 项目的一部分。
// src/task.rs - 检测任务
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

use std::{sync::Arc, time::Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tracing::{debug, info};

use crate::{
  config::PipelineConfig,
  error::DetectError,
  input::{Rasterizer, Upload},
  model::{Detection, Model},
  output::{BlobStore, Draw, PNG_CONTENT_TYPE, encode_png, overlay_key},
};

/// 检测接口的响应
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionResult {
  pub detections: Vec<Detection>,
  pub image_url: String,
}

/// 推理与标注完成、尚未上传的中间结果
#[derive(Debug, Clone)]
pub struct Rendered {
  pub detections: Vec<Detection>,
  pub rectangles: usize,
  pub png: Vec<u8>,
}

/// 检测流水线：解码 → 推理 → 标注 → 上传
///
/// 所有协作者在启动时构造一次，通过 `Arc` 在请求间共享。
#[derive(Clone)]
pub struct DetectTask {
  config: Arc<PipelineConfig>,
  model: Arc<dyn Model>,
  rasterizer: Arc<dyn Rasterizer>,
  draw: Arc<Draw>,
  store: Arc<dyn BlobStore>,
  permits: Arc<Semaphore>,
}

impl DetectTask {
  pub fn new(
    config: PipelineConfig,
    model: Arc<dyn Model>,
    rasterizer: Arc<dyn Rasterizer>,
    draw: Arc<Draw>,
    store: Arc<dyn BlobStore>,
  ) -> Self {
    let permits = Arc::new(Semaphore::new(config.max_inflight.max(1)));
    Self {
      config: Arc::new(config),
      model,
      rasterizer,
      draw,
      store,
      permits,
    }
  }

  pub fn config(&self) -> &PipelineConfig {
    &self.config
  }

  /// 校验上传内容，不涉及推理
  pub fn accept(&self, bytes: Vec<u8>, content_type: Option<&str>) -> Result<Upload, DetectError> {
    Ok(Upload::accept(
      bytes,
      content_type,
      self.config.max_upload_bytes,
    )?)
  }

  /// 同步执行解码、推理、标注与 PNG 编码
  pub fn render(&self, upload: Upload) -> Result<Rendered, DetectError> {
    debug!("上传类型: {:?}", upload.kind());
    let image = upload.into_image(self.rasterizer.as_ref(), self.config.pdf_dpi)?;
    info!("输入图像 {}x{}，开始推理...", image.width(), image.height());

    let now = Instant::now();
    let result = self.model.infer(&image)?;
    info!("推理完成，耗时: {:.2?}", now.elapsed());
    if result.is_empty() {
      info!("未检测到目标");
    } else {
      debug!("模型输出 {} 个检测框", result.len());
    }

    let detections = result.to_detections(
      self.model.labels(),
      self.config.confidence_threshold,
      image.dimensions(),
    );

    let annotated = self.draw.annotate(&image, &detections);
    debug!("绘制 {} 个边框", annotated.rectangles);

    let png = encode_png(&annotated.image)?;

    Ok(Rendered {
      detections,
      rectangles: annotated.rectangles,
      png,
    })
  }

  /// 上传标注图像并组装响应
  pub async fn publish(&self, rendered: Rendered) -> Result<DetectionResult, DetectError> {
    let key = overlay_key();
    let now = Instant::now();
    self.store.put(&key, rendered.png, PNG_CONTENT_TYPE).await?;
    let url = self.store.url_for(&key)?;
    info!("上传完成: {}，耗时: {:.2?}", url, now.elapsed());

    Ok(DetectionResult {
      detections: rendered.detections,
      image_url: url.to_string(),
    })
  }

  /// 完整处理一次上传；同时进行的推理数受 `max_inflight` 限制
  ///
  /// 许可随阻塞任务一起移动，客户端断开后仍在运行的推理继续占用名额。
  pub async fn run(&self, upload: Upload) -> Result<DetectionResult, DetectError> {
    let permit = self
      .permits
      .clone()
      .acquire_owned()
      .await
      .map_err(|e| DetectError::Inference(e.to_string()))?;

    let task = self.clone();
    let rendered = tokio::task::spawn_blocking(move || {
      let _permit = permit;
      task.render(upload)
    })
    .await
    .map_err(|e| DetectError::Inference(format!("推理任务异常退出: {}", e)))??;

    self.publish(rendered).await
  }

  /// 当前可用的推理名额
  pub fn available_permits(&self) -> usize {
    self.permits.available_permits()
  }
}
