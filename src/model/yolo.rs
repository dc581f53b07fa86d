// 该文件是 Blueprint Detector （蓝图符号检测） 项目的一部分。
// src/model/yolo.rs - YOLO ONNX 模型
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::{fmt::Display, path::PathBuf, sync::Mutex};

use image::{
  RgbImage,
  imageops::{self, FilterType},
};
use ndarray::{Array4, ArrayView3, Ix3};
use ort::{
  execution_providers::CPUExecutionProvider,
  session::{Session, builder::GraphOptimizationLevel},
  value::Tensor,
};
use tracing::{debug, info};

use crate::{
  config::{
    DEFAULT_CONFIDENCE_THRESHOLD, DEFAULT_INPUT_SIZE, DEFAULT_INTRA_THREADS, DEFAULT_IOU_THRESHOLD,
  },
  model::{DetectItem, DetectResult, LabelMap, Model, ModelError},
};

const YOLO_BOX_ATTRS: usize = 4;
// 灰色填充，与训练时的 letterbox 一致
const LETTERBOX_FILL: f32 = 114.0 / 255.0;

/// YOLOv8 检测模型（ONNX 导出，输出 [1, 4 + nc, N]）
pub struct Yolo {
  session: Mutex<Session>,
  input_name: String,
  labels: LabelMap,
  input_size: u32,
  confidence_threshold: f32,
  iou_threshold: f32,
}

impl std::fmt::Debug for Yolo {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Yolo")
      .field("input_name", &self.input_name)
      .field("labels", &self.labels)
      .field("input_size", &self.input_size)
      .field("confidence_threshold", &self.confidence_threshold)
      .field("iou_threshold", &self.iou_threshold)
      .finish_non_exhaustive()
  }
}

fn load_error(e: impl Display) -> ModelError {
  ModelError::Load(e.to_string())
}

fn runtime_error(e: impl Display) -> ModelError {
  ModelError::Runtime(e.to_string())
}

pub struct YoloBuilder {
  model_path: PathBuf,
  labels: LabelMap,
  input_size: u32,
  confidence_threshold: f32,
  iou_threshold: f32,
  intra_threads: usize,
}

impl YoloBuilder {
  pub fn new(model_path: impl Into<PathBuf>) -> Self {
    Self {
      model_path: model_path.into(),
      labels: LabelMap::default(),
      input_size: DEFAULT_INPUT_SIZE,
      confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
      iou_threshold: DEFAULT_IOU_THRESHOLD,
      intra_threads: DEFAULT_INTRA_THREADS,
    }
  }

  pub fn labels(mut self, labels: LabelMap) -> Self {
    self.labels = labels;
    self
  }

  pub fn confidence(mut self, threshold: f32) -> Self {
    self.confidence_threshold = threshold.clamp(0.0, 1.0);
    self
  }

  pub fn iou(mut self, threshold: f32) -> Self {
    self.iou_threshold = threshold.clamp(0.0, 1.0);
    self
  }

  pub fn input_size(mut self, size: u32) -> Self {
    self.input_size = size.max(32);
    self
  }

  pub fn intra_threads(mut self, threads: usize) -> Self {
    self.intra_threads = threads.max(1);
    self
  }

  pub fn build(self) -> Result<Yolo, ModelError> {
    info!("加载模型文件: {}", self.model_path.display());
    if !self.model_path.exists() {
      return Err(ModelError::Load(format!(
        "模型文件不存在: {}",
        self.model_path.display()
      )));
    }

    let session = Session::builder()
      .map_err(load_error)?
      .with_execution_providers([CPUExecutionProvider::default().build()])
      .map_err(load_error)?
      .with_optimization_level(GraphOptimizationLevel::Level3)
      .map_err(load_error)?
      .with_intra_threads(self.intra_threads)
      .map_err(load_error)?
      .commit_from_file(&self.model_path)
      .map_err(load_error)?;

    let input_name = session
      .inputs
      .first()
      .map(|input| input.name.clone())
      .ok_or_else(|| ModelError::Load("模型没有输入".to_string()))?;

    debug!("模型输入: {}", input_name);
    debug!("模型输出数量: {}", session.outputs.len());
    info!(
      "模型加载完成: {} 个类别, 置信度阈值 {}, NMS 阈值 {}",
      self.labels.len(),
      self.confidence_threshold,
      self.iou_threshold
    );

    Ok(Yolo {
      session: Mutex::new(session),
      input_name,
      labels: self.labels,
      input_size: self.input_size,
      confidence_threshold: self.confidence_threshold,
      iou_threshold: self.iou_threshold,
    })
  }
}

impl Model for Yolo {
  fn infer(&self, image: &RgbImage) -> Result<DetectResult, ModelError> {
    let Letterbox { tensor, transform } = letterbox(image, self.input_size);

    let input = Tensor::from_array(tensor).map_err(runtime_error)?;

    // ONNX Runtime 的 run 需要独占会话
    let mut session = self
      .session
      .lock()
      .map_err(|_| ModelError::Runtime("推理会话锁已损坏".to_string()))?;

    debug!("执行模型推理");
    let outputs = session
      .run(ort::inputs![&self.input_name => input])
      .map_err(runtime_error)?;

    let output = outputs[0]
      .try_extract_array::<f32>()
      .map_err(runtime_error)?;
    let shape = output.shape().to_vec();
    debug!("模型输出形状: {:?}", shape);

    let output = output
      .into_dimensionality::<Ix3>()
      .map_err(|_| ModelError::OutputShape(shape.clone()))?;

    let candidates = decode_predictions(
      output,
      self.labels.len(),
      &transform,
      image.dimensions(),
      self.confidence_threshold,
    )?;

    let items = non_max_suppression(candidates, self.iou_threshold);
    debug!("检测到 {} 个物体", items.len());

    Ok(DetectResult::new(items))
  }

  fn labels(&self) -> &LabelMap {
    &self.labels
  }
}

/// 从模型输入坐标映射回原图坐标
#[derive(Debug, Clone, Copy, PartialEq)]
struct LetterboxTransform {
  scale: f32,
  pad_x: f32,
  pad_y: f32,
}

impl LetterboxTransform {
  fn to_source(&self, x: f32, y: f32) -> (f32, f32) {
    ((x - self.pad_x) / self.scale, (y - self.pad_y) / self.scale)
  }
}

struct Letterbox {
  tensor: Array4<f32>,
  transform: LetterboxTransform,
}

/// 等比缩放后居中填充为 size x size，输出 NCHW、[0, 1] 归一化张量
fn letterbox(image: &RgbImage, size: u32) -> Letterbox {
  let (w, h) = image.dimensions();
  let scale = (size as f32 / w as f32).min(size as f32 / h as f32);
  let new_w = ((w as f32 * scale).round() as u32).clamp(1, size);
  let new_h = ((h as f32 * scale).round() as u32).clamp(1, size);
  let pad_x = (size - new_w) / 2;
  let pad_y = (size - new_h) / 2;

  let resized = imageops::resize(image, new_w, new_h, FilterType::Triangle);

  let side = size as usize;
  let mut tensor = Array4::from_elem((1, 3, side, side), LETTERBOX_FILL);
  for (x, y, pixel) in resized.enumerate_pixels() {
    let (row, col) = ((y + pad_y) as usize, (x + pad_x) as usize);
    for c in 0..3 {
      tensor[[0, c, row, col]] = pixel[c] as f32 / 255.0;
    }
  }

  Letterbox {
    tensor,
    transform: LetterboxTransform {
      scale,
      pad_x: pad_x as f32,
      pad_y: pad_y as f32,
    },
  }
}

/// 解析 [1, 4 + nc, N] 输出；部分导出为 [1, N, 4 + nc]，按类别数识别并转置。
/// 类别数与输出都对不上时，较长的一维视为 anchor 维
fn decode_predictions(
  output: ArrayView3<f32>,
  classes: usize,
  transform: &LetterboxTransform,
  (width, height): (u32, u32),
  confidence_threshold: f32,
) -> Result<Vec<DetectItem>, ModelError> {
  let expected_attrs = YOLO_BOX_ATTRS + classes;
  let transposed = match (output.shape()[1], output.shape()[2]) {
    (attrs, _) if attrs == expected_attrs => false,
    (_, attrs) if attrs == expected_attrs => true,
    (rows, cols) => rows > cols,
  };
  let output = if transposed {
    output.permuted_axes([0, 2, 1])
  } else {
    output
  };

  let (attrs, anchors) = (output.shape()[1], output.shape()[2]);
  if output.shape()[0] != 1 || attrs <= YOLO_BOX_ATTRS {
    return Err(ModelError::OutputShape(output.shape().to_vec()));
  }

  let (w, h) = (width as f32, height as f32);
  let mut items = Vec::new();

  for anchor in 0..anchors {
    let (class_id, score) = (YOLO_BOX_ATTRS..attrs)
      .map(|attr| (attr - YOLO_BOX_ATTRS, output[[0, attr, anchor]]))
      .fold((0usize, f32::MIN), |best, current| {
        if current.1 > best.1 { current } else { best }
      });

    if score < confidence_threshold {
      continue;
    }

    let cx = output[[0, 0, anchor]];
    let cy = output[[0, 1, anchor]];
    let bw = output[[0, 2, anchor]];
    let bh = output[[0, 3, anchor]];

    let (x1, y1) = transform.to_source(cx - bw / 2.0, cy - bh / 2.0);
    let (x2, y2) = transform.to_source(cx + bw / 2.0, cy + bh / 2.0);

    let bbox = [
      x1.clamp(0.0, w),
      y1.clamp(0.0, h),
      x2.clamp(0.0, w),
      y2.clamp(0.0, h),
    ];

    if bbox[0] >= bbox[2] || bbox[1] >= bbox[3] {
      continue;
    }

    items.push(DetectItem {
      class_id: class_id as u32,
      score,
      bbox,
    });
  }

  debug!("{} 个候选框, {} 个类别", items.len(), attrs - YOLO_BOX_ATTRS);

  Ok(items)
}

/// 按类别进行非极大值抑制，结果按置信度降序
fn non_max_suppression(mut items: Vec<DetectItem>, iou_threshold: f32) -> Vec<DetectItem> {
  items.sort_by(|a, b| b.score.total_cmp(&a.score));

  let mut kept: Vec<DetectItem> = Vec::with_capacity(items.len());
  for item in items {
    let suppressed = kept
      .iter()
      .any(|k| k.class_id == item.class_id && iou(&k.bbox, &item.bbox) >= iou_threshold);
    if !suppressed {
      kept.push(item);
    }
  }

  kept
}

/// 计算两个边界框的 IoU
fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
  let x1 = a[0].max(b[0]);
  let y1 = a[1].max(b[1]);
  let x2 = a[2].min(b[2]);
  let y2 = a[3].min(b[3]);

  let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
  let area_a = (a[2] - a[0]) * (a[3] - a[1]);
  let area_b = (b[2] - b[0]) * (b[3] - b[1]);
  let union = area_a + area_b - intersection;

  if union > 0.0 {
    intersection / union
  } else {
    0.0
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::Rgb;
  use ndarray::Array3;

  fn identity() -> LetterboxTransform {
    LetterboxTransform {
      scale: 1.0,
      pad_x: 0.0,
      pad_y: 0.0,
    }
  }

  #[test]
  fn letterbox_pads_the_short_side() {
    let image = RgbImage::from_pixel(64, 32, Rgb([255, 255, 255]));
    let Letterbox { tensor, transform } = letterbox(&image, 32);

    assert_eq!(tensor.shape(), &[1, 3, 32, 32]);
    assert_eq!(transform.scale, 0.5);
    assert_eq!(transform.pad_x, 0.0);
    assert_eq!(transform.pad_y, 8.0);
    // 填充区为灰色，图像区为白色
    assert_eq!(tensor[[0, 0, 0, 0]], LETTERBOX_FILL);
    assert_eq!(tensor[[0, 1, 16, 16]], 1.0);
    assert_eq!(transform.to_source(16.0, 8.0), (32.0, 0.0));
  }

  #[test]
  fn decodes_best_class_per_anchor() {
    // 2 个类别，3 个 anchor
    let mut raw = Array3::<f32>::zeros((1, 6, 3));
    // anchor 0: 类别 1，0.8
    for (attr, v) in [20.0, 20.0, 10.0, 10.0, 0.1, 0.8].into_iter().enumerate() {
      raw[[0, attr, 0]] = v;
    }
    // anchor 1: 低于阈值
    for (attr, v) in [5.0, 5.0, 4.0, 4.0, 0.2, 0.1].into_iter().enumerate() {
      raw[[0, attr, 1]] = v;
    }
    // anchor 2: 类别 0，超出图像部分被裁剪
    for (attr, v) in [45.0, 45.0, 20.0, 20.0, 0.9, 0.3].into_iter().enumerate() {
      raw[[0, attr, 2]] = v;
    }

    let items = decode_predictions(raw.view(), 2, &identity(), (50, 50), 0.3).unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(items[0].class_id, 1);
    assert_eq!(items[0].bbox, [15.0, 15.0, 25.0, 25.0]);
    assert_eq!(items[1].class_id, 0);
    assert_eq!(items[1].bbox, [35.0, 35.0, 50.0, 50.0]);
  }

  #[test]
  fn decodes_transposed_output() {
    let mut raw = Array3::<f32>::zeros((1, 8, 5));
    raw[[0, 0, 0]] = 10.0;
    raw[[0, 0, 1]] = 10.0;
    raw[[0, 0, 2]] = 4.0;
    raw[[0, 0, 3]] = 4.0;
    raw[[0, 0, 4]] = 0.7;

    let items = decode_predictions(raw.view(), 1, &identity(), (100, 100), 0.3).unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].bbox, [8.0, 8.0, 12.0, 12.0]);
  }

  #[test]
  fn few_anchors_keep_channel_first_layout() {
    // 3 个类别、2 个 anchor：[1, 7, 2]
    let mut raw = Array3::<f32>::zeros((1, 7, 2));
    for (attr, v) in [30.0, 30.0, 10.0, 10.0, 0.1, 0.2, 0.9].into_iter().enumerate() {
      raw[[0, attr, 1]] = v;
    }

    let items = decode_predictions(raw.view(), 3, &identity(), (64, 64), 0.3).unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].class_id, 2);
    assert_eq!(items[0].bbox, [25.0, 25.0, 35.0, 35.0]);

    // 同样的数据按 [1, N, 4 + nc] 导出
    let transposed = raw.view().permuted_axes([0, 2, 1]);
    let items = decode_predictions(transposed, 3, &identity(), (64, 64), 0.3).unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].class_id, 2);
  }

  #[test]
  fn unknown_class_count_falls_back_to_longer_anchor_axis() {
    let mut raw = Array3::<f32>::zeros((1, 6, 20));
    for (attr, v) in [10.0, 10.0, 4.0, 4.0, 0.0, 0.8].into_iter().enumerate() {
      raw[[0, attr, 7]] = v;
    }

    let items = decode_predictions(raw.view(), 5, &identity(), (32, 32), 0.3).unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].class_id, 1);
  }

  #[test]
  fn rejects_outputs_without_classes() {
    let raw = Array3::<f32>::zeros((1, 4, 10));
    assert!(matches!(
      decode_predictions(raw.view(), 3, &identity(), (10, 10), 0.3),
      Err(ModelError::OutputShape(_))
    ));
  }

  #[test]
  fn nms_keeps_best_box_per_class() {
    let item = |class_id, score, bbox| DetectItem {
      class_id,
      score,
      bbox,
    };
    let items = vec![
      item(0, 0.6, [0.0, 0.0, 10.0, 10.0]),
      item(0, 0.9, [1.0, 1.0, 11.0, 11.0]),
      item(1, 0.5, [1.0, 1.0, 11.0, 11.0]),
      item(0, 0.4, [30.0, 30.0, 40.0, 40.0]),
    ];

    let kept = non_max_suppression(items, 0.45);
    let scores: Vec<f32> = kept.iter().map(|i| i.score).collect();
    assert_eq!(scores, [0.9, 0.5, 0.4]);
  }

  #[test]
  fn iou_of_identical_and_disjoint_boxes() {
    let a = [0.0, 0.0, 10.0, 10.0];
    assert_eq!(iou(&a, &a), 1.0);
    assert_eq!(iou(&a, &[20.0, 20.0, 30.0, 30.0]), 0.0);
  }
}
