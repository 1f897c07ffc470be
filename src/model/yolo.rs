// 该文件是 Kanjian （看见） 项目的一部分。
// src/model/yolo.rs - YOLO 模型（ONNX Runtime）
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

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use ort::session::{Session, builder::GraphOptimizationLevel};
use ort::value::Tensor;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::{
  frame::Frame,
  model::{
    Labels, Model, ModelMetadata, PostprocessConfig, RawOutput, TaskKind, letterbox,
    metadata::METADATA_KEYS, postprocess, postprocess::infer_task, stretch,
  },
  prediction::{Prediction, Speed},
};

const DEFAULT_THREADS: usize = 4;
const TORCH_EXTENSIONS: [&str; 2] = ["pt", "pth"];

#[derive(Error, Debug)]
pub enum YoloError {
  #[error("模型文件不存在: {0}")]
  ModelNotFound(PathBuf),
  #[error("不支持的模型格式: {0}（请先导出为 ONNX，例如 `yolo export model={1} format=onnx`）")]
  UnsupportedFormat(PathBuf, String),
  #[error("模型加载错误: {0}")]
  ModelLoad(#[source] ort::Error),
  #[error("模型元数据错误: {0}")]
  Metadata(#[source] ort::Error),
  #[error("推理运行错误: {0}")]
  Runtime(#[from] ort::Error),
  #[error("模型输出不符合预期: {0}")]
  OutputShape(String),
}

pub struct YoloBuilder {
  model_path: PathBuf,
  config: PostprocessConfig,
  threads: usize,
}

impl YoloBuilder {
  pub fn new(model_path: impl Into<PathBuf>) -> Self {
    Self {
      model_path: model_path.into(),
      config: PostprocessConfig::default(),
      threads: DEFAULT_THREADS,
    }
  }

  pub fn confidence(mut self, confidence: f32) -> Self {
    self.config.confidence = confidence;
    self
  }

  pub fn iou(mut self, iou: f32) -> Self {
    self.config.iou = iou;
    self
  }

  pub fn max_det(mut self, max_det: usize) -> Self {
    self.config.max_det = max_det;
    self
  }

  pub fn threads(mut self, threads: usize) -> Self {
    self.threads = threads.max(1);
    self
  }

  pub fn build(self) -> Result<Yolo, YoloError> {
    check_model_path(&self.model_path)?;

    info!("加载模型文件: {}", self.model_path.display());
    #[allow(unused_mut)]
    let mut builder = Session::builder().map_err(YoloError::ModelLoad)?;

    #[cfg(feature = "rknpu")]
    {
      use ort::execution_providers::RKNPUExecutionProvider;
      info!("注册 RKNPU 执行后端");
      builder = builder
        .with_execution_providers([RKNPUExecutionProvider::default().build()])
        .map_err(YoloError::ModelLoad)?;
    }

    let session = builder
      .with_optimization_level(GraphOptimizationLevel::Level3)
      .map_err(YoloError::ModelLoad)?
      .with_intra_threads(self.threads)
      .map_err(YoloError::ModelLoad)?
      .commit_from_file(&self.model_path)
      .map_err(|e| {
        error!("无法加载模型 {}: {}", self.model_path.display(), e);
        YoloError::ModelLoad(e)
      })?;
    info!("模型加载完成");

    let mut metadata = read_metadata(&session)?;
    if let Some(capacity) = class_capacity(&session, &metadata) {
      metadata.limit_classes(capacity);
    }
    let input_name = session
      .inputs
      .first()
      .map(|i| i.name.clone())
      .unwrap_or_else(|| "images".to_string());
    let output_names: Vec<String> = session.outputs.iter().map(|o| o.name.clone()).collect();

    debug!("模型输入: {}", input_name);
    debug!("模型输出: {:?}", output_names);
    debug!("类别数量: {}", metadata.names.len());

    Ok(Yolo {
      session,
      names: Arc::new(metadata.names.clone()),
      metadata,
      input_name,
      output_names,
      config: self.config,
    })
  }
}

/// 在创建推理会话前检查权重文件
fn check_model_path(path: &Path) -> Result<(), YoloError> {
  if !path.exists() {
    error!("模型文件不存在: {}", path.display());
    return Err(YoloError::ModelNotFound(path.to_path_buf()));
  }

  let extension = path
    .extension()
    .map(|e| e.to_string_lossy().to_ascii_lowercase())
    .unwrap_or_default();
  if TORCH_EXTENSIONS.contains(&extension.as_str()) {
    error!("PyTorch 权重无法直接加载: {}", path.display());
    return Err(YoloError::UnsupportedFormat(
      path.to_path_buf(),
      path.display().to_string(),
    ));
  }

  Ok(())
}

fn read_metadata(session: &Session) -> Result<ModelMetadata, YoloError> {
  let custom = session.metadata().map_err(YoloError::Metadata)?;
  let mut map = HashMap::new();
  for key in METADATA_KEYS {
    match custom.custom(key) {
      Ok(Some(value)) => {
        map.insert(key.to_string(), value);
      }
      Ok(None) => debug!("元数据缺少 {}", key),
      Err(e) => warn!("读取元数据 {} 失败: {}", key, e),
    }
  }
  Ok(ModelMetadata::from_map(&map))
}

/// 由第一个输出的静态形状给出类别数上限，动态维度或端到端输出时不约束
fn class_capacity(session: &Session, metadata: &ModelMetadata) -> Option<usize> {
  let shape = session.outputs.first()?.output_type.tensor_shape()?;
  match shape[..] {
    [_, nc] if nc > 0 => Some(nc as usize),
    [_, channels, _] if metadata.end2end => {
      debug!("端到端输出 {} 通道，不约束类别数", channels);
      None
    }
    [_, channels, n] if channels > 4 && n != 6 => Some(channels as usize - 4),
    _ => None,
  }
}

/// ONNX Runtime 上的 YOLO 模型
pub struct Yolo {
  session: Session,
  metadata: ModelMetadata,
  names: Arc<Labels>,
  input_name: String,
  output_names: Vec<String>,
  config: PostprocessConfig,
}

impl Yolo {
  pub fn metadata(&self) -> &ModelMetadata {
    &self.metadata
  }

  pub fn config(&self) -> &PostprocessConfig {
    &self.config
  }

  fn run(&mut self, shape: [usize; 4], data: Vec<f32>) -> Result<Vec<RawOutput>, YoloError> {
    let tensor = Tensor::from_array((shape, data))?;
    let outputs = self
      .session
      .run(ort::inputs![self.input_name.as_str() => tensor])?;

    let mut raw = Vec::with_capacity(self.output_names.len());
    for name in &self.output_names {
      let value = outputs
        .get(name.as_str())
        .ok_or_else(|| YoloError::OutputShape(format!("缺少输出 {name}")))?;
      let (shape, data) = value.try_extract_tensor::<f32>()?;
      raw.push(RawOutput::new(
        shape.iter().map(|&d| d.max(0) as usize).collect(),
        data.to_vec(),
      ));
    }
    Ok(raw)
  }

  fn predict(&mut self, frame: &Frame) -> Result<Prediction, YoloError> {
    let (in_h, in_w) = self.metadata.imgsz;
    let input = (in_w as u32, in_h as u32);

    let now = Instant::now();
    let (tensor, mapping) = if self.metadata.task == Some(TaskKind::Classify) {
      stretch(frame.image(), input)
    } else {
      letterbox(frame.image(), input)
    };
    let shape = [1, 3, in_h, in_w];
    let (data, _) = tensor.into_raw_vec_and_offset();
    let preprocess = now.elapsed();

    let now = Instant::now();
    let outputs = self.run(shape, data)?;
    let inference = now.elapsed();
    for (name, output) in self.output_names.iter().zip(&outputs) {
      debug!("输出 {} 形状: {:?}", name, output.shape);
    }

    let now = Instant::now();
    let task = infer_task(&self.metadata, &outputs);
    let facets = postprocess(task, &outputs, &self.metadata, &mapping, &self.config)?;
    let postprocess = now.elapsed();

    let speed = Speed {
      preprocess: preprocess.as_secs_f64() * 1000.0,
      inference: inference.as_secs_f64() * 1000.0,
      postprocess: postprocess.as_secs_f64() * 1000.0,
    };
    debug!("{} 耗时: {:?}", frame.path().display(), speed);

    Ok(
      Prediction::new(frame.path(), frame.image().clone(), self.names.clone(), facets)
        .with_speed(speed),
    )
  }
}

impl Model for Yolo {
  type Input = Frame;
  type Output = Prediction;
  type Error = YoloError;

  fn infer(&mut self, inputs: &[Self::Input]) -> Result<Vec<Self::Output>, Self::Error> {
    info!("开始推理 {} 张图像", inputs.len());
    let now = Instant::now();
    let predictions = inputs
      .iter()
      .map(|frame| self.predict(frame))
      .collect::<Result<Vec<_>, _>>()?;
    info!("推理完成，耗时: {:.2?}", now.elapsed());
    Ok(predictions)
  }
}

impl std::fmt::Debug for Yolo {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Yolo")
      .field("task", &self.metadata.task)
      .field("num_classes", &self.metadata.names.len())
      .field("imgsz", &self.metadata.imgsz)
      .field("input", &self.input_name)
      .field("outputs", &self.output_names)
      .finish()
  }
}
