// 该文件是 Kanjian （看见） 项目的一部分。
// src/model.rs - 模型
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

use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

/// 批量推理：输出与输入一一对应且顺序一致
pub trait Model {
  type Input;
  type Output;
  type Error;

  fn infer(&mut self, inputs: &[Self::Input]) -> Result<Vec<Self::Output>, Self::Error>;
}

/// 模型任务类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TaskKind {
  #[default]
  Detect,
  Segment,
  Pose,
  Classify,
  Obb,
}

impl TaskKind {
  pub fn as_str(&self) -> &'static str {
    match self {
      TaskKind::Detect => "detect",
      TaskKind::Segment => "segment",
      TaskKind::Pose => "pose",
      TaskKind::Classify => "classify",
      TaskKind::Obb => "obb",
    }
  }
}

impl fmt::Display for TaskKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for TaskKind {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_ascii_lowercase().as_str() {
      "detect" => Ok(TaskKind::Detect),
      "segment" => Ok(TaskKind::Segment),
      "pose" => Ok(TaskKind::Pose),
      "classify" => Ok(TaskKind::Classify),
      "obb" => Ok(TaskKind::Obb),
      other => Err(format!("未知任务类型: {other}")),
    }
  }
}

/// 类别名称表，缺失的类别以 `class{id}` 代替
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Labels {
  names: Vec<String>,
}

impl Labels {
  pub fn name(&self, id: usize) -> Cow<'_, str> {
    match self.names.get(id) {
      Some(name) => Cow::Borrowed(name.as_str()),
      None => Cow::Owned(format!("class{id}")),
    }
  }

  pub fn len(&self) -> usize {
    self.names.len()
  }

  pub fn is_empty(&self) -> bool {
    self.names.is_empty()
  }

  pub fn truncate(&mut self, len: usize) {
    self.names.truncate(len);
  }
}

impl From<Vec<String>> for Labels {
  fn from(names: Vec<String>) -> Self {
    Self { names }
  }
}

mod metadata;
mod postprocess;
mod preprocess;
mod yolo;

pub use self::metadata::ModelMetadata;
pub use self::postprocess::{PostprocessConfig, RawOutput, postprocess};
pub use self::preprocess::{Letterbox, letterbox, stretch};
pub use self::yolo::{Yolo, YoloBuilder, YoloError};
