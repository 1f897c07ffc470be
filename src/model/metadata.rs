// 该文件是 Kanjian （看见） 项目的一部分。
// src/model/metadata.rs - ONNX 模型元数据
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

use std::collections::{BTreeMap, HashMap};

use serde::Deserialize;
use tracing::{debug, warn};

use crate::model::{Labels, TaskKind};

const DEFAULT_IMGSZ: (usize, usize) = (640, 640);
const DEFAULT_STRIDE: usize = 32;
const DEFAULT_KPT_SHAPE: (usize, usize) = (17, 3);
/// 类别下标上限，超出即视为元数据损坏
pub const MAX_CLASSES: usize = 1 << 16;

/// 导出器写入的元数据键
pub const METADATA_KEYS: [&str; 6] = ["task", "names", "imgsz", "stride", "kpt_shape", "end2end"];

/// `names` 可能是列表，也可能是 `{下标: 名称}` 映射
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum NamesValue {
  Sequence(Vec<String>),
  Mapping(BTreeMap<usize, String>),
}

/// `imgsz` 可能是单个边长，也可能是 `[h, w]`
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SizeValue {
  Side(usize),
  List(Vec<usize>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelMetadata {
  /// 缺失时根据输出形状推断
  pub task: Option<TaskKind>,
  pub names: Labels,
  /// (height, width)，总是 stride 的整数倍
  pub imgsz: (usize, usize),
  pub stride: usize,
  /// (关键点数, 每点维度)
  pub kpt_shape: (usize, usize),
  pub end2end: bool,
}

impl Default for ModelMetadata {
  fn default() -> Self {
    Self {
      task: None,
      names: Labels::default(),
      imgsz: DEFAULT_IMGSZ,
      stride: DEFAULT_STRIDE,
      kpt_shape: DEFAULT_KPT_SHAPE,
      end2end: false,
    }
  }
}

impl ModelMetadata {
  pub fn from_map(map: &HashMap<String, String>) -> Self {
    let mut meta = Self::default();

    if let Some(task) = map.get("task") {
      match task.parse() {
        Ok(task) => meta.task = Some(task),
        Err(e) => warn!("忽略元数据 task: {}", e),
      }
    }

    if let Some(names) = map.get("names") {
      match parse_names(names) {
        Some(names) => meta.names = Labels::from(names),
        None => warn!("无法解析类别名称: {}", names),
      }
    }

    if let Some(stride) = map.get("stride") {
      match serde_yaml::from_str::<usize>(stride) {
        Ok(stride) if stride > 0 => meta.stride = stride,
        _ => warn!("忽略元数据 stride: {}", stride),
      }
    }

    if let Some(imgsz) = map.get("imgsz") {
      let size = match serde_yaml::from_str::<SizeValue>(imgsz) {
        Ok(SizeValue::Side(side)) => Some((side, side)),
        Ok(SizeValue::List(list)) => match list[..] {
          [side] => Some((side, side)),
          [h, w] => Some((h, w)),
          _ => None,
        },
        Err(_) => None,
      };
      match size {
        Some((h, w)) if h > 0 && w > 0 => meta.imgsz = (h, w),
        _ => warn!("忽略元数据 imgsz: {}", imgsz),
      }
    }
    meta.imgsz = (
      align_to_stride(meta.imgsz.0, meta.stride),
      align_to_stride(meta.imgsz.1, meta.stride),
    );

    if let Some(shape) = map.get("kpt_shape") {
      match serde_yaml::from_str::<Vec<usize>>(shape).as_deref() {
        Ok(&[n, d]) if n > 0 && (2..=3).contains(&d) => meta.kpt_shape = (n, d),
        _ => warn!("忽略元数据 kpt_shape: {}", shape),
      }
    }

    if let Some(end2end) = map.get("end2end") {
      meta.end2end = matches!(end2end.trim(), "True" | "true" | "1");
    }

    debug!("模型元数据: {:?}", meta);
    meta
  }

  /// 以输出张量可容纳的类别数约束类别表
  pub fn limit_classes(&mut self, max: usize) {
    if self.names.len() > max {
      warn!("类别名称 {} 个，超过模型输出的 {} 个，截断", self.names.len(), max);
      self.names.truncate(max);
    }
  }
}

/// 与 stride 对齐，向上取整
fn align_to_stride(side: usize, stride: usize) -> usize {
  let aligned = side.div_ceil(stride) * stride;
  if aligned != side {
    warn!("输入尺寸 {} 不是 stride {} 的整数倍，调整为 {}", side, stride, aligned);
  }
  aligned
}

/// 解析 `names`，缺失的下标以 `class{i}` 补齐
fn parse_names(text: &str) -> Option<Vec<String>> {
  match serde_yaml::from_str::<NamesValue>(text).ok()? {
    NamesValue::Sequence(names) => Some(names),
    NamesValue::Mapping(mapping) => {
      let Some(&max_index) = mapping.keys().next_back() else {
        return Some(Vec::new());
      };
      if max_index >= MAX_CLASSES {
        warn!("类别下标 {} 超出上限 {}", max_index, MAX_CLASSES);
        return None;
      }
      let mut names: Vec<String> = (0..=max_index).map(|i| format!("class{i}")).collect();
      for (index, name) in mapping {
        names[index] = name;
      }
      Some(names)
    }
  }
}
