// 该文件是 Kanjian （看见） 项目的一部分。
// src/prediction.rs - 推理结果定义
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

use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::{GrayImage, RgbImage};
use serde_json::{Value, json};

use crate::model::{Labels, TaskKind};

#[derive(Debug, Clone, PartialEq)]
pub struct DetectItem {
  pub class_id: usize,
  pub score: f32,
  pub bbox: [f32; 4], // [x_min, y_min, x_max, y_max]，原图像素坐标
}

impl DetectItem {
  pub fn width(&self) -> f32 {
    self.bbox[2] - self.bbox[0]
  }

  pub fn height(&self) -> f32 {
    self.bbox[3] - self.bbox[1]
  }

  pub fn area(&self) -> f32 {
    self.width().max(0.0) * self.height().max(0.0)
  }

  /// 归一化坐标 [x_min, y_min, x_max, y_max]
  pub fn normalized(&self, width: u32, height: u32) -> [f32; 4] {
    let (w, h) = (width as f32, height as f32);
    [
      self.bbox[0] / w,
      self.bbox[1] / h,
      self.bbox[2] / w,
      self.bbox[3] / h,
    ]
  }
}

#[derive(Debug, Clone, Default)]
pub struct Boxes {
  pub items: Box<[DetectItem]>,
}

impl Boxes {
  pub fn len(&self) -> usize {
    self.items.len()
  }

  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }

  pub fn iter(&self) -> std::slice::Iter<'_, DetectItem> {
    self.items.iter()
  }
}

/// 每个检测框对应一张原图尺寸的二值掩码（0 / 255），与 [`Boxes`] 按下标对齐
#[derive(Debug, Clone, Default)]
pub struct Masks {
  pub data: Box<[GrayImage]>,
}

impl Masks {
  pub fn len(&self) -> usize {
    self.data.len()
  }

  pub fn is_empty(&self) -> bool {
    self.data.is_empty()
  }

  /// 每个掩码的前景像素数
  pub fn areas(&self) -> Vec<usize> {
    self
      .data
      .iter()
      .map(|mask| mask.pixels().filter(|p| p.0[0] > 0).count())
      .collect()
  }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Keypoint {
  pub x: f32,
  pub y: f32,
  /// 二维关键点模型没有可见性分数
  pub score: Option<f32>,
}

#[derive(Debug, Clone, Default)]
pub struct Keypoints {
  pub data: Box<[Box<[Keypoint]>]>,
}

impl Keypoints {
  pub fn len(&self) -> usize {
    self.data.len()
  }

  pub fn is_empty(&self) -> bool {
    self.data.is_empty()
  }
}

#[derive(Debug, Clone, Default)]
pub struct Probs {
  pub data: Box<[f32]>,
}

impl Probs {
  pub fn top1(&self) -> Option<(usize, f32)> {
    self.top_k(1).first().copied()
  }

  pub fn top5(&self) -> Vec<(usize, f32)> {
    self.top_k(5)
  }

  pub fn top_k(&self, k: usize) -> Vec<(usize, f32)> {
    let mut indexed: Vec<(usize, f32)> = self.data.iter().copied().enumerate().collect();
    indexed.sort_by(|a, b| b.1.total_cmp(&a.1));
    indexed.truncate(k);
    indexed
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ObbItem {
  pub class_id: usize,
  pub score: f32,
  pub xywhr: [f32; 5], // [cx, cy, w, h, 弧度]，原图像素坐标
}

impl ObbItem {
  /// 四个角点，顺时针
  pub fn corners(&self) -> [(f32, f32); 4] {
    let [cx, cy, w, h, r] = self.xywhr;
    let (sin, cos) = r.sin_cos();
    let (dx_w, dy_w) = (w / 2.0 * cos, w / 2.0 * sin);
    let (dx_h, dy_h) = (-h / 2.0 * sin, h / 2.0 * cos);
    [
      (cx + dx_w + dx_h, cy + dy_w + dy_h),
      (cx + dx_w - dx_h, cy + dy_w - dy_h),
      (cx - dx_w - dx_h, cy - dy_w - dy_h),
      (cx - dx_w + dx_h, cy - dy_w + dy_h),
    ]
  }
}

#[derive(Debug, Clone, Default)]
pub struct Obb {
  pub items: Box<[ObbItem]>,
}

impl Obb {
  pub fn len(&self) -> usize {
    self.items.len()
  }

  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }
}

/// 按模型任务区分的结果内容，只会填充该任务产生的部分
#[derive(Debug, Clone)]
pub enum Facets {
  Detect { boxes: Boxes },
  Segment { boxes: Boxes, masks: Masks },
  Pose { boxes: Boxes, keypoints: Keypoints },
  Classify { probs: Probs },
  Obb { obb: Obb },
}

impl Facets {
  pub fn task(&self) -> TaskKind {
    match self {
      Facets::Detect { .. } => TaskKind::Detect,
      Facets::Segment { .. } => TaskKind::Segment,
      Facets::Pose { .. } => TaskKind::Pose,
      Facets::Classify { .. } => TaskKind::Classify,
      Facets::Obb { .. } => TaskKind::Obb,
    }
  }
}

/// 各阶段耗时（毫秒）
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Speed {
  pub preprocess: f64,
  pub inference: f64,
  pub postprocess: f64,
}

/// 单张图像的推理结果
#[derive(Debug, Clone)]
pub struct Prediction {
  path: PathBuf,
  image: RgbImage,
  names: Arc<Labels>,
  facets: Facets,
  pub speed: Speed,
}

impl Prediction {
  pub fn new(path: impl Into<PathBuf>, image: RgbImage, names: Arc<Labels>, facets: Facets) -> Self {
    Self {
      path: path.into(),
      image,
      names,
      facets,
      speed: Speed::default(),
    }
  }

  pub fn with_speed(mut self, speed: Speed) -> Self {
    self.speed = speed;
    self
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  pub fn image(&self) -> &RgbImage {
    &self.image
  }

  /// 输入文件名（不含扩展名），用于派生输出文件名
  pub fn stem(&self) -> String {
    self
      .path
      .file_stem()
      .map(|s| s.to_string_lossy().into_owned())
      .unwrap_or_else(|| "frame".to_string())
  }

  pub fn orig_shape(&self) -> (u32, u32) {
    (self.image.height(), self.image.width())
  }

  pub fn names(&self) -> &Labels {
    &self.names
  }

  pub fn facets(&self) -> &Facets {
    &self.facets
  }

  pub fn task(&self) -> TaskKind {
    self.facets.task()
  }

  pub fn boxes(&self) -> Option<&Boxes> {
    match &self.facets {
      Facets::Detect { boxes } | Facets::Segment { boxes, .. } | Facets::Pose { boxes, .. } => {
        Some(boxes)
      }
      _ => None,
    }
  }

  pub fn masks(&self) -> Option<&Masks> {
    match &self.facets {
      Facets::Segment { masks, .. } => Some(masks),
      _ => None,
    }
  }

  pub fn keypoints(&self) -> Option<&Keypoints> {
    match &self.facets {
      Facets::Pose { keypoints, .. } => Some(keypoints),
      _ => None,
    }
  }

  pub fn probs(&self) -> Option<&Probs> {
    match &self.facets {
      Facets::Classify { probs } => Some(probs),
      _ => None,
    }
  }

  pub fn obb(&self) -> Option<&Obb> {
    match &self.facets {
      Facets::Obb { obb } => Some(obb),
      _ => None,
    }
  }

  pub fn is_empty(&self) -> bool {
    match &self.facets {
      Facets::Detect { boxes } | Facets::Segment { boxes, .. } | Facets::Pose { boxes, .. } => {
        boxes.is_empty()
      }
      Facets::Classify { probs } => probs.data.is_empty(),
      Facets::Obb { obb } => obb.is_empty(),
    }
  }

  /// 形如 `2 person, 1 bus` 的简短描述
  pub fn verbose(&self) -> String {
    if let Some(probs) = self.probs() {
      return probs
        .top5()
        .iter()
        .map(|(id, p)| format!("{} {:.2}", self.names.name(*id), p))
        .collect::<Vec<_>>()
        .join(", ");
    }

    let class_ids: Vec<usize> = match &self.facets {
      Facets::Obb { obb } => obb.items.iter().map(|o| o.class_id).collect(),
      _ => self
        .boxes()
        .map(|b| b.iter().map(|d| d.class_id).collect())
        .unwrap_or_default(),
    };

    if class_ids.is_empty() {
      return "(no detections)".to_string();
    }

    let mut counts: Vec<(usize, usize)> = Vec::new();
    for id in class_ids {
      match counts.iter_mut().find(|(c, _)| *c == id) {
        Some((_, n)) => *n += 1,
        None => counts.push((id, 1)),
      }
    }
    counts.sort_by_key(|(id, _)| *id);
    counts
      .iter()
      .map(|(id, n)| format!("{} {}", n, self.names.name(*id)))
      .collect::<Vec<_>>()
      .join(", ")
  }

  pub fn to_json(&self) -> Value {
    let (height, width) = self.orig_shape();
    let names = &self.names;

    let detections: Vec<Value> = match &self.facets {
      Facets::Classify { probs } => probs
        .top5()
        .iter()
        .map(|(id, p)| json!({ "class": id, "name": names.name(*id), "confidence": p }))
        .collect(),
      Facets::Obb { obb } => obb
        .items
        .iter()
        .map(|o| {
          json!({
            "class": o.class_id,
            "name": names.name(o.class_id),
            "confidence": o.score,
            "xywhr": o.xywhr,
          })
        })
        .collect(),
      _ => {
        let boxes = self.boxes().map(|b| &b.items[..]).unwrap_or(&[]);
        boxes
          .iter()
          .enumerate()
          .map(|(i, d)| {
            let mut entry = json!({
              "class": d.class_id,
              "name": names.name(d.class_id),
              "confidence": d.score,
              "box": { "x1": d.bbox[0], "y1": d.bbox[1], "x2": d.bbox[2], "y2": d.bbox[3] },
            });
            if let Some(kpts) = self.keypoints().and_then(|k| k.data.get(i)) {
              entry["keypoints"] = kpts
                .iter()
                .map(|k| json!({ "x": k.x, "y": k.y, "visible": k.score }))
                .collect();
            }
            if let Some(area) = self.masks().and_then(|m| m.data.get(i)).map(|mask| {
              mask.pixels().filter(|p| p.0[0] > 0).count()
            }) {
              entry["mask_area"] = json!(area);
            }
            entry
          })
          .collect()
      }
    };

    json!({
      "path": self.path.display().to_string(),
      "task": self.task().as_str(),
      "shape": [height, width],
      "speed": {
        "preprocess": self.speed.preprocess,
        "inference": self.speed.inference,
        "postprocess": self.speed.postprocess,
      },
      "detections": detections,
    })
  }
}
