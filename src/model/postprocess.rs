// 该文件是 Kanjian （看见） 项目的一部分。
// src/model/postprocess.rs - 输出张量解码
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

use image::{GrayImage, Luma};
use tracing::{debug, error};

use crate::{
  model::{Letterbox, ModelMetadata, TaskKind, YoloError},
  prediction::{
    Boxes, DetectItem, Facets, Keypoint, Keypoints, Masks, Obb, ObbItem, Probs,
  },
};

const END2END_WIDTH: usize = 6;
const PROBIOU_EPS: f32 = 1e-7;

/// 一个输出张量的数据与形状
#[derive(Debug, Clone, PartialEq)]
pub struct RawOutput {
  pub shape: Vec<usize>,
  pub data: Vec<f32>,
}

impl RawOutput {
  pub fn new(shape: Vec<usize>, data: Vec<f32>) -> Self {
    Self { shape, data }
  }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PostprocessConfig {
  pub confidence: f32,
  pub iou: f32,
  pub max_det: usize,
}

impl Default for PostprocessConfig {
  fn default() -> Self {
    Self {
      confidence: 0.25,
      iou: 0.7,
      max_det: 300,
    }
  }
}

/// 候选框，坐标位于模型输入空间
#[derive(Debug, Clone)]
struct Candidate {
  class_id: usize,
  score: f32,
  xyxy: [f32; 4],
  /// 框与类别之后的附加通道（掩码系数、关键点、角度）
  extra: Vec<f32>,
}

/// 未给出任务类型时根据输出形状推断
pub fn infer_task(meta: &ModelMetadata, outputs: &[RawOutput]) -> TaskKind {
  if let Some(task) = meta.task {
    return task;
  }
  match outputs {
    [first, ..] if first.shape.len() == 2 => TaskKind::Classify,
    [_, protos, ..] if protos.shape.len() == 4 => TaskKind::Segment,
    _ => TaskKind::Detect,
  }
}

pub fn postprocess(
  task: TaskKind,
  outputs: &[RawOutput],
  meta: &ModelMetadata,
  letterbox: &Letterbox,
  config: &PostprocessConfig,
) -> Result<Facets, YoloError> {
  let first = outputs
    .first()
    .ok_or_else(|| YoloError::OutputShape("模型没有输出".to_string()))?;
  debug!("后处理 {} 输出，形状 {:?}", task, first.shape);

  match task {
    TaskKind::Detect => {
      let items = if meta.end2end || is_end2end(first) {
        decode_end2end(first, config)?
      } else {
        let candidates = decode_candidates(first, 0, config.confidence)?;
        nms(candidates, config)
      };
      Ok(Facets::Detect {
        boxes: to_boxes(&items, letterbox),
      })
    }
    TaskKind::Segment => {
      let protos = outputs
        .get(1)
        .ok_or_else(|| YoloError::OutputShape("分割模型缺少原型输出".to_string()))?;
      let [_, nm, mh, mw] = protos.shape[..] else {
        return Err(shape_error("原型输出", &protos.shape, "[1, nm, mh, mw]"));
      };
      let candidates = decode_candidates(first, nm, config.confidence)?;
      let items = nms(candidates, config);
      let masks = items
        .iter()
        .map(|c| decode_mask(c, &protos.data, (nm, mh, mw), letterbox))
        .collect::<Vec<_>>();
      Ok(Facets::Segment {
        boxes: to_boxes(&items, letterbox),
        masks: Masks {
          data: masks.into_boxed_slice(),
        },
      })
    }
    TaskKind::Pose => {
      let (nk, kd) = meta.kpt_shape;
      if nk == 0 || kd < 2 {
        return Err(YoloError::OutputShape(format!("关键点形状无效: {:?}", meta.kpt_shape)));
      }
      let candidates = decode_candidates(first, nk * kd, config.confidence)?;
      let items = nms(candidates, config);
      let keypoints = items
        .iter()
        .map(|c| {
          c.extra
            .chunks_exact(kd)
            .map(|k| {
              let (x, y) = letterbox.to_original_point(k[0], k[1]);
              Keypoint {
                x,
                y,
                score: k.get(2).copied(),
              }
            })
            .collect::<Vec<_>>()
            .into_boxed_slice()
        })
        .collect::<Vec<_>>();
      Ok(Facets::Pose {
        boxes: to_boxes(&items, letterbox),
        keypoints: Keypoints {
          data: keypoints.into_boxed_slice(),
        },
      })
    }
    TaskKind::Classify => {
      let nc = *first.shape.last().unwrap_or(&0);
      if first.data.len() < nc || nc == 0 {
        return Err(shape_error("分类输出", &first.shape, "[1, nc]"));
      }
      Ok(Facets::Classify {
        probs: Probs {
          data: to_probabilities(&first.data[..nc]).into_boxed_slice(),
        },
      })
    }
    TaskKind::Obb => Ok(Facets::Obb {
      obb: decode_obb(first, letterbox, config)?,
    }),
  }
}

fn shape_error(what: &str, shape: &[usize], expected: &str) -> YoloError {
  error!("{} 形状 {:?} 不符合预期 {}", what, shape, expected);
  YoloError::OutputShape(format!("{what} 形状 {shape:?}，期望 {expected}"))
}

fn is_end2end(output: &RawOutput) -> bool {
  matches!(output.shape[..], [1, k, END2END_WIDTH] if k > END2END_WIDTH)
}

/// `[1, 4 + nc + extra, N]`：每列一个候选，取最高类别分数
fn decode_candidates(
  output: &RawOutput,
  extra: usize,
  confidence: f32,
) -> Result<Vec<Candidate>, YoloError> {
  let [1, channels, n] = output.shape[..] else {
    return Err(shape_error("检测输出", &output.shape, "[1, 4 + nc + extra, N]"));
  };
  if channels <= 4 + extra || output.data.len() < channels * n {
    return Err(shape_error("检测输出", &output.shape, "[1, 4 + nc + extra, N]"));
  }
  let nc = channels - 4 - extra;
  let at = |c: usize, i: usize| output.data[c * n + i];

  let mut candidates = Vec::new();
  for i in 0..n {
    let (class_id, score) = (0..nc)
      .map(|c| (c, at(4 + c, i)))
      .fold((0, f32::MIN), |best, cur| if cur.1 > best.1 { cur } else { best });

    if score < confidence {
      continue;
    }

    let (cx, cy, w, h) = (at(0, i), at(1, i), at(2, i), at(3, i));
    candidates.push(Candidate {
      class_id,
      score,
      xyxy: [cx - w / 2.0, cy - h / 2.0, cx + w / 2.0, cy + h / 2.0],
      extra: (0..extra).map(|e| at(4 + nc + e, i)).collect(),
    });
  }

  debug!("置信度过滤后剩余 {} 个候选", candidates.len());
  Ok(candidates)
}

/// `[1, K, 6]`：x1, y1, x2, y2, score, class，模型内部已去重
fn decode_end2end(output: &RawOutput, config: &PostprocessConfig) -> Result<Vec<Candidate>, YoloError> {
  if output.shape.len() != 3 || output.shape[2] != END2END_WIDTH {
    return Err(shape_error("端到端输出", &output.shape, "[1, K, 6]"));
  }
  let mut items: Vec<Candidate> = output
    .data
    .chunks_exact(END2END_WIDTH)
    .filter(|row| row[4] >= config.confidence)
    .map(|row| Candidate {
      class_id: row[5].max(0.0) as usize,
      score: row[4],
      xyxy: [row[0], row[1], row[2], row[3]],
      extra: Vec::new(),
    })
    .collect();
  items.sort_by(|a, b| b.score.total_cmp(&a.score));
  items.truncate(config.max_det);
  Ok(items)
}

fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
  let x1 = a[0].max(b[0]);
  let y1 = a[1].max(b[1]);
  let x2 = a[2].min(b[2]);
  let y2 = a[3].min(b[3]);

  let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
  let area_a = (a[2] - a[0]).max(0.0) * (a[3] - a[1]).max(0.0);
  let area_b = (b[2] - b[0]).max(0.0) * (b[3] - b[1]).max(0.0);
  let union = area_a + area_b - intersection;

  if union > 0.0 { intersection / union } else { 0.0 }
}

/// 按类别的非极大值抑制
fn nms(candidates: Vec<Candidate>, config: &PostprocessConfig) -> Vec<Candidate> {
  suppress(candidates, config, |c| c.score, |c| c.class_id, |a, b| {
    iou(&a.xyxy, &b.xyxy)
  })
}

fn suppress<T>(
  mut items: Vec<T>,
  config: &PostprocessConfig,
  score: impl Fn(&T) -> f32,
  class: impl Fn(&T) -> usize,
  overlap: impl Fn(&T, &T) -> f32,
) -> Vec<T> {
  items.sort_by(|a, b| score(b).total_cmp(&score(a)));

  let mut kept: Vec<T> = Vec::new();
  for item in items {
    if kept.len() >= config.max_det {
      break;
    }
    let suppressed = kept
      .iter()
      .any(|k| class(k) == class(&item) && overlap(k, &item) > config.iou);
    if !suppressed {
      kept.push(item);
    }
  }
  kept
}

fn to_boxes(items: &[Candidate], letterbox: &Letterbox) -> Boxes {
  Boxes {
    items: items
      .iter()
      .map(|c| DetectItem {
        class_id: c.class_id,
        score: c.score,
        bbox: letterbox.to_original_xyxy(c.xyxy),
      })
      .collect(),
  }
}

fn sigmoid(x: f32) -> f32 {
  1.0 / (1.0 + (-x).exp())
}

fn to_probabilities(scores: &[f32]) -> Vec<f32> {
  let sum: f32 = scores.iter().sum();
  let already = scores.iter().all(|p| (0.0..=1.0).contains(p)) && (sum - 1.0).abs() < 1e-3;
  if already {
    return scores.to_vec();
  }
  let max = scores.iter().copied().fold(f32::MIN, f32::max);
  let exp: Vec<f32> = scores.iter().map(|s| (s - max).exp()).collect();
  let total: f32 = exp.iter().sum();
  exp.into_iter().map(|e| e / total).collect()
}

/// 掩码系数与原型线性组合，在原图尺寸上裁剪到检测框并以 0.5 为阈值
fn decode_mask(
  candidate: &Candidate,
  protos: &[f32],
  (nm, mh, mw): (usize, usize, usize),
  letterbox: &Letterbox,
) -> GrayImage {
  let plane = mh * mw;
  let mut logits = vec![0.0f32; plane];
  for (k, coeff) in candidate.extra.iter().enumerate().take(nm) {
    let proto = &protos[k * plane..(k + 1) * plane];
    for (logit, p) in logits.iter_mut().zip(proto) {
      *logit += coeff * p;
    }
  }

  let (ow, oh) = letterbox.original;
  let (in_w, in_h) = (letterbox.input.0 as f32, letterbox.input.1 as f32);
  let (sx, sy) = (mw as f32 / in_w, mh as f32 / in_h);
  let [x1, y1, x2, y2] = letterbox.to_original_xyxy(candidate.xyxy);

  let sample = |px: f32, py: f32| -> f32 {
    let px = (px - 0.5).clamp(0.0, (mw - 1) as f32);
    let py = (py - 0.5).clamp(0.0, (mh - 1) as f32);
    let (x0, y0) = (px.floor() as usize, py.floor() as usize);
    let (x1, y1) = ((x0 + 1).min(mw - 1), (y0 + 1).min(mh - 1));
    let (fx, fy) = (px - x0 as f32, py - y0 as f32);
    let top = logits[y0 * mw + x0] * (1.0 - fx) + logits[y0 * mw + x1] * fx;
    let bottom = logits[y1 * mw + x0] * (1.0 - fx) + logits[y1 * mw + x1] * fx;
    top * (1.0 - fy) + bottom * fy
  };

  let mut mask = GrayImage::new(ow, oh);
  if plane == 0 {
    return mask;
  }
  let (cx1, cy1) = (x1.floor().max(0.0) as u32, y1.floor().max(0.0) as u32);
  let (cx2, cy2) = (x2.ceil().min(ow as f32) as u32, y2.ceil().min(oh as f32) as u32);
  for y in cy1..cy2 {
    for x in cx1..cx2 {
      let (fx, fy) = (x as f32 + 0.5, y as f32 + 0.5);
      if fx < x1 || fx > x2 || fy < y1 || fy > y2 {
        continue;
      }
      let (ix, iy) = letterbox.to_input_point(fx, fy);
      if sigmoid(sample(ix * sx, iy * sy)) > 0.5 {
        mask.put_pixel(x, y, Luma([255]));
      }
    }
  }
  mask
}

/// `[1, 4 + nc + 1, N]`：cx, cy, w, h, 类别分数, 角度
fn decode_obb(
  output: &RawOutput,
  letterbox: &Letterbox,
  config: &PostprocessConfig,
) -> Result<Obb, YoloError> {
  let candidates = decode_candidates(output, 1, config.confidence)?;
  let rotated: Vec<ObbItem> = candidates
    .into_iter()
    .map(|c| {
      let [x1, y1, x2, y2] = c.xyxy;
      ObbItem {
        class_id: c.class_id,
        score: c.score,
        xywhr: regularize([
          (x1 + x2) / 2.0,
          (y1 + y2) / 2.0,
          x2 - x1,
          y2 - y1,
          c.extra[0],
        ]),
      }
    })
    .collect();

  let kept = suppress(rotated, config, |o| o.score, |o| o.class_id, |a, b| {
    probiou(&a.xywhr, &b.xywhr)
  });

  let items = kept
    .into_iter()
    .map(|mut o| {
      let [cx, cy, w, h, r] = o.xywhr;
      let (ox, oy) = letterbox.to_original_point(cx, cy);
      o.xywhr = [ox, oy, w / letterbox.scale.0, h / letterbox.scale.1, r];
      o
    })
    .collect();
  Ok(Obb { items })
}

/// 统一为 w >= h，角度落在 [0, π)
fn regularize([cx, cy, w, h, r]: [f32; 5]) -> [f32; 5] {
  let pi = std::f32::consts::PI;
  let (w, h, r) = if w >= h { (w, h, r) } else { (h, w, r + pi / 2.0) };
  [cx, cy, w, h, r.rem_euclid(pi)]
}

fn covariance([_, _, w, h, r]: &[f32; 5]) -> (f32, f32, f32) {
  let (a, b) = (w * w / 12.0, h * h / 12.0);
  let (sin, cos) = r.sin_cos();
  (
    a * cos * cos + b * sin * sin,
    a * sin * sin + b * cos * cos,
    (a - b) * cos * sin,
  )
}

/// 基于高斯分布 Hellinger 距离的旋转框相似度
fn probiou(o1: &[f32; 5], o2: &[f32; 5]) -> f32 {
  let (x1, y1) = (o1[0], o1[1]);
  let (x2, y2) = (o2[0], o2[1]);
  let (a1, b1, c1) = covariance(o1);
  let (a2, b2, c2) = covariance(o2);

  let det = (a1 + a2) * (b1 + b2) - (c1 + c2).powi(2);
  let t1 = ((a1 + a2) * (y1 - y2).powi(2) + (b1 + b2) * (x1 - x2).powi(2)) / (det + PROBIOU_EPS) * 0.25;
  let t2 = ((c1 + c2) * (x2 - x1) * (y1 - y2)) / (det + PROBIOU_EPS) * 0.5;
  let t3 = (det
    / (4.0 * ((a1 * b1 - c1 * c1).max(0.0) * (a2 * b2 - c2 * c2).max(0.0)).sqrt() + PROBIOU_EPS)
    + PROBIOU_EPS)
    .ln()
    * 0.5;
  let bd = (t1 + t2 + t3).clamp(PROBIOU_EPS, 100.0);
  let hd = (1.0 - (-bd).exp() + PROBIOU_EPS).sqrt();
  1.0 - hd
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::Labels;

  fn identity(size: u32) -> Letterbox {
    Letterbox {
      scale: (1.0, 1.0),
      pad: (0.0, 0.0),
      input: (size, size),
      original: (size, size),
    }
  }

  /// 按 `[1, C, N]` 布局排列的候选列
  fn columns(cols: &[Vec<f32>]) -> RawOutput {
    let channels = cols[0].len();
    let n = cols.len();
    let mut data = vec![0.0; channels * n];
    for (i, col) in cols.iter().enumerate() {
      for (c, v) in col.iter().enumerate() {
        data[c * n + i] = *v;
      }
    }
    RawOutput::new(vec![1, channels, n], data)
  }

  fn meta(task: TaskKind) -> ModelMetadata {
    ModelMetadata {
      task: Some(task),
      names: Labels::from(vec!["a".to_string(), "b".to_string()]),
      ..ModelMetadata::default()
    }
  }

  #[test]
  fn detect_filters_and_suppresses() {
    let output = columns(&[
      vec![50.0, 50.0, 20.0, 20.0, 0.9, 0.1],
      // 与第一个高度重叠的同类框
      vec![51.0, 50.0, 20.0, 20.0, 0.8, 0.1],
      // 同位置但不同类别，保留
      vec![50.0, 50.0, 20.0, 20.0, 0.1, 0.7],
      // 低于置信度阈值
      vec![10.0, 10.0, 5.0, 5.0, 0.1, 0.2],
    ]);

    let facets = postprocess(
      TaskKind::Detect,
      &[output],
      &meta(TaskKind::Detect),
      &identity(100),
      &PostprocessConfig::default(),
    )
    .unwrap();

    let Facets::Detect { boxes } = facets else {
      panic!("expected detect facets");
    };
    assert_eq!(boxes.len(), 2);
    assert_eq!(boxes.items[0].class_id, 0);
    assert_eq!(boxes.items[0].score, 0.9);
    assert_eq!(boxes.items[0].bbox, [40.0, 40.0, 60.0, 60.0]);
    assert_eq!(boxes.items[1].class_id, 1);
  }

  #[test]
  fn max_det_caps_results() {
    let output = columns(&[
      vec![10.0, 10.0, 4.0, 4.0, 0.9],
      vec![30.0, 30.0, 4.0, 4.0, 0.8],
      vec![60.0, 60.0, 4.0, 4.0, 0.7],
    ]);
    let config = PostprocessConfig {
      max_det: 2,
      ..PostprocessConfig::default()
    };
    let facets = postprocess(
      TaskKind::Detect,
      &[output],
      &meta(TaskKind::Detect),
      &identity(100),
      &config,
    )
    .unwrap();
    let Facets::Detect { boxes } = facets else {
      panic!("expected detect facets");
    };
    assert_eq!(boxes.len(), 2);
    assert_eq!(boxes.items[1].score, 0.8);
  }

  #[test]
  fn end2end_output_skips_nms() {
    let output = RawOutput::new(
      vec![1, 8, 6],
      [
        [10.0, 10.0, 30.0, 30.0, 0.9, 1.0],
        [11.0, 10.0, 31.0, 30.0, 0.8, 1.0],
        [0.0, 0.0, 0.0, 0.0, 0.01, 0.0],
        [0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
        [0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
        [0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
        [0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
        [0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
      ]
      .concat(),
    );
    let facets = postprocess(
      TaskKind::Detect,
      &[output],
      &ModelMetadata::default(),
      &identity(100),
      &PostprocessConfig::default(),
    )
    .unwrap();
    let Facets::Detect { boxes } = facets else {
      panic!("expected detect facets");
    };
    assert_eq!(boxes.len(), 2);
    assert_eq!(boxes.items[1].bbox, [11.0, 10.0, 31.0, 30.0]);
  }

  #[test]
  fn boxes_are_mapped_to_original_image() {
    let output = columns(&[vec![32.0, 32.0, 16.0, 8.0, 0.9]]);
    let letterbox = Letterbox {
      scale: (0.32, 0.32),
      pad: (0.0, 16.0),
      input: (64, 64),
      original: (200, 100),
    };
    let facets = postprocess(
      TaskKind::Detect,
      &[output],
      &meta(TaskKind::Detect),
      &letterbox,
      &PostprocessConfig::default(),
    )
    .unwrap();
    let Facets::Detect { boxes } = facets else {
      panic!("expected detect facets");
    };
    let [x1, y1, x2, y2] = boxes.items[0].bbox;
    assert!((x1 - 75.0).abs() < 1e-3);
    assert!((y1 - 37.5).abs() < 1e-3);
    assert!((x2 - 125.0).abs() < 1e-3);
    assert!((y2 - 62.5).abs() < 1e-3);
  }

  #[test]
  fn pose_keeps_keypoints_aligned_with_boxes() {
    let mut m = meta(TaskKind::Pose);
    m.kpt_shape = (2, 3);
    let output = columns(&[vec![
      50.0, 50.0, 20.0, 20.0, 0.9, 0.0, 45.0, 46.0, 0.8, 55.0, 56.0, 0.2,
    ]]);
    let facets = postprocess(
      TaskKind::Pose,
      &[output],
      &m,
      &identity(100),
      &PostprocessConfig::default(),
    )
    .unwrap();
    let Facets::Pose { boxes, keypoints } = facets else {
      panic!("expected pose facets");
    };
    assert_eq!(boxes.len(), 1);
    assert_eq!(boxes.items[0].class_id, 0);
    assert_eq!(keypoints.len(), 1);
    assert_eq!(
      keypoints.data[0][1],
      Keypoint {
        x: 55.0,
        y: 56.0,
        score: Some(0.2)
      }
    );
  }

  #[test]
  fn segment_mask_is_cropped_to_box() {
    // 一个系数、一个全正的 4x4 原型：框内全部为前景
    let output = columns(&[vec![8.0, 8.0, 8.0, 8.0, 0.9, 0.0, 1.0]]);
    let protos = RawOutput::new(vec![1, 1, 4, 4], vec![5.0; 16]);
    let facets = postprocess(
      TaskKind::Segment,
      &[output, protos],
      &meta(TaskKind::Segment),
      &identity(16),
      &PostprocessConfig::default(),
    )
    .unwrap();
    let Facets::Segment { boxes, masks } = facets else {
      panic!("expected segment facets");
    };
    assert_eq!(boxes.len(), masks.len());
    let mask = &masks.data[0];
    assert_eq!(mask.dimensions(), (16, 16));
    assert_eq!(mask.get_pixel(8, 8).0[0], 255);
    assert_eq!(mask.get_pixel(1, 1).0[0], 0);
    assert_eq!(masks.areas(), vec![64]);
  }

  #[test]
  fn segment_without_protos_is_a_shape_error() {
    let output = columns(&[vec![8.0, 8.0, 8.0, 8.0, 0.9, 1.0]]);
    let err = postprocess(
      TaskKind::Segment,
      &[output],
      &meta(TaskKind::Segment),
      &identity(16),
      &PostprocessConfig::default(),
    )
    .unwrap_err();
    assert!(matches!(err, YoloError::OutputShape(_)));
  }

  #[test]
  fn classify_applies_softmax_to_logits() {
    let output = RawOutput::new(vec![1, 3], vec![2.0, 0.0, 0.0]);
    let facets = postprocess(
      TaskKind::Classify,
      &[output],
      &meta(TaskKind::Classify),
      &identity(8),
      &PostprocessConfig::default(),
    )
    .unwrap();
    let Facets::Classify { probs } = facets else {
      panic!("expected classify facets");
    };
    let sum: f32 = probs.data.iter().sum();
    assert!((sum - 1.0).abs() < 1e-5);
    assert_eq!(probs.top1().map(|(id, _)| id), Some(0));
  }

  #[test]
  fn classify_keeps_probabilities() {
    assert_eq!(to_probabilities(&[0.25, 0.75]), vec![0.25, 0.75]);
  }

  #[test]
  fn obb_suppresses_rotated_duplicates() {
    let output = columns(&[
      vec![50.0, 50.0, 30.0, 10.0, 0.9, 0.3],
      vec![50.0, 51.0, 30.0, 10.0, 0.8, 0.3],
      vec![10.0, 10.0, 6.0, 12.0, 0.7, 0.0],
    ]);
    let obb = decode_obb(&output, &identity(100), &PostprocessConfig::default()).unwrap();
    assert_eq!(obb.len(), 2);
    assert_eq!(obb.items[0].score, 0.9);
    // 第三个框 w < h，被规整为 w >= h 并旋转 90°
    let [_, _, w, h, r] = obb.items[1].xywhr;
    assert_eq!((w, h), (12.0, 6.0));
    assert!((r - std::f32::consts::FRAC_PI_2).abs() < 1e-5);
  }

  #[test]
  fn probiou_of_identical_boxes_is_one() {
    let b = [10.0, 10.0, 8.0, 4.0, 0.3];
    assert!(probiou(&b, &b) > 0.99);
    let far = [90.0, 90.0, 8.0, 4.0, 0.3];
    assert!(probiou(&b, &far) < 0.01);
  }

  #[test]
  fn task_is_inferred_from_shapes() {
    let m = ModelMetadata::default();
    let cls = RawOutput::new(vec![1, 10], vec![0.0; 10]);
    let det = RawOutput::new(vec![1, 6, 2], vec![0.0; 12]);
    let protos = RawOutput::new(vec![1, 32, 4, 4], vec![0.0; 512]);
    assert_eq!(infer_task(&m, &[cls]), TaskKind::Classify);
    assert_eq!(infer_task(&m, &[det.clone()]), TaskKind::Detect);
    assert_eq!(infer_task(&m, &[det, protos]), TaskKind::Segment);
  }

  #[test]
  fn malformed_output_is_rejected() {
    let output = RawOutput::new(vec![1, 4, 3], vec![0.0; 12]);
    let err = postprocess(
      TaskKind::Detect,
      &[output],
      &meta(TaskKind::Detect),
      &identity(16),
      &PostprocessConfig::default(),
    )
    .unwrap_err();
    assert!(matches!(err, YoloError::OutputShape(_)));
  }

  #[test]
  fn invalid_keypoint_shape_is_an_error() {
    let mut m = meta(TaskKind::Pose);
    m.kpt_shape = (17, 0);
    let output = columns(&[vec![50.0, 50.0, 20.0, 20.0, 0.9, 0.0]]);
    let err = postprocess(
      TaskKind::Pose,
      &[output],
      &m,
      &identity(100),
      &PostprocessConfig::default(),
    )
    .unwrap_err();
    assert!(matches!(err, YoloError::OutputShape(_)));
  }
}
