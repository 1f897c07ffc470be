// 该文件是 Kanjian （看见） 项目的一部分。
// src/output/draw.rs - 推理结果可视化
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

use ab_glyph::{FontArc, PxScale};
use image::{GrayImage, Rgb, RgbImage};
use imageproc::drawing::{
  draw_filled_circle_mut, draw_filled_rect_mut, draw_hollow_polygon_mut, draw_hollow_rect_mut,
  draw_line_segment_mut, draw_text_mut, text_size,
};
use imageproc::point::Point;
use imageproc::rect::Rect;

use crate::prediction::{Facets, Keypoint, Prediction};

// 文本渲染常量
const LABEL_FONT_SIZE: f32 = 18.0;
const LABEL_TEXT_VERTICAL_PADDING: i32 = 2;
const LABEL_TEXT_HORIZONTAL_PADDING: i32 = 4;
const PALETTE_SIZE: usize = 80;
const MASK_ALPHA: f32 = 0.5;
const KEYPOINT_RADIUS: i32 = 3;
const KEYPOINT_MIN_SCORE: f32 = 0.5;

/// COCO 17 点人体骨架（关键点下标从 0 开始）
const SKELETON: [(usize, usize); 19] = [
  (15, 13),
  (13, 11),
  (16, 14),
  (14, 12),
  (11, 12),
  (5, 11),
  (6, 12),
  (5, 6),
  (5, 7),
  (6, 8),
  (7, 9),
  (8, 10),
  (1, 2),
  (0, 1),
  (0, 2),
  (1, 3),
  (2, 4),
  (3, 5),
  (4, 6),
];

pub struct Draw {
  font: FontArc,
  font_scale: PxScale,
  /// 按类别循环使用的颜色
  colors: Vec<Rgb<u8>>,
  text_color: Rgb<u8>,
}

impl Default for Draw {
  fn default() -> Self {
    let font_data = include_bytes!("../../assets/DejaVuSans.ttf");
    let font = FontArc::try_from_slice(font_data).expect("无法加载嵌入的字体文件");

    let colors = (0..PALETTE_SIZE)
      .map(|i| {
        let hue = (i as f32 / PALETTE_SIZE as f32) * 360.0;
        hsv_to_rgb(hue, 0.8, 0.9)
      })
      .collect();

    Self {
      font,
      font_scale: PxScale::from(LABEL_FONT_SIZE),
      colors,
      text_color: Rgb([255, 255, 255]),
    }
  }
}

/// HSV 转 RGB
fn hsv_to_rgb(h: f32, s: f32, v: f32) -> Rgb<u8> {
  let c = v * s;
  let x = c * (1.0 - ((h / 60.0) % 2.0 - 1.0).abs());
  let m = v - c;

  let (r, g, b) = if h < 60.0 {
    (c, x, 0.0)
  } else if h < 120.0 {
    (x, c, 0.0)
  } else if h < 180.0 {
    (0.0, c, x)
  } else if h < 240.0 {
    (0.0, x, c)
  } else if h < 300.0 {
    (x, 0.0, c)
  } else {
    (c, 0.0, x)
  };

  Rgb([
    ((r + m) * 255.0) as u8,
    ((g + m) * 255.0) as u8,
    ((b + m) * 255.0) as u8,
  ])
}

/// 去掉重合的角点，不足三个不同点时不绘制
fn outline(corners: &[(f32, f32)]) -> Option<Vec<Point<f32>>> {
  let mut points: Vec<Point<f32>> = corners.iter().map(|&(x, y)| Point::new(x, y)).collect();
  points.dedup();
  while points.len() > 1 && points.first() == points.last() {
    points.pop();
  }
  (points.len() >= 3).then_some(points)
}

impl Draw {
  pub fn color(&self, class_id: usize) -> Rgb<u8> {
    self.colors[class_id % self.colors.len()]
  }

  /// 在原图副本上绘制全部结果
  pub fn annotate(&self, prediction: &Prediction) -> RgbImage {
    let mut image = prediction.image().clone();
    let names = prediction.names();

    match prediction.facets() {
      Facets::Detect { boxes } => {
        for item in boxes.iter() {
          let label = format!("{} {:.2}", names.name(item.class_id), item.score);
          self.draw_bbox_with_label(&mut image, &item.bbox, &label, self.color(item.class_id));
        }
      }
      Facets::Segment { boxes, masks } => {
        for (item, mask) in boxes.iter().zip(masks.data.iter()) {
          self.blend_mask(&mut image, mask, self.color(item.class_id));
        }
        for item in boxes.iter() {
          let label = format!("{} {:.2}", names.name(item.class_id), item.score);
          self.draw_bbox_with_label(&mut image, &item.bbox, &label, self.color(item.class_id));
        }
      }
      Facets::Pose { boxes, keypoints } => {
        for (i, item) in boxes.iter().enumerate() {
          let label = format!("{} {:.2}", names.name(item.class_id), item.score);
          self.draw_bbox_with_label(&mut image, &item.bbox, &label, self.color(item.class_id));
          if let Some(points) = keypoints.data.get(i) {
            self.draw_keypoints(&mut image, points);
          }
        }
      }
      Facets::Classify { probs } => {
        let line_height = LABEL_FONT_SIZE as i32 + LABEL_TEXT_VERTICAL_PADDING * 2;
        for (row, (id, p)) in probs.top5().into_iter().enumerate() {
          let text = format!("{} {:.2}", names.name(id), p);
          let y = 8 + row as i32 * line_height;
          self.draw_label(&mut image, 8, y, &text, self.color(id));
        }
      }
      Facets::Obb { obb } => {
        for item in obb.items.iter() {
          let corners = item.corners();
          let Some(polygon) = outline(&corners) else {
            continue;
          };
          let color = self.color(item.class_id);
          draw_hollow_polygon_mut(&mut image, &polygon, color);

          let label = format!("{} {:.2}", names.name(item.class_id), item.score);
          let (x, y) = corners
            .iter()
            .copied()
            .fold((f32::MAX, f32::MAX), |(ax, ay), (x, y)| (ax.min(x), ay.min(y)));
          let text_height = LABEL_FONT_SIZE as i32 + LABEL_TEXT_VERTICAL_PADDING * 2;
          self.draw_label(&mut image, x as i32, y as i32 - text_height, &label, color);
        }
      }
    }

    image
  }

  // 矩形边框加粗为 2 像素，标签放在边框上方
  fn draw_bbox_with_label(&self, image: &mut RgbImage, bbox: &[f32; 4], label: &str, color: Rgb<u8>) {
    let (w, h) = (image.width() as i32, image.height() as i32);
    if w == 0 || h == 0 {
      return;
    }

    let x_min = (bbox[0].floor() as i32).clamp(0, w - 1);
    let y_min = (bbox[1].floor() as i32).clamp(0, h - 1);
    let x_max = (bbox[2].ceil() as i32).clamp(0, w - 1);
    let y_max = (bbox[3].ceil() as i32).clamp(0, h - 1);

    if x_min >= x_max || y_min >= y_max {
      return;
    }

    let rect = Rect::at(x_min, y_min).of_size((x_max - x_min) as u32, (y_max - y_min) as u32);
    draw_hollow_rect_mut(image, rect, color);
    if rect.width() > 2 && rect.height() > 2 {
      let inner = Rect::at(x_min + 1, y_min + 1).of_size(rect.width() - 2, rect.height() - 2);
      draw_hollow_rect_mut(image, inner, color);
    }

    let text_height = LABEL_FONT_SIZE as i32 + LABEL_TEXT_VERTICAL_PADDING * 2;
    let label_y = if y_min - text_height >= 0 {
      y_min - text_height
    } else {
      y_min
    };
    self.draw_label(image, x_min, label_y, label, color);
  }

  /// 带底色的文本
  fn draw_label(&self, image: &mut RgbImage, x: i32, y: i32, text: &str, background: Rgb<u8>) {
    let (text_width, _) = text_size(self.font_scale, &self.font, text);
    let width = text_width as i32 + LABEL_TEXT_HORIZONTAL_PADDING * 2;
    let height = LABEL_FONT_SIZE as i32 + LABEL_TEXT_VERTICAL_PADDING * 2;

    let max_x = (image.width() as i32 - width).max(0);
    let x = x.clamp(0, max_x);
    let y = y.clamp(0, (image.height() as i32 - height).max(0));

    let rect = Rect::at(x, y).of_size(width as u32, height as u32);
    draw_filled_rect_mut(image, rect, background);
    draw_text_mut(
      image,
      self.text_color,
      x + LABEL_TEXT_HORIZONTAL_PADDING,
      y + LABEL_TEXT_VERTICAL_PADDING,
      self.font_scale,
      &self.font,
      text,
    );
  }

  fn blend_mask(&self, image: &mut RgbImage, mask: &GrayImage, color: Rgb<u8>) {
    if mask.dimensions() != image.dimensions() {
      return;
    }
    for (pixel, m) in image.pixels_mut().zip(mask.pixels()) {
      if m.0[0] == 0 {
        continue;
      }
      for c in 0..3 {
        let blended = pixel.0[c] as f32 * (1.0 - MASK_ALPHA) + color.0[c] as f32 * MASK_ALPHA;
        pixel.0[c] = blended.round() as u8;
      }
    }
  }

  fn draw_keypoints(&self, image: &mut RgbImage, points: &[Keypoint]) {
    let visible = |k: &Keypoint| k.score.is_none_or(|s| s >= KEYPOINT_MIN_SCORE);

    if points.len() == 17 {
      for (i, &(a, b)) in SKELETON.iter().enumerate() {
        let (pa, pb) = (&points[a], &points[b]);
        if visible(pa) && visible(pb) {
          draw_line_segment_mut(image, (pa.x, pa.y), (pb.x, pb.y), self.color(i));
        }
      }
    }

    for (i, k) in points.iter().enumerate() {
      if visible(k) {
        draw_filled_circle_mut(
          image,
          (k.x.round() as i32, k.y.round() as i32),
          KEYPOINT_RADIUS,
          self.color(i + SKELETON.len()),
        );
      }
    }
  }
}
