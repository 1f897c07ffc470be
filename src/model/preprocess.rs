// 该文件是 Kanjian （看见） 项目的一部分。
// src/model/preprocess.rs - 输入预处理
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

use image::{Rgb, RgbImage, imageops::FilterType};
use ndarray::Array4;

const PAD_VALUE: u8 = 114;

/// 输入图像到模型输入的映射：`input = original * scale + pad`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
  pub scale: (f32, f32),
  pub pad: (f32, f32),
  /// 模型输入 (width, height)
  pub input: (u32, u32),
  /// 原图 (width, height)
  pub original: (u32, u32),
}

impl Letterbox {
  pub fn to_original_point(&self, x: f32, y: f32) -> (f32, f32) {
    let (ow, oh) = (self.original.0 as f32, self.original.1 as f32);
    (
      ((x - self.pad.0) / self.scale.0).clamp(0.0, ow),
      ((y - self.pad.1) / self.scale.1).clamp(0.0, oh),
    )
  }

  pub fn to_original_xyxy(&self, bbox: [f32; 4]) -> [f32; 4] {
    let (x1, y1) = self.to_original_point(bbox[0], bbox[1]);
    let (x2, y2) = self.to_original_point(bbox[2], bbox[3]);
    [x1, y1, x2, y2]
  }

  /// 原图像素 -> 模型输入坐标
  pub fn to_input_point(&self, x: f32, y: f32) -> (f32, f32) {
    (x * self.scale.0 + self.pad.0, y * self.scale.1 + self.pad.1)
  }
}

/// 保持长宽比缩放，四周以灰色填充到模型输入尺寸
pub fn letterbox(image: &RgbImage, input: (u32, u32)) -> (Array4<f32>, Letterbox) {
  let (width, height) = image.dimensions();
  let input = (input.0.max(1), input.1.max(1));
  let (in_w, in_h) = input;
  let ratio = (in_w as f32 / width as f32).min(in_h as f32 / height as f32);

  let new_w = ((width as f32 * ratio).round() as u32).clamp(1, in_w);
  let new_h = ((height as f32 * ratio).round() as u32).clamp(1, in_h);
  let dw = (in_w - new_w) as f32 / 2.0;
  let dh = (in_h - new_h) as f32 / 2.0;
  let left = (dw - 0.1).round().max(0.0) as u32;
  let top = (dh - 0.1).round().max(0.0) as u32;

  let resized = if (new_w, new_h) == (width, height) {
    image.clone()
  } else {
    image::imageops::resize(image, new_w, new_h, FilterType::Triangle)
  };

  let mut canvas = RgbImage::from_pixel(in_w, in_h, Rgb([PAD_VALUE; 3]));
  image::imageops::replace(&mut canvas, &resized, left as i64, top as i64);

  let mapping = Letterbox {
    scale: (new_w as f32 / width as f32, new_h as f32 / height as f32),
    pad: (left as f32, top as f32),
    input,
    original: (width, height),
  };

  (to_tensor(&canvas), mapping)
}

/// 直接拉伸到模型输入尺寸（分类模型）
pub fn stretch(image: &RgbImage, input: (u32, u32)) -> (Array4<f32>, Letterbox) {
  let (width, height) = image.dimensions();
  let resized = image::imageops::resize(image, input.0, input.1, FilterType::Triangle);
  let mapping = Letterbox {
    scale: (
      input.0 as f32 / width as f32,
      input.1 as f32 / height as f32,
    ),
    pad: (0.0, 0.0),
    input,
    original: (width, height),
  };
  (to_tensor(&resized), mapping)
}

/// RGB HWC u8 -> NCHW f32，取值 [0, 1]
fn to_tensor(image: &RgbImage) -> Array4<f32> {
  let (width, height) = image.dimensions();
  Array4::from_shape_fn(
    (1, 3, height as usize, width as usize),
    |(_, c, y, x)| image.get_pixel(x as u32, y as u32)[c] as f32 / 255.0,
  )
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn wide_image_is_padded_vertically() {
    let image = RgbImage::from_pixel(200, 100, Rgb([255, 0, 0]));
    let (tensor, lb) = letterbox(&image, (64, 64));

    assert_eq!(tensor.shape(), &[1, 3, 64, 64]);
    assert_eq!(lb.scale, (0.32, 0.32));
    assert_eq!(lb.pad, (0.0, 16.0));

    // 填充区域为灰色
    let gray = PAD_VALUE as f32 / 255.0;
    assert_eq!(tensor[[0, 0, 0, 0]], gray);
    assert_eq!(tensor[[0, 2, 63, 63]], gray);
    // 图像区域保留红色
    assert_eq!(tensor[[0, 0, 32, 32]], 1.0);
    assert_eq!(tensor[[0, 1, 32, 32]], 0.0);
  }

  #[test]
  fn coordinates_map_back_to_original() {
    let image = RgbImage::new(200, 100);
    let (_, lb) = letterbox(&image, (64, 64));

    let (x, y) = lb.to_input_point(100.0, 50.0);
    assert_eq!((x, y), (32.0, 32.0));
    assert_eq!(lb.to_original_point(x, y), (100.0, 50.0));

    // 超出图像的坐标被截断
    assert_eq!(
      lb.to_original_xyxy([-10.0, 0.0, 70.0, 70.0]),
      [0.0, 0.0, 200.0, 100.0]
    );
  }

  #[test]
  fn stretch_fills_whole_input() {
    let image = RgbImage::from_pixel(10, 20, Rgb([0, 255, 0]));
    let (tensor, lb) = stretch(&image, (8, 8));
    assert_eq!(tensor.shape(), &[1, 3, 8, 8]);
    assert_eq!(lb.pad, (0.0, 0.0));
    assert_eq!(tensor[[0, 1, 0, 0]], 1.0);
    assert_eq!(tensor[[0, 1, 7, 7]], 1.0);
  }

  #[test]
  fn zero_input_size_does_not_panic() {
    let image = RgbImage::new(20, 10);
    let (tensor, lb) = letterbox(&image, (0, 0));
    assert_eq!(tensor.shape(), &[1, 3, 1, 1]);
    assert_eq!(lb.input, (1, 1));
  }
}
