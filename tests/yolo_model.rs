// 该文件是 Kanjian （看见） 项目的一部分。
// tests/yolo_model.rs - ONNX Runtime 模型集成测试
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

use image::{Rgb, RgbImage};

use kanjian::{
  frame::Frame,
  input::ImageFileInput,
  model::{Model, TaskKind, YoloBuilder},
  output::SaveImageFileOutput,
  task::{PredictTask, Task},
};

/// 固定输出两个候选框的检测模型，由 tests/fixtures/make_tiny_detect.py 生成
fn tiny_detect() -> PathBuf {
  Path::new(env!("CARGO_MANIFEST_DIR"))
    .join("tests")
    .join("fixtures")
    .join("tiny_detect.onnx")
}

fn assert_bbox(actual: [f32; 4], expected: [f32; 4]) {
  for (a, e) in actual.iter().zip(expected) {
    assert!((a - e).abs() < 1e-3, "{actual:?} != {expected:?}");
  }
}

#[test]
fn session_metadata_is_read() {
  let model = YoloBuilder::new(tiny_detect()).threads(1).build().unwrap();
  let meta = model.metadata();

  assert_eq!(meta.task, Some(TaskKind::Detect));
  assert_eq!(meta.imgsz, (32, 32));
  assert_eq!(meta.stride, 32);
  assert_eq!(meta.names.len(), 2);
  assert_eq!(meta.names.name(0), "person");
  assert_eq!(meta.names.name(1), "bus");
}

#[test]
fn two_frames_give_two_predictions_in_order() {
  let mut model = YoloBuilder::new(tiny_detect()).threads(1).build().unwrap();
  let frames = [
    Frame::new("square.png", RgbImage::from_pixel(32, 32, Rgb([255, 255, 255]))),
    Frame::new("wide.png", RgbImage::from_pixel(64, 32, Rgb([255, 255, 255]))),
  ];

  let predictions = model.infer(&frames).unwrap();
  assert_eq!(predictions.len(), 2);
  assert_eq!(predictions[0].path(), Path::new("square.png"));
  assert_eq!(predictions[1].path(), Path::new("wide.png"));
  assert_eq!(predictions[1].orig_shape(), (64, 32));

  // 输入与模型尺寸一致，坐标不变
  let boxes = predictions[0].boxes().unwrap();
  assert_eq!(boxes.len(), 2);
  assert_eq!(boxes.items[0].class_id, 0);
  assert!((boxes.items[0].score - 0.9).abs() < 1e-4);
  assert_bbox(boxes.items[0].bbox, [4.0, 4.0, 12.0, 12.0]);
  assert_eq!(boxes.items[1].class_id, 1);
  assert_bbox(boxes.items[1].bbox, [20.0, 16.0, 28.0, 24.0]);

  // 64x32 缩放一半，上方填充 8 行，超出原图的部分被裁剪
  let boxes = predictions[1].boxes().unwrap();
  assert_eq!(boxes.len(), 2);
  assert_bbox(boxes.items[0].bbox, [8.0, 0.0, 24.0, 8.0]);
  assert_bbox(boxes.items[1].bbox, [40.0, 16.0, 56.0, 32.0]);

  assert!(predictions[0].masks().is_none());
  assert!(predictions[0].probs().is_none());
}

#[test]
fn confidence_threshold_applies_to_session_output() {
  let mut model = YoloBuilder::new(tiny_detect())
    .threads(1)
    .confidence(0.85)
    .build()
    .unwrap();
  let frame = Frame::new("square.png", RgbImage::new(32, 32));

  let predictions = model.infer(std::slice::from_ref(&frame)).unwrap();
  let boxes = predictions[0].boxes().unwrap();
  assert_eq!(boxes.len(), 1);
  assert_eq!(predictions[0].names().name(boxes.items[0].class_id), "person");
}

#[test]
fn predict_task_runs_the_session_end_to_end() {
  let dir = tempfile::tempdir().unwrap();
  let image = dir.path().join("bus.png");
  RgbImage::from_pixel(48, 40, Rgb([200, 200, 200]))
    .save(&image)
    .unwrap();
  let result = dir.path().join("result.jpg");

  let model = YoloBuilder::new(tiny_detect()).threads(1).build().unwrap();
  let input = ImageFileInput::open(&[&image]).unwrap();
  let predictions = PredictTask::default()
    .run_task(input, model, SaveImageFileOutput::new(&result))
    .unwrap();

  assert_eq!(predictions.len(), 1);
  assert_eq!(predictions[0].verbose(), "1 person, 1 bus");
  assert_eq!(image::image_dimensions(&result).unwrap(), (48, 40));
}
