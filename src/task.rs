// 该文件是 Kanjian （看见） 项目的一部分。
// src/task.rs - 推理任务
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

use tracing::{debug, info};

use crate::{
  frame::Frame,
  model::Model,
  output::{Render, Viewer},
  prediction::Prediction,
};

pub trait Task<I, M, O>: Sized {
  type Output;
  type Error;
  fn run_task(self, input: I, model: M, output: O) -> Result<Self::Output, Self::Error>;
}

/// 整批推理，然后逐个结果显示并保存
#[derive(Default)]
pub struct PredictTask {
  viewer: Option<Viewer>,
  json: bool,
}

impl PredictTask {
  pub fn with_viewer(mut self, viewer: Option<Viewer>) -> Self {
    self.viewer = viewer;
    self
  }

  pub fn with_json(mut self, json: bool) -> Self {
    self.json = json;
    self
  }
}

/// 读取全部五类结果，缺失的类别为 None
fn inspect(prediction: &Prediction) {
  let boxes = prediction.boxes();
  let masks = prediction.masks();
  let keypoints = prediction.keypoints();
  let probs = prediction.probs();
  let obb = prediction.obb();

  debug!(
    "boxes: {:?}, masks: {:?}, keypoints: {:?}, probs: {:?}, obb: {:?}",
    boxes.map(|b| b.len()),
    masks.map(|m| m.len()),
    keypoints.map(|k| k.len()),
    probs.and_then(|p| p.top1()),
    obb.map(|o| o.len()),
  );
}

impl<I, M, O, ME, RE> Task<I, M, O> for PredictTask
where
  I: IntoIterator<Item = Frame>,
  M: Model<Input = Frame, Output = Prediction, Error = ME>,
  O: Render<Prediction, Error = RE>,
  ME: std::error::Error + Sync + Send + 'static,
  RE: std::error::Error + Sync + Send + 'static,
{
  type Output = Vec<Prediction>;
  type Error = anyhow::Error;

  fn run_task(self, input: I, mut model: M, output: O) -> Result<Self::Output, Self::Error> {
    info!("开始任务...");
    let frames: Vec<Frame> = input.into_iter().collect();
    if frames.is_empty() {
      anyhow::bail!("没有输入图像");
    }

    let predictions = model.infer(&frames)?;
    if predictions.len() != frames.len() {
      anyhow::bail!(
        "推理结果数量 {} 与输入数量 {} 不一致",
        predictions.len(),
        frames.len()
      );
    }

    let total = predictions.len();
    for (i, prediction) in predictions.iter().enumerate() {
      inspect(prediction);
      let (height, width) = prediction.orig_shape();
      info!(
        "图像 {}/{} {}: {}x{} {}, {:.1}ms",
        i + 1,
        total,
        prediction.path().display(),
        width,
        height,
        prediction.verbose(),
        prediction.speed.inference
      );

      if self.json {
        println!("{}", prediction.to_json());
      }
      if let Some(viewer) = &self.viewer {
        viewer.render_result(prediction)?;
      }
      output.render_result(prediction)?;
    }

    info!("任务完成，共 {} 张图像", total);
    Ok(predictions)
  }
}
