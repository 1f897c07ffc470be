// 该文件是 Kanjian （看见） 项目的一部分。
// src/main.rs - 项目主程序
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

mod args;

use anyhow::Result;
use clap::Parser;
use tracing::info;

use kanjian::{
  FromUrl,
  input::ImageFileInput,
  model::YoloBuilder,
  output::{OutputWrapper, Viewer},
  task::{PredictTask, Task},
};

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = args::Args::parse();

  info!("模型文件路径: {}", args.model.display());
  info!("输入图像: {} 张", args.images.len());
  info!("输出路径: {}", args.output);
  info!(
    "置信度阈值: {}, NMS 阈值: {}, 最大目标数: {}",
    args.conf, args.iou, args.max_det
  );

  // 先加载模型与全部输入，失败时不会产生任何输出文件
  let model = YoloBuilder::new(&args.model)
    .confidence(args.conf)
    .iou(args.iou)
    .max_det(args.max_det)
    .threads(args.threads)
    .build()?;
  let input = ImageFileInput::open(&args.images)?;
  let output = OutputWrapper::from_url(&args.output)?;

  let viewer = args.show.then(|| Viewer::new(args.viewer.clone()));
  let task = PredictTask::default()
    .with_viewer(viewer)
    .with_json(args.json);

  let predictions = task.run_task(input, model, output)?;
  info!("处理完成，共 {} 个结果", predictions.len());

  Ok(())
}
