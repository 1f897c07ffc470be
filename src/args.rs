// 该文件是 Kanjian （看见） 项目的一部分。
// src/args.rs - 项目参数配置
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

use std::path::PathBuf;

use clap::Parser;
use url::Url;

use kanjian::output::{DEFAULT_OUTPUT, parse_output_url};

/// Kanjian 项目参数配置
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 输入图像文件，按顺序推理
  #[arg(value_name = "IMAGES", required = true)]
  pub images: Vec<PathBuf>,

  /// ONNX 模型文件路径
  #[arg(long, default_value = "final_last.onnx", value_name = "FILE")]
  pub model: PathBuf,

  /// 输出路径
  /// 支持格式:
  /// - 图片: image:result.jpg 或直接给出文件路径
  /// - 目录: folder:runs?record=name
  #[arg(long, default_value = DEFAULT_OUTPUT, value_name = "OUTPUT", value_parser = parse_output_url)]
  pub output: Url,

  /// 置信度阈值 (0.0 - 1.0)
  #[arg(long, default_value = "0.25", value_name = "THRESHOLD")]
  pub conf: f32,

  /// NMS IOU 阈值 (0.0 - 1.0)
  #[arg(long, default_value = "0.7", value_name = "THRESHOLD")]
  pub iou: f32,

  /// 每张图像最多保留的目标数
  #[arg(long, default_value = "300", value_name = "COUNT")]
  pub max_det: usize,

  /// 推理线程数
  #[arg(long, default_value = "4", value_name = "COUNT")]
  pub threads: usize,

  /// 显示每个推理结果
  #[arg(long)]
  pub show: bool,

  /// 图像查看程序（默认使用系统查看器）
  #[arg(long, value_name = "PROGRAM", requires = "show")]
  pub viewer: Option<String>,

  /// 以 JSON 格式在标准输出打印结果
  #[arg(long)]
  pub json: bool,
}
