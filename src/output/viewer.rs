// 该文件是 Kanjian （看见） 项目的一部分。
// src/output/viewer.rs - 结果预览
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
use std::process::Command;

use thiserror::Error;
use tracing::{debug, info};

use crate::{
  output::{Render, draw::Draw},
  prediction::Prediction,
};

#[cfg(target_os = "macos")]
const DEFAULT_VIEWER: &str = "open";
#[cfg(target_os = "windows")]
const DEFAULT_VIEWER: &str = "explorer";
#[cfg(not(any(target_os = "macos", target_os = "windows")))]
const DEFAULT_VIEWER: &str = "xdg-open";

const PREVIEW_FILE: &str = "kanjian-preview.jpg";

#[derive(Error, Debug)]
pub enum ViewerError {
  #[error("无法启动图像查看器 {program}: {source}")]
  Spawn {
    program: String,
    #[source]
    source: std::io::Error,
  },
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("图像查看器 {program} 退出异常: {status}")]
  Exit {
    program: String,
    status: std::process::ExitStatus,
  },
}

/// 把标注后的图像交给系统图像查看器
pub struct Viewer {
  program: String,
  preview: PathBuf,
  draw: Draw,
}

impl Viewer {
  pub fn new(program: Option<String>) -> Self {
    Self {
      program: program.unwrap_or_else(|| DEFAULT_VIEWER.to_string()),
      preview: std::env::temp_dir().join(PREVIEW_FILE),
      draw: Draw::default(),
    }
  }

  pub fn program(&self) -> &str {
    &self.program
  }
}

impl Default for Viewer {
  fn default() -> Self {
    Self::new(None)
  }
}

impl Render<Prediction> for Viewer {
  type Error = ViewerError;

  fn render_result(&self, result: &Prediction) -> Result<(), Self::Error> {
    self.draw.annotate(result).save(&self.preview)?;
    debug!("预览文件: {}", self.preview.display());

    info!("显示结果: {}", result.path().display());
    let status = Command::new(&self.program)
      .arg(&self.preview)
      .status()
      .map_err(|source| ViewerError::Spawn {
        program: self.program.clone(),
        source,
      })?;

    if !status.success() {
      return Err(ViewerError::Exit {
        program: self.program.clone(),
        status,
      });
    }
    Ok(())
  }
}
