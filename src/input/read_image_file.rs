// 该文件是 Kanjian （看见） 项目的一部分。
// src/input/read_image_file.rs - 图像文件输入
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

use image::ImageReader;
use thiserror::Error;
use tracing::{debug, error, info};

use crate::{frame::Frame, input::InputError};

#[derive(Error, Debug)]
pub enum ImageFileInputError {
  #[error("图像文件不存在: {0}")]
  NotFound(PathBuf),
  #[error("I/O 错误 ({path}): {source}")]
  IoError {
    path: PathBuf,
    source: std::io::Error,
  },
  #[error("图像解码错误 ({path}): {source}")]
  ImageLoadError {
    path: PathBuf,
    source: image::ImageError,
  },
}

/// 一批图像文件
///
/// 打开时即解码全部图像，任何一个路径无效都会在推理开始前失败，
/// 因此不会留下部分输出。
#[derive(Debug)]
pub struct ImageFileInput {
  frames: Vec<Frame>,
}

impl ImageFileInput {
  pub fn open<P: AsRef<Path>>(paths: &[P]) -> Result<Self, InputError> {
    if paths.is_empty() {
      error!("输入图像列表为空");
      return Err(InputError::Empty);
    }

    let frames = paths
      .iter()
      .map(|path| read_frame(path.as_ref()))
      .collect::<Result<Vec<_>, _>>()?;

    info!("已读取 {} 张图像", frames.len());
    Ok(Self { frames })
  }

  pub fn len(&self) -> usize {
    self.frames.len()
  }

  pub fn is_empty(&self) -> bool {
    self.frames.is_empty()
  }

  pub fn frames(&self) -> &[Frame] {
    &self.frames
  }

  pub fn into_frames(self) -> Vec<Frame> {
    self.frames
  }
}

impl IntoIterator for ImageFileInput {
  type Item = Frame;
  type IntoIter = std::vec::IntoIter<Frame>;

  fn into_iter(self) -> Self::IntoIter {
    self.frames.into_iter()
  }
}

fn read_frame(path: &Path) -> Result<Frame, ImageFileInputError> {
  if !path.exists() {
    error!("图像文件不存在: {}", path.display());
    return Err(ImageFileInputError::NotFound(path.to_path_buf()));
  }

  let reader = ImageReader::open(path)
    .and_then(|reader| reader.with_guessed_format())
    .map_err(|source| ImageFileInputError::IoError {
      path: path.to_path_buf(),
      source,
    })?;
  let image = reader
    .decode()
    .map_err(|source| ImageFileInputError::ImageLoadError {
      path: path.to_path_buf(),
      source,
    })?;

  debug!(
    "读取图像 {}: {}x{}",
    path.display(),
    image.width(),
    image.height()
  );

  Ok(Frame::new(path, image.to_rgb8()))
}
