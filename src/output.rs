// 该文件是 Kanjian （看见） 项目的一部分。
// src/output.rs - 输出定义
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

use thiserror::Error;
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, prediction::Prediction};

pub trait Render<Output>: Sized {
  type Error;
  fn render_result(&self, result: &Output) -> Result<(), Self::Error>;
}

pub mod draw;

mod directory_record;
mod save_image_file;
mod viewer;

pub use self::directory_record::{DirectoryRecordOutput, DirectoryRecordOutputError};
pub use self::save_image_file::{SaveImageFileError, SaveImageFileOutput};
pub use self::viewer::{Viewer, ViewerError};

/// 默认输出：工作目录下固定的 result.jpg
pub const DEFAULT_OUTPUT: &str = "image:result.jpg";

#[derive(Error, Debug)]
pub enum OutputError {
  #[error("保存图像文件错误: {0}")]
  SaveImageFileError(#[from] SaveImageFileError),
  #[error("目录记录输出错误: {0}")]
  DirectoryRecordOutputError(#[from] DirectoryRecordOutputError),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

pub enum OutputWrapper {
  SaveImageFileOutput(SaveImageFileOutput),
  DirectoryRecordOutput(DirectoryRecordOutput),
}

impl FromUrl for OutputWrapper {
  type Error = OutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      SaveImageFileOutput::SCHEME => {
        let output = SaveImageFileOutput::from_url(url)?;
        Ok(OutputWrapper::SaveImageFileOutput(output))
      }
      DirectoryRecordOutput::SCHEME => {
        let output = DirectoryRecordOutput::from_url(url)?;
        Ok(OutputWrapper::DirectoryRecordOutput(output))
      }
      other => Err(OutputError::SchemeMismatch(other.to_string())),
    }
  }
}

impl Render<Prediction> for OutputWrapper {
  type Error = OutputError;

  fn render_result(&self, result: &Prediction) -> Result<(), Self::Error> {
    match self {
      OutputWrapper::SaveImageFileOutput(output) => output
        .render_result(result)
        .map_err(OutputError::from),
      OutputWrapper::DirectoryRecordOutput(output) => output
        .render_result(result)
        .map_err(OutputError::from),
    }
  }
}

/// 解析输出参数，裸路径视为 `image:` 输出
///
/// 裸路径整体转义后再拼接，`#`、`?` 与非 ASCII 字符都保留在路径中。
pub fn parse_output_url(value: &str) -> Result<Url, url::ParseError> {
  match Url::parse(value) {
    Ok(url) if url.scheme().len() > 1 => Ok(url),
    Ok(_) | Err(url::ParseError::RelativeUrlWithoutBase) => Url::parse(&format!(
      "{}:{}",
      SaveImageFileOutput::SCHEME,
      urlencoding::encode(value)
    )),
    Err(e) => Err(e),
  }
}

/// URL 路径解码为文件系统路径
pub(crate) fn url_to_path(uri: &Url) -> Option<PathBuf> {
  let path = urlencoding::decode(uri.path()).ok()?;
  if path.is_empty() {
    return None;
  }
  Some(PathBuf::from(path.into_owned()))
}
