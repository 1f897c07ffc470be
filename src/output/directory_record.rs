// 该文件是 Kanjian （看见） 项目的一部分。
// src/output/directory_record.rs - 按目录记录推理结果
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

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
  FromUrl, FromUrlWithScheme,
  output::{Render, draw::Draw, url_to_path},
  prediction::{Facets, Prediction},
};

#[derive(Error, Debug)]
pub enum DirectoryRecordOutputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("输出目录无效")]
  InvalidPath,
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
}

/// 文本记录：每个目标一行，坐标按原图尺寸归一化
#[derive(Debug, Clone, Copy)]
pub struct Record {
  pub label_with_name: bool,
}

impl Record {
  fn label(&self, prediction: &Prediction, class_id: usize) -> String {
    if self.label_with_name {
      prediction.names().name(class_id).into_owned()
    } else {
      class_id.to_string()
    }
  }

  pub fn lines(&self, prediction: &Prediction) -> Vec<String> {
    let (width, height) = prediction.image().dimensions();
    let (w, h) = (width as f32, height as f32);

    match prediction.facets() {
      Facets::Detect { boxes } | Facets::Segment { boxes, .. } | Facets::Pose { boxes, .. } => boxes
        .iter()
        .map(|item| {
          let b = item.normalized(width, height);
          format!(
            "{}, {:.4}, {:.4}, {:.4}, {:.4}, {:.4}",
            self.label(prediction, item.class_id),
            item.score,
            b[0],
            b[1],
            b[2],
            b[3]
          )
        })
        .collect(),
      Facets::Obb { obb } => obb
        .items
        .iter()
        .map(|item| {
          let corners = item
            .corners()
            .iter()
            .map(|(x, y)| format!("{:.4}, {:.4}", x / w, y / h))
            .collect::<Vec<_>>()
            .join(", ");
          format!(
            "{}, {:.4}, {}",
            self.label(prediction, item.class_id),
            item.score,
            corners
          )
        })
        .collect(),
      Facets::Classify { probs } => probs
        .top5()
        .into_iter()
        .map(|(id, p)| format!("{}, {:.4}", self.label(prediction, id), p))
        .collect(),
    }
  }

  pub fn record(&self, prediction: &Prediction, path: &Path) -> Result<(), std::io::Error> {
    std::fs::write(path.with_extension("txt"), self.lines(prediction).join("\n"))
  }
}

/// 每张输入图像对应目录中一张同名结果图
pub struct DirectoryRecordOutput {
  directory: PathBuf,
  draw: Draw,
  record: Option<Record>,
  skip_empty: bool,
  /// 已写出的文件名（不含扩展名）及其次数
  stem_counters: Mutex<HashMap<String, usize>>,
}

impl FromUrlWithScheme for DirectoryRecordOutput {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn from_url(uri: &url::Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(DirectoryRecordOutputError::SchemeMismatch);
    }
    let directory = url_to_path(uri).ok_or(DirectoryRecordOutputError::InvalidPath)?;

    let record = uri
      .query_pairs()
      .find(|(k, _)| k == "record")
      .map(|(_, v)| Record {
        label_with_name: v != "id",
      });
    let skip_empty = uri.query_pairs().any(|(k, _)| k == "skip_empty");

    Ok(DirectoryRecordOutput {
      directory,
      draw: Draw::default(),
      record,
      skip_empty,
      stem_counters: Mutex::new(HashMap::new()),
    })
  }
}

impl DirectoryRecordOutput {
  pub fn directory(&self) -> &Path {
    &self.directory
  }

  fn frame_path(&self, prediction: &Prediction) -> Result<PathBuf, DirectoryRecordOutputError> {
    if !self.directory.exists() {
      std::fs::create_dir_all(&self.directory)?;
    }

    let stem = prediction.stem();
    let mut counters = self
      .stem_counters
      .lock()
      .unwrap_or_else(|poisoned| poisoned.into_inner());
    let seen = counters.entry(stem.clone()).or_insert(0);
    let name = if *seen == 0 {
      stem
    } else {
      let name = format!("{stem}-{seen}");
      warn!(
        "{} 与先前的输入同名，改写为 {}.jpg",
        prediction.path().display(),
        name
      );
      name
    };
    *seen += 1;

    Ok(self.directory.join(format!("{name}.jpg")))
  }
}

impl Render<Prediction> for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn render_result(&self, result: &Prediction) -> Result<(), Self::Error> {
    if self.skip_empty && result.is_empty() {
      debug!("跳过空结果: {}", result.path().display());
      return Ok(());
    }

    let path = self.frame_path(result)?;
    self.draw.annotate(result).save(&path)?;
    if let Some(record) = &self.record {
      record.record(result, &path)?;
    }
    info!("记录结果到: {}", path.display());

    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::Labels;
  use crate::prediction::{Boxes, DetectItem, Probs};
  use image::RgbImage;
  use std::sync::Arc;
  use url::Url;

  fn prediction(path: &str, items: Vec<DetectItem>) -> Prediction {
    Prediction::new(
      path,
      RgbImage::new(100, 50),
      Arc::new(Labels::from(vec!["person".to_string(), "bus".to_string()])),
      Facets::Detect {
        boxes: Boxes {
          items: items.into_boxed_slice(),
        },
      },
    )
  }

  fn person() -> DetectItem {
    DetectItem {
      class_id: 0,
      score: 0.5,
      bbox: [10.0, 5.0, 50.0, 25.0],
    }
  }

  #[test]
  fn writes_image_and_record_per_input() {
    let dir = tempfile::tempdir().unwrap();
    let url = Url::parse(&format!("folder:{}?record=name", dir.path().display())).unwrap();
    let output = DirectoryRecordOutput::from_url(&url).unwrap();

    output
      .render_result(&prediction("inputs/bus.jpg", vec![person()]))
      .unwrap();

    assert!(dir.path().join("bus.jpg").exists());
    let text = std::fs::read_to_string(dir.path().join("bus.txt")).unwrap();
    assert_eq!(text, "person, 0.5000, 0.1000, 0.1000, 0.5000, 0.5000");
  }

  #[test]
  fn record_by_id_and_skip_empty() {
    let dir = tempfile::tempdir().unwrap();
    let url = Url::parse(&format!(
      "folder:{}?record=id&skip_empty",
      dir.path().display()
    ))
    .unwrap();
    let output = DirectoryRecordOutput::from_url(&url).unwrap();

    output.render_result(&prediction("empty.png", vec![])).unwrap();
    assert!(!dir.path().join("empty.jpg").exists());

    output
      .render_result(&prediction("one.png", vec![person()]))
      .unwrap();
    let text = std::fs::read_to_string(dir.path().join("one.txt")).unwrap();
    assert!(text.starts_with("0, 0.5000"));
  }

  #[test]
  fn classification_records_top_classes() {
    let p = Prediction::new(
      "c.jpg",
      RgbImage::new(4, 4),
      Arc::new(Labels::from(vec!["person".to_string(), "bus".to_string()])),
      Facets::Classify {
        probs: Probs {
          data: vec![0.25, 0.75].into_boxed_slice(),
        },
      },
    );
    let lines = Record {
      label_with_name: true,
    }
    .lines(&p);
    assert_eq!(lines, vec!["bus, 0.7500", "person, 0.2500"]);
  }

  #[test]
  fn rejects_other_schemes() {
    let url = Url::parse("image:result.jpg").unwrap();
    assert!(matches!(
      DirectoryRecordOutput::from_url(&url),
      Err(DirectoryRecordOutputError::SchemeMismatch)
    ));
  }

  #[test]
  fn same_stem_from_different_directories_is_kept() {
    let dir = tempfile::tempdir().unwrap();
    let url = Url::parse(&format!("folder:{}?record=name", dir.path().display())).unwrap();
    let output = DirectoryRecordOutput::from_url(&url).unwrap();

    output.render_result(&prediction("a/1.jpg", vec![person()])).unwrap();
    output.render_result(&prediction("b/1.jpg", vec![])).unwrap();
    output.render_result(&prediction("c/1.png", vec![])).unwrap();

    assert!(dir.path().join("1.jpg").exists());
    assert!(dir.path().join("1-1.jpg").exists());
    assert!(dir.path().join("1-2.jpg").exists());
    let first = std::fs::read_to_string(dir.path().join("1.txt")).unwrap();
    assert!(first.starts_with("person"));
    assert_eq!(std::fs::read_to_string(dir.path().join("1-1.txt")).unwrap(), "");
  }

  #[test]
  fn directory_path_is_decoded() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("运行 结果");
    let url = crate::output::parse_output_url(&format!("folder:{}", target.display())).unwrap();
    let output = DirectoryRecordOutput::from_url(&url).unwrap();
    assert_eq!(output.directory(), target.as_path());

    output.render_result(&prediction("bus.jpg", vec![])).unwrap();
    assert!(target.join("bus.jpg").exists());
  }
}
