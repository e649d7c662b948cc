// 该文件是 Kanjian （看见） 项目的一部分。
// src/output/directory_record.rs - 锚定记录目录输出
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
use std::sync::atomic::{AtomicU16, Ordering};

use chrono::{DateTime, Datelike, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::{
  FromUrl, FromUrlWithScheme,
  anchor::AnchoredEntity,
  output::Render,
  tracking::AnchorHandle,
};

#[derive(Error, Debug)]
pub enum DirectoryRecordOutputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("JSON 错误: {0}")]
  JsonError(#[from] serde_json::Error),
}

/// 每个锚定物体的 JSON 记录
#[derive(Debug, Serialize)]
struct CommitRecord<'a> {
  label: &'a str,
  confidence: f32,
  position: [f32; 3],
  size: [f32; 3],
  label_position: [f32; 3],
  anchor: AnchorHandle,
  label_anchor: Option<AnchorHandle>,
  image: Option<String>,
  recorded_at: String,
}

/// 按 `年/月/日` 分目录写入参考图像与 JSON 记录
///
/// `folder:///path/to/dir` 写入图像与记录，`?meta` 只写记录。
pub struct DirectoryRecordOutput {
  directory: PathBuf,
  with_image: bool,
  counter: AtomicU16,
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

    let meta_only = uri.query_pairs().any(|(k, _)| k == "meta");
    Ok(Self::new(uri.path()).with_image(!meta_only))
  }
}

impl DirectoryRecordOutput {
  pub fn new(directory: impl AsRef<Path>) -> Self {
    Self {
      directory: directory.as_ref().to_path_buf(),
      with_image: true,
      counter: AtomicU16::new(0),
    }
  }

  pub fn with_image(mut self, with_image: bool) -> Self {
    self.with_image = with_image;
    self
  }

  fn record_id(&self) -> u16 {
    self.counter.fetch_add(1, Ordering::Relaxed).wrapping_add(1)
  }

  fn record_path(&self, now: &DateTime<Utc>) -> Result<PathBuf, DirectoryRecordOutputError> {
    let directory = self
      .directory
      .join(now.year().to_string())
      .join(format!("{:02}", now.month()))
      .join(format!("{:02}", now.day()));
    std::fs::create_dir_all(&directory)?;

    Ok(directory.join(format!(
      "{}-{:04X}.png",
      now.format("%H-%M-%S"),
      self.record_id()
    )))
  }
}

impl Render<AnchoredEntity> for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn render_result(&self, entity: &AnchoredEntity) -> Result<(), Self::Error> {
    let now = Utc::now();
    let path = self.record_path(&now)?;

    let mut image = None;
    if self.with_image {
      match entity.reference_image.to_rgb_image() {
        Some(rgb) if !entity.reference_image.is_empty() => {
          rgb.save(&path)?;
          image = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned());
        }
        _ => warn!("锚点 {:?} 没有可保存的参考图像", entity.anchor),
      }
    }

    let record = CommitRecord {
      label: &entity.label,
      confidence: entity.confidence,
      position: entity.position.into(),
      size: entity.size.into(),
      label_position: entity.label_position.into(),
      anchor: entity.anchor,
      label_anchor: entity.label_anchor,
      image,
      recorded_at: now.to_rfc3339(),
    };
    let json_path = path.with_extension("json");
    std::fs::write(&json_path, serde_json::to_string_pretty(&record)?)?;
    debug!("记录已写入 {}", json_path.display());
    Ok(())
  }
}
