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

use thiserror::Error;
use tracing::info;
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, anchor::AnchoredEntity, model::label_text};

/// 将结果交给外部呈现
pub trait Render<Item>: Sized {
  type Error;
  fn render_result(&self, item: &Item) -> Result<(), Self::Error>;
}

mod overlay;
pub use self::overlay::{OverlayBox, OverlayBoxes};

#[cfg(feature = "directory_record")]
mod directory_record;
#[cfg(feature = "directory_record")]
pub use self::directory_record::{DirectoryRecordOutput, DirectoryRecordOutputError};

#[derive(Error, Debug)]
pub enum OutputError {
  #[cfg(feature = "directory_record")]
  #[error("目录记录输出错误: {0}")]
  DirectoryRecordOutputError(#[from] DirectoryRecordOutputError),
  #[error("URI 方案不匹配")]
  SchemeMismatch,
}

/// 只写日志的输出，`log://`
#[derive(Debug, Default)]
pub struct LogOutput;

impl FromUrlWithScheme for LogOutput {
  const SCHEME: &'static str = "log";
}

impl FromUrl for LogOutput {
  type Error = OutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(OutputError::SchemeMismatch);
    }
    Ok(LogOutput)
  }
}

impl Render<AnchoredEntity> for LogOutput {
  type Error = OutputError;

  fn render_result(&self, entity: &AnchoredEntity) -> Result<(), Self::Error> {
    let p = entity.position;
    info!(
      "锚点 {:?}: {} 位于 ({:.3}, {:.3}, {:.3})",
      entity.anchor,
      label_text(&entity.label, entity.confidence).replace('\n', " "),
      p.x,
      p.y,
      p.z
    );
    Ok(())
  }
}

pub enum OutputWrapper {
  Log(LogOutput),
  #[cfg(feature = "directory_record")]
  DirectoryRecordOutput(DirectoryRecordOutput),
}

impl FromUrl for OutputWrapper {
  type Error = OutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      LogOutput::SCHEME => Ok(OutputWrapper::Log(LogOutput::from_url(url)?)),
      #[cfg(feature = "directory_record")]
      DirectoryRecordOutput::SCHEME => {
        let output = DirectoryRecordOutput::from_url(url)?;
        Ok(OutputWrapper::DirectoryRecordOutput(output))
      }
      _ => Err(OutputError::SchemeMismatch),
    }
  }
}

impl Render<AnchoredEntity> for OutputWrapper {
  type Error = OutputError;

  fn render_result(&self, entity: &AnchoredEntity) -> Result<(), Self::Error> {
    match self {
      OutputWrapper::Log(output) => output.render_result(entity),
      #[cfg(feature = "directory_record")]
      OutputWrapper::DirectoryRecordOutput(output) => output
        .render_result(entity)
        .map_err(OutputError::from),
    }
  }
}
