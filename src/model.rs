// 该文件是 Kanjian （看见） 项目的一部分。
// src/model.rs - 模型与推理后端
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

use std::task::Poll;

use serde::Serialize;

use crate::geometry::NormRect;

/// 一次推理请求的凭据
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ticket(pub u64);

/// 推理后端。提交后不阻塞，由后端通过 `poll` 显式告知结果是否就绪。
/// 调用方保证同一时刻最多只有一个未完成的请求。
pub trait InferenceBackend {
  type Frame;
  type Error: std::error::Error + Send + Sync + 'static;

  fn is_ready(&self) -> bool;
  fn submit(&mut self, input: &Self::Frame) -> Result<Ticket, Self::Error>;
  /// 输出为通道优先的原始张量 `[4 + num_classes] x num_anchors`
  fn poll(&mut self, ticket: Ticket) -> Poll<Result<Box<[f32]>, Self::Error>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DetectItem {
  pub class_id: u32,
  pub score: f32,
  pub bbox: NormRect,
}

#[derive(Debug, Clone, Default)]
pub struct DetectResult {
  pub items: Box<[DetectItem]>,
}

impl DetectResult {
  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }

  pub fn len(&self) -> usize {
    self.items.len()
  }

  pub fn iter(&self) -> std::slice::Iter<'_, DetectItem> {
    self.items.iter()
  }
}

impl From<Vec<DetectItem>> for DetectResult {
  fn from(items: Vec<DetectItem>) -> Self {
    Self {
      items: items.into_boxed_slice(),
    }
  }
}

pub trait WithLabel: Sized + std::fmt::Debug {
  fn to_label_str(&self) -> String;
  fn to_label_id(&self) -> u32;
  fn from_label_id(id: u32) -> Self;
}

mod focus;
mod label;
mod replay;
mod yolo;

pub use self::focus::FocusSelector;
pub use self::label::{CocoLabel, label_text};
pub use self::replay::{ReplayBackend, ReplayError, ReplayFixture, ReplayObject};
pub use self::yolo::{DecodeError, YoloDecoder, non_max_suppression};
