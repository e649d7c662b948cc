// 该文件是 Kanjian （看见） 项目的一部分。
// src/model/replay.rs - 回放推理后端
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

//! 从 JSON 描述中按帧回放稀疏检测结果，生成与真实模型相同布局的原始张量。
//! 每个请求在被轮询 `latency` 次之后才就绪，用于模拟 GPU 延迟。

use std::task::Poll;

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::RgbNhwcFrame,
  model::{InferenceBackend, Ticket},
};

#[derive(Error, Debug)]
pub enum ReplayError {
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("回放文件解析错误: {0}")]
  ParseError(#[from] serde_json::Error),
  #[error("回放文件没有任何帧")]
  NoFrames,
  #[error("锚点 {anchor} 或类别 {class_id} 越界")]
  OutOfRange { anchor: usize, class_id: usize },
  #[error("已有未完成的推理请求")]
  Busy,
  #[error("输入帧为空")]
  EmptyFrame,
  #[error("未知的推理凭据: {0:?}")]
  UnknownTicket(Ticket),
}

/// 单个目标在某一锚点上的原始输出（像素坐标）
#[derive(Debug, Clone, Deserialize)]
pub struct ReplayObject {
  pub anchor: usize,
  pub class_id: usize,
  pub score: f32,
  pub cx: f32,
  pub cy: f32,
  pub w: f32,
  pub h: f32,
}

fn default_num_classes() -> usize {
  80
}

fn default_num_anchors() -> usize {
  8400
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReplayFixture {
  #[serde(default = "default_num_classes")]
  pub num_classes: usize,
  #[serde(default = "default_num_anchors")]
  pub num_anchors: usize,
  #[serde(default)]
  pub latency: u32,
  pub frames: Vec<Vec<ReplayObject>>,
}

impl ReplayFixture {
  fn validate(&self) -> Result<(), ReplayError> {
    if self.frames.is_empty() {
      return Err(ReplayError::NoFrames);
    }
    for obj in self.frames.iter().flatten() {
      if obj.anchor >= self.num_anchors || obj.class_id >= self.num_classes {
        return Err(ReplayError::OutOfRange {
          anchor: obj.anchor,
          class_id: obj.class_id,
        });
      }
    }
    Ok(())
  }

  /// 生成第 `index` 帧的通道优先张量
  pub fn render(&self, index: usize) -> Box<[f32]> {
    let anchors = self.num_anchors;
    let mut data = vec![0.0f32; (4 + self.num_classes) * anchors];
    if let Some(objects) = self.frames.get(index % self.frames.len().max(1)) {
      for obj in objects {
        let i = obj.anchor;
        data[i] = obj.cx;
        data[anchors + i] = obj.cy;
        data[2 * anchors + i] = obj.w;
        data[3 * anchors + i] = obj.h;
        data[(4 + obj.class_id) * anchors + i] = obj.score;
      }
    }
    data.into_boxed_slice()
  }
}

struct PendingRequest {
  ticket: Ticket,
  remaining: u32,
  frame: usize,
}

pub struct ReplayBackend {
  fixture: ReplayFixture,
  latency: u32,
  cursor: usize,
  next_ticket: u64,
  pending: Option<PendingRequest>,
}

impl FromUrlWithScheme for ReplayBackend {
  const SCHEME: &'static str = "replay";
}

impl FromUrl for ReplayBackend {
  type Error = ReplayError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(ReplayError::SchemeMismatch(format!(
        "期望 '{}', 实际 '{}'",
        Self::SCHEME,
        url.scheme()
      )));
    }

    info!("加载回放文件: {}", url.path());
    let text = std::fs::read_to_string(url.path())?;
    let fixture: ReplayFixture = serde_json::from_str(&text)?;
    let latency = url
      .query_pairs()
      .find(|(k, _)| k == "latency")
      .and_then(|(_, v)| v.parse().ok());

    let mut backend = Self::from_fixture(fixture)?;
    if let Some(latency) = latency {
      backend.latency = latency;
    }
    Ok(backend)
  }
}

impl ReplayBackend {
  pub fn from_fixture(fixture: ReplayFixture) -> Result<Self, ReplayError> {
    fixture.validate()?;
    debug!(
      "回放帧数: {}, 延迟: {} 次轮询",
      fixture.frames.len(),
      fixture.latency
    );
    Ok(Self {
      latency: fixture.latency,
      fixture,
      cursor: 0,
      next_ticket: 0,
      pending: None,
    })
  }

  pub fn latency(mut self, latency: u32) -> Self {
    self.latency = latency;
    self
  }
}

impl InferenceBackend for ReplayBackend {
  type Frame = RgbNhwcFrame;
  type Error = ReplayError;

  fn is_ready(&self) -> bool {
    !self.fixture.frames.is_empty()
  }

  fn submit(&mut self, input: &Self::Frame) -> Result<Ticket, Self::Error> {
    if self.pending.is_some() {
      return Err(ReplayError::Busy);
    }
    if input.is_empty() {
      return Err(ReplayError::EmptyFrame);
    }

    let ticket = Ticket(self.next_ticket);
    self.next_ticket += 1;
    self.pending = Some(PendingRequest {
      ticket,
      remaining: self.latency,
      frame: self.cursor,
    });
    self.cursor = (self.cursor + 1) % self.fixture.frames.len();
    Ok(ticket)
  }

  fn poll(&mut self, ticket: Ticket) -> Poll<Result<Box<[f32]>, Self::Error>> {
    let Some(pending) = self.pending.as_mut() else {
      return Poll::Ready(Err(ReplayError::UnknownTicket(ticket)));
    };
    if pending.ticket != ticket {
      return Poll::Ready(Err(ReplayError::UnknownTicket(ticket)));
    }
    if pending.remaining > 0 {
      pending.remaining -= 1;
      return Poll::Pending;
    }

    let frame = pending.frame;
    self.pending = None;
    Poll::Ready(Ok(self.fixture.render(frame)))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn fixture(latency: u32) -> ReplayFixture {
    serde_json::from_str(&format!(
      r#"{{
        "num_classes": 3,
        "num_anchors": 4,
        "latency": {latency},
        "frames": [[{{ "anchor": 1, "class_id": 2, "score": 0.9, "cx": 1, "cy": 2, "w": 3, "h": 4 }}], []]
      }}"#
    ))
    .unwrap()
  }

  #[test]
  fn becomes_ready_after_latency_polls() {
    let mut backend = ReplayBackend::from_fixture(fixture(2)).unwrap();
    let frame = RgbNhwcFrame::with_shape(2, 2);
    let ticket = backend.submit(&frame).unwrap();
    assert!(matches!(backend.submit(&frame), Err(ReplayError::Busy)));

    assert!(backend.poll(ticket).is_pending());
    assert!(backend.poll(ticket).is_pending());
    let Poll::Ready(Ok(data)) = backend.poll(ticket) else {
      panic!("expected output");
    };
    assert_eq!(data.len(), 7 * 4);
    assert_eq!(data[1], 1.0);
    assert_eq!(data[3 * 4 + 1], 4.0);
    assert_eq!(data[(4 + 2) * 4 + 1], 0.9);

    // 第二帧为空
    let ticket = backend.submit(&frame).unwrap();
    assert!(backend.poll(ticket).is_pending());
    assert!(backend.poll(ticket).is_pending());
    let Poll::Ready(Ok(data)) = backend.poll(ticket) else {
      panic!("expected output");
    };
    assert!(data.iter().all(|v| *v == 0.0));
  }

  #[test]
  fn rejects_out_of_range_objects() {
    let mut f = fixture(0);
    f.frames[0][0].class_id = 3;
    assert!(matches!(
      ReplayBackend::from_fixture(f),
      Err(ReplayError::OutOfRange { .. })
    ));
  }

  #[test]
  fn rejects_empty_frame() {
    let mut backend = ReplayBackend::from_fixture(fixture(0)).unwrap();
    assert!(matches!(
      backend.submit(&RgbNhwcFrame::default()),
      Err(ReplayError::EmptyFrame)
    ));
  }
}
