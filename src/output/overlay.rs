// 该文件是 Kanjian （看见） 项目的一部分。
// src/output/overlay.rs - 二维叠加框槽位
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

use tracing::debug;

use crate::{
  geometry::{NormRect, ScreenSize},
  model::{CocoLabel, DetectItem, WithLabel},
};

/// 单个叠加框，按检测排名复用
#[derive(Debug, Clone, PartialEq, Default)]
pub struct OverlayBox {
  pub rect: NormRect,
  /// 屏幕像素坐标 [x, y, 宽, 高]，原点左下
  pub pixels: [f32; 4],
  pub label: String,
  pub active: bool,
}

/// 定长槽位池，槽位第一次使用时创建，之后只切换激活状态
#[derive(Debug, Clone)]
pub struct OverlayBoxes {
  slots: Vec<OverlayBox>,
  capacity: usize,
  screen: ScreenSize,
}

impl OverlayBoxes {
  pub fn new(capacity: usize, screen: ScreenSize) -> Self {
    Self {
      slots: Vec::with_capacity(capacity),
      capacity,
      screen,
    }
  }

  /// 按顺序刷新叠加框，超出容量的检测被忽略，返回绘制数量
  pub fn draw(&mut self, items: &[DetectItem]) -> usize {
    if items.len() > self.capacity {
      debug!("叠加框数量 {} 超出容量 {}", items.len(), self.capacity);
    }
    let shown = items.len().min(self.capacity);
    while self.slots.len() < shown {
      self.slots.push(OverlayBox::default());
    }

    let (sw, sh) = (self.screen.width as f32, self.screen.height as f32);
    for (i, slot) in self.slots.iter_mut().enumerate() {
      let Some(item) = items.get(i).filter(|_| i < shown) else {
        slot.active = false;
        continue;
      };
      let r = item.bbox;
      slot.rect = r;
      slot.pixels = [r.x * sw, r.y * sh, r.width * sw, r.height * sh];
      slot.label.clear();
      slot
        .label
        .push_str(&CocoLabel::from_label_id(item.class_id).to_label_str());
      slot.active = true;
    }
    shown
  }

  pub fn clear(&mut self) {
    for slot in self.slots.iter_mut() {
      slot.active = false;
    }
  }

  pub fn visible(&self) -> impl Iterator<Item = &OverlayBox> {
    self.slots.iter().filter(|s| s.active)
  }

  pub fn active_count(&self) -> usize {
    self.visible().count()
  }

  pub fn allocated(&self) -> usize {
    self.slots.len()
  }
}
