// 该文件是 Kanjian （看见） 项目的一部分。
// src/model/focus.rs - 画面中心对焦选择
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

use crate::model::DetectItem;

const FOCUS_CENTER: (f32, f32) = (0.5, 0.5);

/// 从检测结果中挑选离画面中心最近、且在对焦半径内的唯一目标
#[derive(Debug, Clone, Copy)]
pub struct FocusSelector {
  radius: f32,
}

impl FocusSelector {
  pub fn new(radius: f32) -> Self {
    Self { radius }
  }

  pub fn radius(&self) -> f32 {
    self.radius
  }

  /// 距离相同时保留先出现的目标，退化框不参与挑选
  pub fn select<'a>(&self, items: &'a [DetectItem]) -> Option<&'a DetectItem> {
    let mut best = None;
    let mut closest = f32::MAX;
    for item in items.iter().filter(|item| !item.bbox.is_degenerate()) {
      let dist = center_distance(item);
      if dist < self.radius && dist < closest {
        closest = dist;
        best = Some(item);
      }
    }
    best
  }
}

pub(crate) fn center_distance(item: &DetectItem) -> f32 {
  let (cx, cy) = item.bbox.center();
  (cx - FOCUS_CENTER.0).hypot(cy - FOCUS_CENTER.1)
}
