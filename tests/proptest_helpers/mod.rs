// 该文件是 Kanjian （看见） 项目的一部分。
// tests/proptest_helpers/mod.rs - 属性测试生成器
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

#![allow(dead_code)]

use kanjian::{geometry::NormRect, model::DetectItem};
use proptest::prelude::*;
use proptest::test_runner::{Config as ProptestConfig, FileFailurePersistence};

pub const NUM_CLASSES: usize = 3;
pub const NUM_ANCHORS: usize = 24;
pub const INPUT_SIZE: f32 = 640.0;

pub fn proptest_config() -> ProptestConfig {
  let cases = std::env::var("PROPTEST_CASES")
    .ok()
    .and_then(|v| v.parse::<u32>().ok())
    .unwrap_or(128);

  let mut config = ProptestConfig::with_failure_persistence(FileFailurePersistence::WithSource(
    "proptest-regressions",
  ));
  config.cases = cases;
  config.max_shrink_iters = 1024;
  config
}

pub fn arb_rect() -> impl Strategy<Value = NormRect> {
  (0.0f32..0.9, 0.0f32..0.9, 0.01f32..0.5, 0.01f32..0.5)
    .prop_map(|(x, y, w, h)| NormRect::new(x, y, w, h))
}

pub fn arb_item() -> impl Strategy<Value = DetectItem> {
  (0u32..80, 0.0f32..=1.0, arb_rect()).prop_map(|(class_id, score, bbox)| DetectItem {
    class_id,
    score,
    bbox,
  })
}

pub fn arb_items(max: usize) -> impl Strategy<Value = Vec<DetectItem>> {
  prop::collection::vec(arb_item(), 0..=max)
}

/// 通道优先的原始输出张量，框为像素坐标
pub fn arb_raw_output() -> impl Strategy<Value = Vec<f32>> {
  let anchor = (
    0.0f32..INPUT_SIZE,
    0.0f32..INPUT_SIZE,
    1.0f32..320.0,
    1.0f32..320.0,
    prop::collection::vec(0.0f32..=1.0, NUM_CLASSES),
  );
  prop::collection::vec(anchor, NUM_ANCHORS).prop_map(|anchors| {
    let mut out = vec![0.0; (4 + NUM_CLASSES) * NUM_ANCHORS];
    for (i, (cx, cy, w, h, scores)) in anchors.into_iter().enumerate() {
      out[i] = cx;
      out[NUM_ANCHORS + i] = cy;
      out[2 * NUM_ANCHORS + i] = w;
      out[3 * NUM_ANCHORS + i] = h;
      for (c, score) in scores.into_iter().enumerate() {
        out[(4 + c) * NUM_ANCHORS + i] = score;
      }
    }
    out
  })
}

pub fn focus_distance(item: &DetectItem) -> f32 {
  let (cx, cy) = item.bbox.center();
  (cx - 0.5).hypot(cy - 0.5)
}
