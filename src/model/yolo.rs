// 该文件是 Kanjian （看见） 项目的一部分。
// src/model/yolo.rs - YOLO 输出解码与非极大值抑制
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
use tracing::debug;

use crate::{
  config::ScanConfig,
  geometry::NormRect,
  model::{DetectItem, DetectResult},
};

const YOLO_BOX_CHANNELS: usize = 4;

#[derive(Error, Debug, PartialEq)]
pub enum DecodeError {
  #[error("输出张量大小不匹配: 期望 {expected}, 实际 {actual}")]
  SizeMismatch { expected: usize, actual: usize },
}

/// YOLO 单输出头解码器
///
/// 输出张量为通道优先布局：前 4 个通道依次是中心 x、中心 y、宽、高（像素），
/// 其后是每个类别的得分。每个锚点只保留得分最高的一个类别。
#[derive(Debug, Clone)]
pub struct YoloDecoder {
  num_classes: usize,
  num_anchors: usize,
  input_size: f32,
  confidence_threshold: f32,
  iou_threshold: f32,
  proposals: Vec<DetectItem>,
}

impl YoloDecoder {
  pub fn new(num_classes: usize, num_anchors: usize, input_size: f32) -> Self {
    let defaults = ScanConfig::default();
    Self {
      num_classes,
      num_anchors,
      input_size,
      confidence_threshold: defaults.confidence_threshold,
      iou_threshold: defaults.iou_threshold,
      proposals: Vec::new(),
    }
  }

  pub fn from_config(config: &ScanConfig) -> Self {
    Self::new(config.num_classes, config.num_anchors, config.input_size)
      .confidence_threshold(config.confidence_threshold)
      .iou_threshold(config.iou_threshold)
  }

  pub fn confidence_threshold(mut self, threshold: f32) -> Self {
    self.confidence_threshold = threshold;
    self
  }

  pub fn iou_threshold(mut self, threshold: f32) -> Self {
    self.iou_threshold = threshold;
    self
  }

  pub fn expected_len(&self) -> usize {
    (YOLO_BOX_CHANNELS + self.num_classes) * self.num_anchors
  }

  /// 解码并执行 NMS
  pub fn decode(&mut self, output: &[f32]) -> Result<DetectResult, DecodeError> {
    self.collect_proposals(output)?;
    let kept = non_max_suppression(&mut self.proposals, self.iou_threshold);
    debug!("NMS 后保留 {} 个目标", kept.len());
    Ok(DetectResult::from(kept))
  }

  /// 仅做阈值筛选，不做抑制，结果保存在内部缓冲中
  pub fn proposals(&mut self, output: &[f32]) -> Result<&[DetectItem], DecodeError> {
    self.collect_proposals(output)?;
    Ok(&self.proposals)
  }

  fn collect_proposals(&mut self, output: &[f32]) -> Result<(), DecodeError> {
    let expected = self.expected_len();
    if output.len() != expected {
      return Err(DecodeError::SizeMismatch {
        expected,
        actual: output.len(),
      });
    }

    self.proposals.clear();
    let anchors = self.num_anchors;
    let size = self.input_size;

    for i in 0..anchors {
      let mut max_score = 0.0f32;
      let mut best_class = None;
      for c in 0..self.num_classes {
        let score = output[(YOLO_BOX_CHANNELS + c) * anchors + i];
        if score > max_score {
          max_score = score;
          best_class = Some(c as u32);
        }
      }

      let Some(class_id) = best_class else {
        continue;
      };
      if max_score <= self.confidence_threshold {
        continue;
      }

      let cx = output[i];
      let cy = output[anchors + i];
      let w = output[2 * anchors + i];
      let h = output[3 * anchors + i];

      let x_min = (cx - w / 2.0) / size;
      let y_min = (cy - h / 2.0) / size;
      let width = w / size;
      let height = h / size;

      // 模型图像坐标向下增长，摆放系统使用向上增长的归一化坐标
      let bbox = NormRect::new(x_min, 1.0 - y_min - height, width, height);
      if bbox.is_degenerate() {
        debug!("锚点 {} 的框退化，丢弃: {:?}", i, bbox);
        continue;
      }

      self.proposals.push(DetectItem {
        class_id,
        score: max_score.min(1.0),
        bbox,
      });
    }

    debug!("阈值筛选后候选框 {} 个", self.proposals.len());
    Ok(())
  }
}

/// 贪心 NMS，与类别无关
///
/// 按置信度稳定降序排序后依次保留，与任一已保留框 IoU 超过阈值的候选被丢弃。
/// 输入缓冲会被清空，以便下一帧复用。
pub fn non_max_suppression(proposals: &mut Vec<DetectItem>, iou_threshold: f32) -> Vec<DetectItem> {
  proposals.sort_by(|a, b| b.score.total_cmp(&a.score));

  let mut kept: Vec<DetectItem> = Vec::new();
  for candidate in proposals.drain(..) {
    if kept
      .iter()
      .all(|k| k.bbox.iou(&candidate.bbox) <= iou_threshold)
    {
      kept.push(candidate);
    }
  }
  kept
}

#[cfg(test)]
mod tests {
  use super::*;

  const CLASSES: usize = 80;
  const ANCHORS: usize = 8400;

  fn empty_output() -> Vec<f32> {
    vec![0.0; (4 + CLASSES) * ANCHORS]
  }

  fn put(out: &mut [f32], anchor: usize, class: usize, score: f32, b: [f32; 4]) {
    for (ch, v) in b.iter().enumerate() {
      out[ch * ANCHORS + anchor] = *v;
    }
    out[(4 + class) * ANCHORS + anchor] = score;
  }

  fn item(score: f32, bbox: NormRect) -> DetectItem {
    DetectItem {
      class_id: 0,
      score,
      bbox,
    }
  }

  #[test]
  fn decodes_single_anchor_with_vertical_flip() {
    let mut out = empty_output();
    put(&mut out, 17, 2, 0.9, [320.0, 320.0, 100.0, 100.0]);

    let mut decoder = YoloDecoder::new(CLASSES, ANCHORS, 640.0).confidence_threshold(0.2);
    let result = decoder.decode(&out).unwrap();

    assert_eq!(result.len(), 1);
    let det = result.items[0];
    assert_eq!(det.class_id, 2);
    assert!((det.score - 0.9).abs() < 1e-6);
    assert!((det.bbox.x - 0.421875).abs() < 1e-5);
    assert!((det.bbox.y - 0.421875).abs() < 1e-5);
    assert!((det.bbox.width - 0.15625).abs() < 1e-5);
    assert!((det.bbox.height - 0.15625).abs() < 1e-5);
  }

  #[test]
  fn flip_moves_top_of_image_to_top_of_normalized_space() {
    let mut out = empty_output();
    // 图像上方（像素 y 小）的框
    put(&mut out, 0, 0, 0.8, [320.0, 64.0, 64.0, 64.0]);

    let mut decoder = YoloDecoder::new(CLASSES, ANCHORS, 640.0);
    let det = decoder.decode(&out).unwrap().items[0];
    assert!((det.bbox.y - 0.85).abs() < 1e-5);
  }

  #[test]
  fn keeps_only_best_class_per_anchor() {
    let mut out = empty_output();
    put(&mut out, 5, 3, 0.6, [100.0, 100.0, 50.0, 50.0]);
    out[(4 + 7) * ANCHORS + 5] = 0.7;

    let mut decoder = YoloDecoder::new(CLASSES, ANCHORS, 640.0);
    let result = decoder.decode(&out).unwrap();
    assert_eq!(result.len(), 1);
    assert_eq!(result.items[0].class_id, 7);
  }

  #[test]
  fn score_equal_to_threshold_is_dropped() {
    let mut out = empty_output();
    put(&mut out, 0, 1, 0.5, [100.0, 100.0, 50.0, 50.0]);

    let mut decoder = YoloDecoder::new(CLASSES, ANCHORS, 640.0).confidence_threshold(0.5);
    assert!(decoder.decode(&out).unwrap().is_empty());
  }

  #[test]
  fn degenerate_boxes_are_dropped() {
    let mut out = empty_output();
    put(&mut out, 0, 1, 0.9, [320.0, 320.0, 0.0, 0.0]);
    put(&mut out, 1, 1, 0.9, [320.0, 320.0, 80.0, -4.0]);
    put(&mut out, 2, 1, 0.9, [320.0, f32::NAN, 80.0, 80.0]);
    put(&mut out, 3, 1, 0.8, [340.0, 330.0, 100.0, 100.0]);

    let mut decoder = YoloDecoder::new(CLASSES, ANCHORS, 640.0);
    let result = decoder.decode(&out).unwrap();
    assert_eq!(result.len(), 1);
    assert_eq!(result.items[0].score, 0.8);
    assert!(!result.items[0].bbox.is_degenerate());
  }

  #[test]
  fn rejects_wrong_buffer_size() {
    let mut decoder = YoloDecoder::new(CLASSES, ANCHORS, 640.0);
    let err = decoder.decode(&[0.0; 16]).unwrap_err();
    assert_eq!(
      err,
      DecodeError::SizeMismatch {
        expected: 84 * 8400,
        actual: 16
      }
    );
  }

  #[test]
  fn overlapping_pair_keeps_higher_confidence() {
    // 两框 IoU = 0.8
    let a = NormRect::new(0.0, 0.0, 1.0, 1.0);
    let b = NormRect::new(0.0, 0.0, 0.8, 1.0);
    assert!((a.iou(&b) - 0.8).abs() < 1e-6);

    let mut proposals = vec![item(0.6, b), item(0.9, a)];
    let kept = non_max_suppression(&mut proposals, 0.4);
    assert_eq!(kept.len(), 1);
    assert_eq!(kept[0].score, 0.9);
    assert!(proposals.is_empty());
  }

  #[test]
  fn equal_scores_keep_original_order() {
    let a = NormRect::new(0.0, 0.0, 0.2, 0.2);
    let b = NormRect::new(0.01, 0.0, 0.2, 0.2);
    let mut proposals = vec![item(0.5, a), item(0.5, b)];
    let kept = non_max_suppression(&mut proposals, 0.4);
    assert_eq!(kept.len(), 1);
    assert_eq!(kept[0].bbox, a);
  }

  #[test]
  fn suppressed_box_does_not_suppress_others() {
    // b 被 a 抑制；c 只与 b 重叠，应被保留
    let a = NormRect::new(0.0, 0.0, 0.4, 0.4);
    let b = NormRect::new(0.1, 0.0, 0.4, 0.4);
    let c = NormRect::new(0.35, 0.0, 0.4, 0.4);
    let mut proposals = vec![item(0.9, a), item(0.8, b), item(0.7, c)];
    let kept = non_max_suppression(&mut proposals, 0.4);
    assert_eq!(kept.len(), 2);
    assert_eq!(kept[0].bbox, a);
    assert_eq!(kept[1].bbox, c);
  }
}
