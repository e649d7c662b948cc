// 该文件是 Kanjian （看见） 项目的一部分。
// src/config.rs - 扫描配置
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

use std::path::Path;

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum ConfigError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("配置解析错误: {0}")]
  ParseError(#[from] serde_json::Error),
  #[error("配置项 {name} 取值无效: {value}")]
  InvalidValue { name: &'static str, value: f32 },
}

/// 扫描流程的全部可调参数
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
  /// 扫描时长（秒）
  pub scan_duration: f32,
  /// 对焦半径（归一化）
  pub focus_radius: f32,
  /// 体块尺寸系数
  pub box_size_multiplier: f32,
  /// 标签相对体块顶部的偏移
  pub label_offset: [f32; 3],
  /// 置信度阈值
  pub confidence_threshold: f32,
  /// NMS IoU 阈值
  pub iou_threshold: f32,
  pub num_classes: usize,
  pub num_anchors: usize,
  /// 模型输入边长（像素）
  pub input_size: f32,
  /// 无平面时的摆放距离（米）
  pub fallback_distance: f32,
  /// 平滑插值系数
  pub smoothing: f32,
  /// 垂直视场角（度）
  pub fov_y_degrees: f32,
  /// 叠加框槽位数
  pub overlay_capacity: usize,
}

impl Default for ScanConfig {
  fn default() -> Self {
    Self {
      scan_duration: 3.0,
      focus_radius: 0.2,
      box_size_multiplier: 0.1,
      label_offset: [0.0, 0.2, 0.0],
      confidence_threshold: 0.2,
      iou_threshold: 0.4,
      num_classes: 80,
      num_anchors: 8400,
      input_size: 640.0,
      fallback_distance: 0.8,
      smoothing: 0.2,
      fov_y_degrees: 60.0,
      overlay_capacity: 4,
    }
  }
}

fn check(name: &'static str, value: f32, ok: bool) -> Result<(), ConfigError> {
  if ok && value.is_finite() {
    Ok(())
  } else {
    Err(ConfigError::InvalidValue { name, value })
  }
}

impl ScanConfig {
  pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
    let path = path.as_ref();
    info!("加载配置文件: {}", path.display());
    let text = std::fs::read_to_string(path)?;
    let config = Self::from_json_str(&text)?;
    debug!("配置内容: {:?}", config);
    Ok(config)
  }

  pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
    let config: ScanConfig = serde_json::from_str(text)?;
    config.validate()?;
    Ok(config)
  }

  pub fn validate(&self) -> Result<(), ConfigError> {
    check("scan_duration", self.scan_duration, self.scan_duration > 0.0)?;
    check("focus_radius", self.focus_radius, self.focus_radius > 0.0)?;
    check(
      "box_size_multiplier",
      self.box_size_multiplier,
      self.box_size_multiplier > 0.0,
    )?;
    check(
      "confidence_threshold",
      self.confidence_threshold,
      (0.0..=1.0).contains(&self.confidence_threshold),
    )?;
    check(
      "iou_threshold",
      self.iou_threshold,
      (0.0..=1.0).contains(&self.iou_threshold),
    )?;
    check("input_size", self.input_size, self.input_size > 0.0)?;
    check(
      "fallback_distance",
      self.fallback_distance,
      self.fallback_distance > 0.0,
    )?;
    check(
      "smoothing",
      self.smoothing,
      self.smoothing > 0.0 && self.smoothing <= 1.0,
    )?;
    check(
      "fov_y_degrees",
      self.fov_y_degrees,
      self.fov_y_degrees > 0.0 && self.fov_y_degrees < 180.0,
    )?;
    check("num_classes", self.num_classes as f32, self.num_classes > 0)?;
    check("num_anchors", self.num_anchors as f32, self.num_anchors > 0)?;
    for v in self.label_offset {
      check("label_offset", v, true)?;
    }
    Ok(())
  }
}
