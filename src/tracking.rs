// 该文件是 Kanjian （看见） 项目的一部分。
// src/tracking.rs - 平面跟踪与锚点接口
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

use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::geometry::{CameraOptics, Pose, ScreenPoint, ScreenSize, Vec3};

/// 跟踪子系统分配的锚点句柄，对核心而言不透明
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct AnchorHandle(pub u64);

#[derive(Error, Debug)]
pub enum TrackingError {
  #[error("跟踪尚未建立")]
  NotTracking,
  #[error("锚点位姿无效")]
  InvalidPose,
  #[error("未知锚点: {0:?}")]
  UnknownAnchor(AnchorHandle),
}

/// 平面跟踪与锚点子系统
pub trait SpatialTracker {
  /// 当前相机位姿
  fn camera_pose(&self) -> Pose;
  /// 从屏幕点发出射线与已识别平面求交
  fn raycast_surface(&mut self, point: ScreenPoint) -> Option<Pose>;
  fn create_anchor(&mut self, pose: &Pose) -> Result<AnchorHandle, TrackingError>;
  fn remove_anchor(&mut self, handle: AnchorHandle) -> Result<(), TrackingError>;
}

/// 以水平地面代替真实平面检测的跟踪器，用于回放与测试
#[derive(Debug, Clone)]
pub struct FloorPlaneTracker {
  camera: Pose,
  optics: CameraOptics,
  screen: ScreenSize,
  floor_y: Option<f32>,
  anchors: HashMap<AnchorHandle, Pose>,
  next_handle: u64,
}

impl FloorPlaneTracker {
  pub fn new(camera: Pose, optics: CameraOptics, screen: ScreenSize) -> Self {
    Self {
      camera,
      optics,
      screen,
      floor_y: None,
      anchors: HashMap::new(),
      next_handle: 1,
    }
  }

  /// 设置地面高度；`None` 表示尚未识别到平面
  pub fn with_floor(mut self, floor_y: Option<f32>) -> Self {
    self.floor_y = floor_y;
    self
  }

  pub fn set_floor(&mut self, floor_y: Option<f32>) {
    self.floor_y = floor_y;
  }

  pub fn set_camera(&mut self, camera: Pose) {
    self.camera = camera;
  }

  pub fn anchor(&self, handle: AnchorHandle) -> Option<&Pose> {
    self.anchors.get(&handle)
  }

  pub fn anchor_count(&self) -> usize {
    self.anchors.len()
  }
}

impl SpatialTracker for FloorPlaneTracker {
  fn camera_pose(&self) -> Pose {
    self.camera
  }

  fn raycast_surface(&mut self, point: ScreenPoint) -> Option<Pose> {
    let floor_y = self.floor_y?;
    let ray = self.optics.screen_ray(&self.camera, self.screen, point);
    if ray.direction.y.abs() < f32::EPSILON {
      return None;
    }
    let t = (floor_y - ray.origin.y) / ray.direction.y;
    if !t.is_finite() || t <= 0.0 {
      return None;
    }
    let hit = ray.at(t);
    debug!("平面命中: ({:.3}, {:.3}, {:.3})", hit.x, hit.y, hit.z);
    Some(Pose::from_position(hit))
  }

  fn create_anchor(&mut self, pose: &Pose) -> Result<AnchorHandle, TrackingError> {
    if !pose.position.iter().all(|v| v.is_finite()) {
      return Err(TrackingError::InvalidPose);
    }
    let handle = AnchorHandle(self.next_handle);
    self.next_handle += 1;
    self.anchors.insert(handle, *pose);
    Ok(handle)
  }

  fn remove_anchor(&mut self, handle: AnchorHandle) -> Result<(), TrackingError> {
    self
      .anchors
      .remove(&handle)
      .map(|_| ())
      .ok_or(TrackingError::UnknownAnchor(handle))
  }
}

/// 屏幕中心的放置准星，每帧刷新
#[derive(Debug, Clone, Copy, Default)]
pub struct PlacementReticle {
  pose: Option<Pose>,
}

impl PlacementReticle {
  pub fn update<T: SpatialTracker>(&mut self, tracker: &mut T, screen: ScreenSize) -> Option<Pose> {
    self.pose = tracker.raycast_surface(screen.center());
    self.pose
  }

  pub fn is_visible(&self) -> bool {
    self.pose.is_some()
  }

  pub fn position(&self) -> Option<Vec3> {
    self.pose.map(|p| p.position)
  }
}
