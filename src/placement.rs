// 该文件是 Kanjian （看见） 项目的一部分。
// src/placement.rs - 检测结果的空间摆放
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
  geometry::{CameraOptics, NormRect, Pose, Ray, ScreenPoint, ScreenSize, Vec3},
  model::DetectItem,
  tracking::SpatialTracker,
};

#[derive(Error, Debug, PartialEq)]
pub enum PlacementError {
  #[error("检测框退化: {0:?}")]
  DegenerateBox(NormRect),
  #[error("摆放距离无效: {0}")]
  DegenerateDistance(f32),
  #[error("视锥尺寸无效，距离 {0}")]
  DegenerateFrustum(f32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlacementSource {
  /// 命中已识别平面
  Surface,
  /// 相机前方固定距离
  CameraFallback,
}

/// 单帧计算出的目标位置，尚未平滑
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlacementTarget {
  pub position: Vec3,
  pub size: Vec3,
  pub label_position: Vec3,
  pub source: PlacementSource,
}

/// 当前会话中唯一的摆放对象
#[derive(Debug, Clone, PartialEq)]
pub struct PlacedObject {
  pub position: Vec3,
  pub size: Vec3,
  pub label_position: Vec3,
  pub label: String,
  pub confidence: f32,
  /// 至少经过一次插值更新
  pub smoothed: bool,
  pub updates: u32,
}

impl PlacedObject {
  /// 首次摆放，之后只通过 [`PlacedObject::update`] 修改
  pub(crate) fn new(target: &PlacementTarget, label: &str, confidence: f32) -> Self {
    Self {
      position: target.position,
      size: target.size,
      label_position: target.label_position,
      label: label.to_string(),
      confidence,
      smoothed: false,
      updates: 1,
    }
  }

  /// 位置与尺寸向目标指数插值，标签立即更新
  pub fn update(&mut self, target: &PlacementTarget, label: &str, confidence: f32, factor: f32) {
    self.position = self.position.lerp(&target.position, factor);
    self.size = self.size.lerp(&target.size, factor);
    self.label_position = self.label_position.lerp(&target.label_position, factor);
    if self.label != label {
      self.label.clear();
      self.label.push_str(label);
    }
    self.confidence = confidence;
    self.smoothed = true;
    self.updates += 1;
  }
}

#[derive(Debug, Clone)]
pub struct PlacementProjector {
  optics: CameraOptics,
  screen: ScreenSize,
  size_multiplier: f32,
  fallback_distance: f32,
  smoothing: f32,
  label_offset: Vec3,
}

impl PlacementProjector {
  pub fn new(optics: CameraOptics, screen: ScreenSize) -> Self {
    Self::from_config(&ScanConfig::default(), screen).optics(optics)
  }

  pub fn from_config(config: &ScanConfig, screen: ScreenSize) -> Self {
    Self {
      optics: CameraOptics::new(config.fov_y_degrees, screen.aspect()),
      screen,
      size_multiplier: config.box_size_multiplier,
      fallback_distance: config.fallback_distance,
      smoothing: config.smoothing,
      label_offset: Vec3::from(config.label_offset),
    }
  }

  pub fn optics(mut self, optics: CameraOptics) -> Self {
    self.optics = optics;
    self
  }

  pub fn screen(&self) -> ScreenSize {
    self.screen
  }

  pub fn screen_ray(&self, camera: &Pose, point: ScreenPoint) -> Ray {
    self.optics.screen_ray(camera, self.screen, point)
  }

  /// 根据视锥在给定距离处的截面估计物体尺寸，深度取宽高的较小值
  pub fn world_size(&self, bbox: &NormRect, distance: f32) -> Result<Vec3, PlacementError> {
    if !distance.is_finite() || distance <= 0.0 {
      return Err(PlacementError::DegenerateDistance(distance));
    }
    let (frustum_w, frustum_h) = self
      .optics
      .frustum_extents(distance)
      .ok_or(PlacementError::DegenerateFrustum(distance))?;
    let w = frustum_w * bbox.width * self.size_multiplier;
    let h = frustum_h * bbox.height * self.size_multiplier;
    if !(w > 0.0 && h > 0.0) {
      return Err(PlacementError::DegenerateBox(*bbox));
    }
    Ok(Vec3::new(w, h, w.min(h)))
  }

  /// 计算单帧目标。平面锁定后未命中平面时返回 `Ok(None)`，保持原位。
  pub fn project<T: SpatialTracker>(
    &self,
    det: &DetectItem,
    tracker: &mut T,
    surface_locked: bool,
  ) -> Result<Option<PlacementTarget>, PlacementError> {
    let bbox = det.bbox;
    if bbox.is_degenerate() {
      return Err(PlacementError::DegenerateBox(bbox));
    }

    let (cx, cy) = bbox.center();
    let camera = tracker.camera_pose();

    if let Some(hit) = tracker.raycast_surface(self.screen.to_screen(cx, cy)) {
      let distance = (camera.position - hit.position).norm();
      let size = self.world_size(&bbox, distance)?;
      let up = Vec3::y();
      let position = hit.position + up * (size.y / 2.0);
      let label_position = position + up * (size.y / 2.0) + self.label_offset;
      return Ok(Some(PlacementTarget {
        position,
        size,
        label_position,
        source: PlacementSource::Surface,
      }));
    }

    if surface_locked {
      debug!("平面已锁定，本帧未命中平面，保持原位");
      return Ok(None);
    }

    let distance = self.fallback_distance;
    let size = self.world_size(&bbox, distance)?;
    let position = camera.position + camera.forward() * distance;
    Ok(Some(PlacementTarget {
      position,
      size,
      label_position: position + self.label_offset,
      source: PlacementSource::CameraFallback,
    }))
  }

  /// 计算目标并更新摆放对象，返回本帧使用的摆放来源
  pub fn place<T: SpatialTracker>(
    &self,
    det: &DetectItem,
    label: &str,
    tracker: &mut T,
    surface_locked: &mut bool,
    placed: &mut Option<PlacedObject>,
  ) -> Result<Option<PlacementSource>, PlacementError> {
    let Some(target) = self.project(det, tracker, *surface_locked)? else {
      return Ok(None);
    };

    if target.source == PlacementSource::Surface {
      *surface_locked = true;
    }

    match placed {
      Some(object) => object.update(&target, label, det.score, self.smoothing),
      None => *placed = Some(PlacedObject::new(&target, label, det.score)),
    }
    Ok(Some(target.source))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::tracking::FloorPlaneTracker;
  use nalgebra::UnitQuaternion;

  const SCREEN: ScreenSize = ScreenSize {
    width: 1000,
    height: 1000,
  };

  fn det(bbox: NormRect) -> DetectItem {
    DetectItem {
      class_id: 41,
      score: 0.8,
      bbox,
    }
  }

  fn centered() -> DetectItem {
    det(NormRect::new(0.4, 0.4, 0.2, 0.2))
  }

  fn looking_down() -> Pose {
    let rotation = UnitQuaternion::from_axis_angle(&Vec3::x_axis(), std::f32::consts::FRAC_PI_4);
    Pose::new(Vec3::new(0.0, 1.0, 0.0), rotation)
  }

  fn projector() -> PlacementProjector {
    PlacementProjector::new(CameraOptics::new(90.0, 1.0), SCREEN)
  }

  fn tracker(floor: Option<f32>) -> FloorPlaneTracker {
    FloorPlaneTracker::new(looking_down(), CameraOptics::new(90.0, 1.0), SCREEN).with_floor(floor)
  }

  #[test]
  fn world_size_scales_with_frustum() {
    let size = projector()
      .world_size(&NormRect::new(0.0, 0.0, 0.5, 0.25), 1.0)
      .unwrap();
    // 90 度视场，1 米处视锥高宽均为 2 米
    assert!((size.x - 0.1).abs() < 1e-5);
    assert!((size.y - 0.05).abs() < 1e-5);
    assert_eq!(size.z, size.y);
  }

  #[test]
  fn degenerate_inputs_are_rejected() {
    let p = projector();
    let mut t = tracker(None);
    assert!(matches!(
      p.project(&det(NormRect::new(0.5, 0.5, 0.0, 0.1)), &mut t, false),
      Err(PlacementError::DegenerateBox(_))
    ));
    assert!(matches!(
      p.world_size(&NormRect::new(0.0, 0.0, 0.1, 0.1), f32::INFINITY),
      Err(PlacementError::DegenerateDistance(_))
    ));
  }

  #[test]
  fn surface_hit_rests_volume_on_surface() {
    let p = projector();
    let mut t = tracker(Some(0.0));
    let target = p.project(&centered(), &mut t, false).unwrap().unwrap();
    assert_eq!(target.source, PlacementSource::Surface);
    assert!((target.position.y - target.size.y / 2.0).abs() < 1e-5);
    assert!((target.label_position.y - (target.size.y + 0.2)).abs() < 1e-5);
  }

  #[test]
  fn fallback_places_in_front_of_camera() {
    let p = projector();
    let mut t = tracker(None);
    let target = p.project(&centered(), &mut t, false).unwrap().unwrap();
    assert_eq!(target.source, PlacementSource::CameraFallback);
    let expected = looking_down().position + looking_down().forward() * 0.8;
    assert!((target.position - expected).norm() < 1e-5);
  }

  #[test]
  fn no_fallback_after_surface_lock() {
    let p = projector();
    let mut t = tracker(Some(0.0));
    let mut locked = false;
    let mut placed = None;

    let source = p
      .place(&centered(), "Cup", &mut t, &mut locked, &mut placed)
      .unwrap();
    assert_eq!(source, Some(PlacementSource::Surface));
    assert!(locked);
    let before = placed.clone().unwrap();

    t.set_floor(None);
    let source = p
      .place(&centered(), "Cup", &mut t, &mut locked, &mut placed)
      .unwrap();
    assert_eq!(source, None);
    assert_eq!(placed.unwrap(), before);
  }

  #[test]
  fn fallback_repeats_until_surface_found() {
    let p = projector();
    let mut t = tracker(None);
    let mut locked = false;
    let mut placed = None;

    for _ in 0..3 {
      let source = p
        .place(&centered(), "Cup", &mut t, &mut locked, &mut placed)
        .unwrap();
      assert_eq!(source, Some(PlacementSource::CameraFallback));
    }
    assert!(!locked);
    assert_eq!(placed.unwrap().updates, 3);
  }

  #[test]
  fn smoothing_converges_monotonically() {
    let start = PlacementTarget {
      position: Vec3::zeros(),
      size: Vec3::repeat(0.1),
      label_position: Vec3::zeros(),
      source: PlacementSource::Surface,
    };
    let goal = PlacementTarget {
      position: Vec3::new(1.0, 2.0, -1.0),
      size: Vec3::repeat(0.3),
      label_position: Vec3::new(1.0, 2.5, -1.0),
      source: PlacementSource::Surface,
    };
    let mut object = PlacedObject::new(&start, "Cup", 0.5);
    let initial_gap = (goal.position - object.position).norm();

    let mut previous = initial_gap;
    let mut ticks = 0;
    while (goal.position - object.position).norm() > initial_gap * 0.01 {
      object.update(&goal, "Cup", 0.5, 0.2);
      let gap = (goal.position - object.position).norm();
      assert!(gap < previous);
      previous = gap;
      ticks += 1;
      assert!(ticks <= 21, "did not converge in 21 ticks");
    }
    assert!(object.smoothed);
  }

  #[test]
  fn label_updates_immediately() {
    let target = PlacementTarget {
      position: Vec3::zeros(),
      size: Vec3::repeat(0.1),
      label_position: Vec3::zeros(),
      source: PlacementSource::Surface,
    };
    let mut object = PlacedObject::new(&target, "Cup", 0.5);
    object.update(&target, "Bottle", 0.9, 0.2);
    assert_eq!(object.label, "Bottle");
    assert_eq!(object.confidence, 0.9);
  }
}
