// 该文件是 Kanjian （看见） 项目的一部分。
// src/geometry.rs - 几何基础类型
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

//! 世界坐标约定：y 轴向上，相机前方为局部 +z。
//! 屏幕坐标以像素为单位，原点在左下角，y 向上增长，与翻转后的归一化框一致。

use nalgebra::{Point2, UnitQuaternion, Vector3};
use serde::Serialize;

pub type Vec3 = Vector3<f32>;
pub type ScreenPoint = Point2<f32>;

/// 归一化矩形，取值为图像宽高的比例
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct NormRect {
  pub x: f32,
  pub y: f32,
  pub width: f32,
  pub height: f32,
}

impl NormRect {
  pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
    Self {
      x,
      y,
      width,
      height,
    }
  }

  pub fn center(&self) -> (f32, f32) {
    (self.x + self.width / 2.0, self.y + self.height / 2.0)
  }

  pub fn area(&self) -> f32 {
    self.width * self.height
  }

  pub fn is_finite(&self) -> bool {
    self.x.is_finite() && self.y.is_finite() && self.width.is_finite() && self.height.is_finite()
  }

  /// 零面积或含非有限值的框
  pub fn is_degenerate(&self) -> bool {
    !self.is_finite() || self.width <= 0.0 || self.height <= 0.0
  }

  /// 计算两个矩形的 IoU
  pub fn iou(&self, other: &NormRect) -> f32 {
    let x1 = self.x.max(other.x);
    let y1 = self.y.max(other.y);
    let inter_w = (self.x + self.width).min(other.x + other.width) - x1;
    let inter_h = (self.y + self.height).min(other.y + other.height) - y1;

    if inter_w <= 0.0 || inter_h <= 0.0 {
      return 0.0;
    }

    let intersection = inter_w * inter_h;
    let union = self.area() + other.area() - intersection;

    if union > 0.0 {
      intersection / union
    } else {
      0.0
    }
  }
}

/// 屏幕像素尺寸
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScreenSize {
  pub width: u32,
  pub height: u32,
}

impl ScreenSize {
  pub fn new(width: u32, height: u32) -> Self {
    Self { width, height }
  }

  pub fn aspect(&self) -> f32 {
    self.width as f32 / self.height as f32
  }

  /// 归一化坐标转换为屏幕像素坐标
  pub fn to_screen(&self, nx: f32, ny: f32) -> ScreenPoint {
    ScreenPoint::new(nx * self.width as f32, ny * self.height as f32)
  }

  pub fn center(&self) -> ScreenPoint {
    self.to_screen(0.5, 0.5)
  }
}

/// 位姿：位置与朝向
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
  pub position: Vec3,
  pub rotation: UnitQuaternion<f32>,
}

impl Pose {
  pub fn new(position: Vec3, rotation: UnitQuaternion<f32>) -> Self {
    Self { position, rotation }
  }

  pub fn from_position(position: Vec3) -> Self {
    Self::new(position, UnitQuaternion::identity())
  }

  pub fn forward(&self) -> Vec3 {
    self.rotation * Vec3::z()
  }

  pub fn up(&self) -> Vec3 {
    self.rotation * Vec3::y()
  }

  pub fn right(&self) -> Vec3 {
    self.rotation * Vec3::x()
  }
}

/// 射线，方向已归一化
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
  pub origin: Vec3,
  pub direction: Vec3,
}

impl Ray {
  pub fn at(&self, t: f32) -> Vec3 {
    self.origin + self.direction * t
  }

  /// 与轴对齐包围盒求交（slab 方法），返回最近的非负命中距离
  pub fn intersect_aabb(&self, center: &Vec3, size: &Vec3) -> Option<f32> {
    let half = size / 2.0;
    let min = center - half;
    let max = center + half;

    let mut t_near = f32::NEG_INFINITY;
    let mut t_far = f32::INFINITY;
    for axis in 0..3 {
      let o = self.origin[axis];
      let d = self.direction[axis];
      if d.abs() < f32::EPSILON {
        if o < min[axis] || o > max[axis] {
          return None;
        }
        continue;
      }
      let t1 = (min[axis] - o) / d;
      let t2 = (max[axis] - o) / d;
      t_near = t_near.max(t1.min(t2));
      t_far = t_far.min(t1.max(t2));
    }

    if t_near > t_far || t_far < 0.0 {
      None
    } else {
      Some(t_near.max(0.0))
    }
  }
}

/// 相机光学参数
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraOptics {
  /// 垂直视场角（度）
  pub fov_y_degrees: f32,
  /// 宽高比
  pub aspect: f32,
}

impl CameraOptics {
  pub fn new(fov_y_degrees: f32, aspect: f32) -> Self {
    Self {
      fov_y_degrees,
      aspect,
    }
  }

  fn half_fov_tan(&self) -> f32 {
    (self.fov_y_degrees.to_radians() * 0.5).tan()
  }

  /// 给定距离处视锥截面的 (宽, 高)，退化时返回 None
  pub fn frustum_extents(&self, distance: f32) -> Option<(f32, f32)> {
    let height = 2.0 * distance * self.half_fov_tan();
    let width = height * self.aspect;
    if height.is_finite() && width.is_finite() && height > 0.0 && width > 0.0 {
      Some((width, height))
    } else {
      None
    }
  }

  /// 从相机出发穿过屏幕点的射线
  pub fn screen_ray(&self, camera: &Pose, screen: ScreenSize, point: ScreenPoint) -> Ray {
    let ndc_x = 2.0 * point.x / screen.width as f32 - 1.0;
    let ndc_y = 2.0 * point.y / screen.height as f32 - 1.0;
    let t = self.half_fov_tan();
    let local = Vec3::new(ndc_x * t * self.aspect, ndc_y * t, 1.0);
    Ray {
      origin: camera.position,
      direction: (camera.rotation * local).normalize(),
    }
  }
}
