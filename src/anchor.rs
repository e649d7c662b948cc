// 该文件是 Kanjian （看见） 项目的一部分。
// src/anchor.rs - 世界锚定实体
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
use tracing::{info, warn};

use crate::{
  frame::RgbNhwcFrame,
  geometry::{Pose, Ray, Vec3},
  placement::PlacedObject,
  tracking::{AnchorHandle, SpatialTracker, TrackingError},
};

#[derive(Error, Debug)]
pub enum AnchorError {
  #[error("跟踪错误: {0}")]
  Tracking(#[from] TrackingError),
}

/// 会话结束时固定在世界中的物体
#[derive(Debug, Clone)]
pub struct AnchoredEntity {
  pub position: Vec3,
  pub size: Vec3,
  pub label_position: Vec3,
  pub label: String,
  pub confidence: f32,
  /// 提交时的整帧屏幕图像
  pub reference_image: RgbNhwcFrame,
  pub anchor: AnchorHandle,
  pub label_anchor: Option<AnchorHandle>,
}

#[derive(Debug, Default)]
pub struct AnchorRegistry {
  entities: Vec<AnchoredEntity>,
}

impl AnchorRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  /// 将摆放对象锚定到世界中，并拷贝参考图像
  ///
  /// 整帧拷贝开销较大，只应在会话结束时调用一次。
  /// 锚点创建失败时不做任何修改，摆放对象仍归调用方所有。
  pub fn commit<T: SpatialTracker>(
    &mut self,
    placed: &PlacedObject,
    capture: &RgbNhwcFrame,
    tracker: &mut T,
  ) -> Result<&AnchoredEntity, AnchorError> {
    let anchor = tracker.create_anchor(&Pose::from_position(placed.position))?;
    let label_anchor = match tracker.create_anchor(&Pose::from_position(placed.label_position)) {
      Ok(handle) => Some(handle),
      Err(e) => {
        warn!("标签锚点创建失败: {}", e);
        None
      }
    };

    info!(
      "锚定物体 {} ({:.0}%) 于 ({:.3}, {:.3}, {:.3})",
      placed.label,
      placed.confidence * 100.0,
      placed.position.x,
      placed.position.y,
      placed.position.z
    );

    let index = self.entities.len();
    self.entities.push(AnchoredEntity {
      position: placed.position,
      size: placed.size,
      label_position: placed.label_position,
      label: placed.label.clone(),
      confidence: placed.confidence,
      reference_image: capture.clone(),
      anchor,
      label_anchor,
    });
    Ok(&self.entities[index])
  }

  /// 清除全部锚定实体及其锚点，返回清除数量
  pub fn clear<T: SpatialTracker>(&mut self, tracker: &mut T) -> usize {
    let count = self.entities.len();
    for entity in self.entities.drain(..) {
      let handles = std::iter::once(entity.anchor).chain(entity.label_anchor);
      for handle in handles {
        if let Err(e) = tracker.remove_anchor(handle) {
          warn!("移除锚点 {:?} 失败: {}", handle, e);
        }
      }
    }
    info!("已清除 {} 个锚定物体", count);
    count
  }

  /// 射线拾取最近的锚定实体
  pub fn pick(&self, ray: &Ray) -> Option<&AnchoredEntity> {
    self
      .entities
      .iter()
      .filter_map(|e| ray.intersect_aabb(&e.position, &e.size).map(|t| (t, e)))
      .min_by(|a, b| a.0.total_cmp(&b.0))
      .map(|(_, e)| e)
  }

  pub fn get(&self, handle: AnchorHandle) -> Option<&AnchoredEntity> {
    self.entities.iter().find(|e| e.anchor == handle)
  }

  pub fn iter(&self) -> std::slice::Iter<'_, AnchoredEntity> {
    self.entities.iter()
  }

  pub fn len(&self) -> usize {
    self.entities.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entities.is_empty()
  }
}
