// 该文件是 Kanjian （看见） 项目的一部分。
// src/session.rs - 扫描会话控制器
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

//! 扫描会话：Idle → Scanning → Idle。
//!
//! 控制器由外部按帧调用 [`ScanController::tick`]，单线程协作式运行。
//! 同一时刻最多一个推理请求在途，在途期间到来的帧直接跳过。
//! 每个请求记录发起时的会话纪元，结果只有在纪元一致且仍在扫描时才会生效。

use std::task::Poll;

use tracing::{debug, info, warn};

use crate::{
  anchor::{AnchorRegistry, AnchoredEntity},
  config::ScanConfig,
  frame::RgbNhwcFrame,
  geometry::{ScreenPoint, ScreenSize},
  model::{CocoLabel, FocusSelector, InferenceBackend, Ticket, WithLabel, YoloDecoder},
  output::OverlayBoxes,
  placement::{PlacedObject, PlacementProjector, PlacementSource},
  tracking::{AnchorHandle, PlacementReticle, SpatialTracker},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
  Idle,
  Scanning,
}

/// 会话纪元，每结束一次会话加一
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SessionEpoch(pub u64);

#[derive(Debug, Clone, Copy)]
struct InFlight {
  epoch: SessionEpoch,
  ticket: Ticket,
}

/// 一次推理结果被处理后的去向
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
  Placed(PlacementSource),
  /// 平面已锁定但本帧未命中，保持原位
  Held,
  NoDetection,
  /// 几何退化，本帧不摆放
  Degenerate,
  /// 会话已结束或已更替，结果被丢弃
  Discarded,
  /// 后端或解码失败
  Failed,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickReport {
  pub outcome: Option<CycleOutcome>,
  pub started: bool,
  pub finished: bool,
  pub committed: Option<AnchorHandle>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InputEvent {
  Tap { count: u32, position: ScreenPoint },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputResponse {
  Ignored,
  ScanStarted,
  Selected(AnchorHandle),
  NothingSelected,
}

pub struct ScanController<B, T> {
  config: ScanConfig,
  decoder: YoloDecoder,
  selector: FocusSelector,
  projector: PlacementProjector,
  backend: B,
  tracker: T,
  overlay: OverlayBoxes,
  reticle: PlacementReticle,
  registry: AnchorRegistry,
  state: SessionState,
  remaining: f32,
  epoch: SessionEpoch,
  in_flight: Option<InFlight>,
  surface_locked: bool,
  placed: Option<PlacedObject>,
  capture: RgbNhwcFrame,
  ui_blocked: bool,
}

impl<B, T> ScanController<B, T>
where
  B: InferenceBackend<Frame = RgbNhwcFrame>,
  T: SpatialTracker,
{
  pub fn new(config: ScanConfig, screen: ScreenSize, backend: B, tracker: T) -> Self {
    Self {
      decoder: YoloDecoder::from_config(&config),
      selector: FocusSelector::new(config.focus_radius),
      projector: PlacementProjector::from_config(&config, screen),
      overlay: OverlayBoxes::new(config.overlay_capacity, screen),
      reticle: PlacementReticle::default(),
      registry: AnchorRegistry::new(),
      state: SessionState::Idle,
      remaining: 0.0,
      epoch: SessionEpoch(0),
      in_flight: None,
      surface_locked: false,
      placed: None,
      capture: RgbNhwcFrame::with_shape(screen.height as usize, screen.width as usize),
      ui_blocked: false,
      config,
      backend,
      tracker,
    }
  }

  /// 开始扫描；已在扫描中时返回 false
  pub fn begin_scan(&mut self) -> bool {
    if self.state == SessionState::Scanning {
      return false;
    }
    self.state = SessionState::Scanning;
    self.remaining = self.config.scan_duration;
    self.surface_locked = false;
    self.placed = None;
    info!(
      "开始扫描，纪元 {}，时长 {:.2}s",
      self.epoch.0, self.config.scan_duration
    );
    true
  }

  /// 推进一个调度周期，`elapsed` 为距上一次调用的秒数
  pub fn tick(&mut self, elapsed: f32, frame: &RgbNhwcFrame) -> TickReport {
    self.reticle.update(&mut self.tracker, self.projector.screen());

    let mut report = TickReport {
      outcome: self.poll_in_flight(),
      ..Default::default()
    };

    if self.state != SessionState::Scanning {
      return report;
    }

    let elapsed = if elapsed.is_finite() && elapsed >= 0.0 {
      elapsed
    } else {
      warn!("无效的帧间隔 {}，按 0 处理", elapsed);
      0.0
    };
    self.remaining -= elapsed;
    if self.remaining <= 0.0 {
      report.committed = self.finish();
      report.finished = true;
      return report;
    }

    if self.in_flight.is_none() {
      report.started = self.start_cycle(frame);
    } else {
      debug!("推理在途，跳过本帧");
    }
    report
  }

  /// 结束会话并锚定当前摆放对象；重复调用无副作用
  ///
  /// 锚定失败时摆放对象保留，可通过 [`ScanController::retry_commit`] 重试。
  pub fn finish(&mut self) -> Option<AnchorHandle> {
    if !self.end_session() {
      return None;
    }
    self.commit_placed()
  }

  /// 空闲状态下重新锚定上次未能锚定的摆放对象
  pub fn retry_commit(&mut self) -> Option<AnchorHandle> {
    if self.state == SessionState::Scanning {
      return None;
    }
    self.commit_placed()
  }

  fn commit_placed(&mut self) -> Option<AnchorHandle> {
    let placed = self.placed.take()?;
    match self
      .registry
      .commit(&placed, &self.capture, &mut self.tracker)
    {
      Ok(entity) => Some(entity.anchor),
      Err(e) => {
        warn!(
          "锚定 {} 于 ({:.3}, {:.3}, {:.3}) 失败: {}",
          placed.label, placed.position.x, placed.position.y, placed.position.z, e
        );
        self.placed = Some(placed);
        None
      }
    }
  }

  /// 中止会话，不锚定
  pub fn abort(&mut self) {
    if self.end_session() {
      self.placed = None;
      info!("扫描已中止");
    }
  }

  pub fn handle_input(&mut self, event: InputEvent) -> InputResponse {
    if self.ui_blocked || self.state == SessionState::Scanning {
      return InputResponse::Ignored;
    }

    match event {
      InputEvent::Tap { count: 2, .. } => {
        if self.begin_scan() {
          InputResponse::ScanStarted
        } else {
          InputResponse::Ignored
        }
      }
      InputEvent::Tap { count: 1, position } => {
        let ray = self
          .projector
          .screen_ray(&self.tracker.camera_pose(), position);
        match self.registry.pick(&ray) {
          Some(entity) => {
            info!("选中物体: {}", entity.label);
            InputResponse::Selected(entity.anchor)
          }
          None => InputResponse::NothingSelected,
        }
      }
      InputEvent::Tap { .. } => InputResponse::Ignored,
    }
  }

  /// 菜单等界面元素遮挡输入时设置
  pub fn set_ui_blocked(&mut self, blocked: bool) {
    self.ui_blocked = blocked;
  }

  /// 清除全部锚定物体、当前摆放对象与叠加框
  pub fn clear_all_anchors(&mut self) -> usize {
    self.placed = None;
    self.overlay.clear();
    self.registry.clear(&mut self.tracker)
  }

  pub fn state(&self) -> SessionState {
    self.state
  }

  pub fn is_scanning(&self) -> bool {
    self.state == SessionState::Scanning
  }

  pub fn remaining(&self) -> f32 {
    self.remaining.max(0.0)
  }

  pub fn epoch(&self) -> SessionEpoch {
    self.epoch
  }

  pub fn is_in_flight(&self) -> bool {
    self.in_flight.is_some()
  }

  pub fn surface_locked(&self) -> bool {
    self.surface_locked
  }

  pub fn placed(&self) -> Option<&PlacedObject> {
    self.placed.as_ref()
  }

  pub fn overlay(&self) -> &OverlayBoxes {
    &self.overlay
  }

  /// 屏幕中心的平面准星，每次 `tick` 刷新
  pub fn reticle(&self) -> &PlacementReticle {
    &self.reticle
  }

  pub fn registry(&self) -> &AnchorRegistry {
    &self.registry
  }

  pub fn entity(&self, handle: AnchorHandle) -> Option<&AnchoredEntity> {
    self.registry.get(handle)
  }

  pub fn tracker(&self) -> &T {
    &self.tracker
  }

  pub fn tracker_mut(&mut self) -> &mut T {
    &mut self.tracker
  }

  pub fn backend_mut(&mut self) -> &mut B {
    &mut self.backend
  }

  fn end_session(&mut self) -> bool {
    if self.state == SessionState::Idle {
      return false;
    }
    self.state = SessionState::Idle;
    self.remaining = 0.0;
    self.epoch = SessionEpoch(self.epoch.0 + 1);
    self.overlay.clear();
    info!("扫描结束，进入纪元 {}", self.epoch.0);
    true
  }

  fn start_cycle(&mut self, frame: &RgbNhwcFrame) -> bool {
    if !self.backend.is_ready() {
      warn!("推理后端未就绪，跳过本帧");
      return false;
    }

    self.capture.copy_from(frame);
    match self.backend.submit(&self.capture) {
      Ok(ticket) => {
        debug!("提交推理请求 {:?}", ticket);
        self.in_flight = Some(InFlight {
          epoch: self.epoch,
          ticket,
        });
        true
      }
      Err(e) => {
        warn!("提交推理失败，跳过本帧: {}", e);
        false
      }
    }
  }

  fn poll_in_flight(&mut self) -> Option<CycleOutcome> {
    let flight = self.in_flight?;
    let result = match self.backend.poll(flight.ticket) {
      Poll::Pending => return None,
      Poll::Ready(result) => result,
    };
    self.in_flight = None;

    if flight.epoch != self.epoch || self.state != SessionState::Scanning {
      debug!(
        "丢弃过期推理结果 {:?}（纪元 {} / 当前 {}）",
        flight.ticket, flight.epoch.0, self.epoch.0
      );
      return Some(CycleOutcome::Discarded);
    }

    match result {
      Ok(output) => Some(self.apply_output(&output)),
      Err(e) => {
        warn!("推理失败: {}", e);
        Some(CycleOutcome::Failed)
      }
    }
  }

  fn apply_output(&mut self, output: &[f32]) -> CycleOutcome {
    let result = match self.decoder.decode(output) {
      Ok(result) => result,
      Err(e) => {
        warn!("解码失败: {}", e);
        return CycleOutcome::Failed;
      }
    };

    let Some(focused) = self.selector.select(&result.items).copied() else {
      self.overlay.draw(&[]);
      return CycleOutcome::NoDetection;
    };

    self.overlay.draw(std::slice::from_ref(&focused));
    let name = CocoLabel::from_label_id(focused.class_id).to_label_str();
    match self.projector.place(
      &focused,
      &name,
      &mut self.tracker,
      &mut self.surface_locked,
      &mut self.placed,
    ) {
      Ok(Some(source)) => CycleOutcome::Placed(source),
      Ok(None) => CycleOutcome::Held,
      Err(e) => {
        debug!("本帧不摆放: {}", e);
        CycleOutcome::Degenerate
      }
    }
  }
}
