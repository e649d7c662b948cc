// 该文件是 Kanjian （看见） 项目的一部分。
// tests/scan_task.rs - 扫描任务端到端测试
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

use std::{cell::RefCell, convert::Infallible, time::Duration};

use kanjian::{
  anchor::AnchoredEntity,
  config::ScanConfig,
  frame::RgbNhwcFrame,
  geometry::{CameraOptics, Pose, ScreenSize, Vec3},
  model::{ReplayBackend, ReplayFixture, ReplayObject},
  output::Render,
  session::ScanController,
  task::{ScanTask, Task},
  tracking::FloorPlaneTracker,
};
use nalgebra::UnitQuaternion;

const SCREEN: ScreenSize = ScreenSize {
  width: 32,
  height: 32,
};

#[derive(Default)]
struct Collect {
  labels: RefCell<Vec<String>>,
}

impl Render<AnchoredEntity> for &Collect {
  type Error = Infallible;

  fn render_result(&self, entity: &AnchoredEntity) -> Result<(), Self::Error> {
    self.labels.borrow_mut().push(entity.label.clone());
    Ok(())
  }
}

fn object(class_id: usize, score: f32) -> ReplayObject {
  ReplayObject {
    anchor: 3,
    class_id,
    score,
    cx: 320.0,
    cy: 320.0,
    w: 128.0,
    h: 96.0,
  }
}

fn session(
  frames: Vec<Vec<ReplayObject>>,
  latency: u32,
) -> ScanController<ReplayBackend, FloorPlaneTracker> {
  let fixture = ReplayFixture {
    num_classes: 80,
    num_anchors: 16,
    latency,
    frames,
  };
  let config = ScanConfig {
    num_anchors: 16,
    ..Default::default()
  };
  let rotation = UnitQuaternion::from_axis_angle(&Vec3::x_axis(), std::f32::consts::FRAC_PI_4);
  let tracker = FloorPlaneTracker::new(
    Pose::new(Vec3::new(0.0, 1.5, 0.0), rotation),
    CameraOptics::new(config.fov_y_degrees, SCREEN.aspect()),
    SCREEN,
  )
  .with_floor(Some(0.0));

  ScanController::new(
    config,
    SCREEN,
    ReplayBackend::from_fixture(fixture).unwrap(),
    tracker,
  )
}

fn frames(count: usize) -> impl Iterator<Item = RgbNhwcFrame> {
  std::iter::repeat_n(RgbNhwcFrame::with_shape(32, 32), count)
}

fn task() -> ScanTask {
  ScanTask::default().with_step(Duration::from_millis(100))
}

#[test]
fn single_scan_commits_focused_object() {
  let mut session = session(vec![vec![object(41, 0.8)]], 1);
  let output = Collect::default();

  task().run_task(frames(100), &mut session, &output).unwrap();

  assert_eq!(*output.labels.borrow(), vec!["Cup".to_string()]);
  assert!(!session.is_scanning());
  assert_eq!(session.registry().len(), 1);
  assert_eq!(session.tracker().anchor_count(), 2);
}

#[test]
fn alternating_detections_commit_once() {
  let frames_seq = vec![vec![object(41, 0.8)], vec![object(39, 0.9)]];
  let mut session = session(frames_seq, 0);
  let output = Collect::default();

  // 步长 125ms，3 秒恰好 24 帧，最后生效的是第 23 帧提交的回放帧 0
  ScanTask::default()
    .with_step(Duration::from_millis(125))
    .run_task(frames(100), &mut session, &output)
    .unwrap();

  assert_eq!(*output.labels.borrow(), vec!["Cup".to_string()]);
}

#[test]
fn repeated_scans_commit_each_time() {
  let mut session = session(vec![vec![object(41, 0.8)]], 2);
  let output = Collect::default();

  task()
    .with_scans(3)
    .run_task(frames(1000), &mut session, &output)
    .unwrap();

  assert_eq!(output.labels.borrow().len(), 3);
  assert_eq!(session.registry().len(), 3);
}

#[test]
fn empty_scene_commits_nothing() {
  let mut session = session(vec![vec![]], 0);
  let output = Collect::default();

  task().run_task(frames(100), &mut session, &output).unwrap();

  assert!(output.labels.borrow().is_empty());
  assert!(session.registry().is_empty());
}

#[test]
fn input_exhaustion_finishes_early() {
  let mut session = session(vec![vec![object(0, 0.7)]], 0);
  let output = Collect::default();

  // 3 秒的扫描只给 5 帧
  task().run_task(frames(5), &mut session, &output).unwrap();

  assert_eq!(*output.labels.borrow(), vec!["Person".to_string()]);
  assert!(!session.is_scanning());
}
