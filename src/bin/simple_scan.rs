// 该文件是 Kanjian （看见） 项目的一部分。
// src/bin/simple_scan.rs - 扫描与锚定演示
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

use std::{path::PathBuf, time::Duration};

use anyhow::Result;
use clap::Parser;
use nalgebra::UnitQuaternion;
use tracing::info;
use url::Url;

use kanjian::{
  FromUrl,
  config::ScanConfig,
  geometry::{CameraOptics, Pose, Vec3},
  input::InputWrapper,
  model::ReplayBackend,
  output::OutputWrapper,
  session::ScanController,
  task::{ScanTask, Task},
  tracking::FloorPlaneTracker,
};

/// Kanjian 扫描演示参数
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 推理后端，例如 replay:///path/to/fixture.json?latency=2
  #[arg(long, value_name = "MODEL")]
  pub model: Url,
  /// 输入来源，例如 image:///path/to/scene.png 或 blank://?width=640&height=480
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 输出，例如 folder:///tmp/kanjian 或 log://
  #[arg(long, value_name = "OUTPUT", default_value = "log://")]
  pub output: Url,
  /// JSON 配置文件
  #[arg(long, value_name = "FILE")]
  pub config: Option<PathBuf>,
  /// 垂直视场角（度），覆盖配置文件
  #[arg(long, value_name = "DEGREES")]
  pub fov: Option<f32>,
  /// 模拟地面高度；缺省时没有平面，只使用相机前方回退位置
  #[arg(long, value_name = "Y", allow_negative_numbers = true)]
  pub floor: Option<f32>,
  /// 相机高度（米）
  #[arg(long, default_value = "1.5", value_name = "METERS")]
  pub camera_height: f32,
  /// 相机俯角（度）
  #[arg(long, default_value = "45", value_name = "DEGREES")]
  pub pitch: f32,
  /// 连续扫描次数
  #[arg(long, default_value = "1", value_name = "COUNT")]
  pub scans: usize,
  /// 帧率
  #[arg(long, default_value = "30", value_name = "FPS")]
  pub fps: f32,
  /// 按真实时间运行
  #[arg(long)]
  pub realtime: bool,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("推理后端: {}", args.model);
  info!("输入来源: {}", args.input);
  info!("输出: {}", args.output);

  let mut config = match &args.config {
    Some(path) => ScanConfig::from_json_file(path)?,
    None => ScanConfig::default(),
  };
  if let Some(fov) = args.fov {
    config.fov_y_degrees = fov;
  }
  config.validate()?;

  if !(args.fps.is_finite() && args.fps > 0.0) {
    anyhow::bail!("无效的帧率: {}", args.fps);
  }

  let backend = ReplayBackend::from_url(&args.model)?;
  let output = OutputWrapper::from_url(&args.output)?;
  let mut frames = InputWrapper::from_url(&args.input)?.into_nhwc().peekable();
  let screen = frames
    .peek()
    .map(|frame| frame.screen_size())
    .ok_or_else(|| anyhow::anyhow!("没有输入帧"))?;
  info!("画面尺寸: {}x{}", screen.width, screen.height);

  let rotation = UnitQuaternion::from_axis_angle(&Vec3::x_axis(), args.pitch.to_radians());
  let tracker = FloorPlaneTracker::new(
    Pose::new(Vec3::new(0.0, args.camera_height, 0.0), rotation),
    CameraOptics::new(config.fov_y_degrees, screen.aspect()),
    screen,
  )
  .with_floor(args.floor);

  let mut session = ScanController::new(config, screen, backend, tracker);

  ScanTask::default()
    .with_step(Duration::from_secs_f32(1.0 / args.fps))
    .with_realtime(args.realtime)
    .with_scans(args.scans)
    .with_ctrlc()?
    .run_task(frames, &mut session, output)?;

  for entity in session.registry().iter() {
    info!(
      "{:?}: {} ({:.0}%)",
      entity.anchor,
      entity.label,
      entity.confidence * 100.0
    );
  }

  Ok(())
}
