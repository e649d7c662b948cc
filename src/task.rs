// 该文件是 Kanjian （看见） 项目的一部分。
// src/task.rs - 扫描任务
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

use std::{
  sync::mpsc::{Receiver, channel},
  thread,
  time::{Duration, Instant},
};

use tracing::{debug, info, warn};

use crate::{
  anchor::AnchoredEntity,
  frame::RgbNhwcFrame,
  model::InferenceBackend,
  output::Render,
  session::ScanController,
  tracking::{AnchorHandle, SpatialTracker},
};

pub trait Task<I, S, O>: Sized {
  type Error;
  fn run_task(self, input: I, session: S, output: O) -> Result<(), Self::Error>;
}

/// 逐帧驱动扫描会话，每次锚定后交给输出
#[derive(Debug)]
pub struct ScanTask {
  step: Duration,
  realtime: bool,
  scans: usize,
  interrupt: Option<Receiver<()>>,
}

impl Default for ScanTask {
  fn default() -> Self {
    Self {
      step: Duration::from_secs_f32(1.0 / 30.0),
      realtime: false,
      scans: 1,
      interrupt: None,
    }
  }
}

impl ScanTask {
  /// 每帧推进的时间
  pub fn with_step(mut self, step: Duration) -> Self {
    self.step = step;
    self
  }

  /// 按真实时间推进，并把帧率限制在 `step` 以内
  pub fn with_realtime(mut self, realtime: bool) -> Self {
    self.realtime = realtime;
    self
  }

  /// 连续扫描的次数
  pub fn with_scans(mut self, scans: usize) -> Self {
    self.scans = scans.max(1);
    self
  }

  /// 注册 Ctrl-C 处理，收到信号后中止当前扫描并退出
  pub fn with_ctrlc(mut self) -> Result<Self, ctrlc::Error> {
    let (tx, rx) = channel();
    ctrlc::set_handler(move || {
      info!("收到中断信号，准备退出...");
      let _ = tx.send(());
      thread::spawn(|| {
        thread::sleep(Duration::from_secs(30));
        warn!("强制退出程序");
        std::process::exit(1);
      });
    })?;
    self.interrupt = Some(rx);
    Ok(self)
  }

  fn interrupted(&self) -> bool {
    self
      .interrupt
      .as_ref()
      .is_some_and(|rx| rx.try_recv().is_ok())
  }
}

fn render_commit<B, T, O, RE>(
  session: &ScanController<B, T>,
  handle: AnchorHandle,
  output: &O,
) -> anyhow::Result<()>
where
  B: InferenceBackend<Frame = RgbNhwcFrame>,
  T: SpatialTracker,
  O: Render<AnchoredEntity, Error = RE>,
  RE: std::error::Error + Send + Sync + 'static,
{
  let entity = session
    .entity(handle)
    .ok_or_else(|| anyhow::anyhow!("锚点 {:?} 不存在", handle))?;
  output.render_result(entity)?;
  Ok(())
}

impl<'s, I, B, T, O, RE> Task<I, &'s mut ScanController<B, T>, O> for ScanTask
where
  I: Iterator<Item = RgbNhwcFrame>,
  B: InferenceBackend<Frame = RgbNhwcFrame>,
  T: SpatialTracker,
  O: Render<AnchoredEntity, Error = RE>,
  RE: std::error::Error + Send + Sync + 'static,
{
  type Error = anyhow::Error;

  fn run_task(
    self,
    input: I,
    session: &'s mut ScanController<B, T>,
    output: O,
  ) -> Result<(), Self::Error> {
    info!("开始任务，计划扫描 {} 次", self.scans);
    session.begin_scan();

    let mut completed = 0;
    let mut frame_index = 0usize;
    let mut last = Instant::now();

    for frame in input {
      frame_index = frame_index.wrapping_add(1);

      if self.realtime {
        let spent = last.elapsed();
        if spent < self.step {
          thread::sleep(self.step - spent);
        }
      }
      let elapsed = if self.realtime {
        last.elapsed()
      } else {
        self.step
      };
      last = Instant::now();

      let report = session.tick(elapsed.as_secs_f32(), &frame);
      if let Some(outcome) = report.outcome {
        debug!("第 {} 帧: {:?}", frame_index, outcome);
      }

      if report.finished {
        completed += 1;
        match report.committed {
          Some(handle) => render_commit(session, handle, &output)?,
          None => info!("本次扫描没有可锚定的物体"),
        }
        if completed >= self.scans {
          break;
        }
        session.begin_scan();
      }

      if self.interrupted() {
        warn!("中断信号接收，中止扫描");
        session.abort();
        break;
      }
    }

    if session.is_scanning() {
      info!("输入结束，提前结束扫描");
      if let Some(handle) = session.finish() {
        render_commit(session, handle, &output)?;
      }
    }

    info!(
      "任务完成，共处理 {} 帧，锚定 {} 个物体",
      frame_index,
      session.registry().len()
    );
    Ok(())
  }
}
