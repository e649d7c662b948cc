// 该文件是 Kanjian （看见） 项目的一部分。
// src/frame.rs - NHWC 屏幕帧定义
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

use crate::geometry::ScreenSize;

const RGB_CHANNELS: usize = 3;

pub trait AsNhwcFrame {
  fn as_nhwc(&self) -> &[u8];
}

#[derive(Error, Debug)]
pub enum FrameError {
  #[error("数据长度不匹配: 期望长度 {expected}, 实际长度 {actual}")]
  LengthMismatch { expected: usize, actual: usize },
}

/// 屏幕捕获缓冲，RGB 交错排列
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RgbNhwcFrame {
  width: usize,
  height: usize,
  data: Box<[u8]>,
}

impl RgbNhwcFrame {
  pub fn with_shape(height: usize, width: usize) -> Self {
    let data = vec![0u8; RGB_CHANNELS * width * height].into_boxed_slice();
    Self {
      width,
      height,
      data,
    }
  }

  pub fn from_raw(height: usize, width: usize, data: Vec<u8>) -> Result<Self, FrameError> {
    let expected = RGB_CHANNELS * width * height;
    if data.len() != expected {
      return Err(FrameError::LengthMismatch {
        expected,
        actual: data.len(),
      });
    }

    Ok(Self {
      width,
      height,
      data: data.into_boxed_slice(),
    })
  }

  pub fn height(&self) -> usize {
    self.height
  }

  pub fn width(&self) -> usize {
    self.width
  }

  pub fn channels(&self) -> usize {
    RGB_CHANNELS
  }

  pub fn is_empty(&self) -> bool {
    self.data.is_empty()
  }

  pub fn screen_size(&self) -> ScreenSize {
    ScreenSize::new(self.width as u32, self.height as u32)
  }

  /// 将另一帧的内容复制进本缓冲，尺寸一致时复用已有内存
  pub fn copy_from(&mut self, other: &RgbNhwcFrame) {
    if self.data.len() == other.data.len() {
      self.data.copy_from_slice(&other.data);
      self.width = other.width;
      self.height = other.height;
    } else {
      self.clone_from(other);
    }
  }
}

impl AsMut<[u8]> for RgbNhwcFrame {
  fn as_mut(&mut self) -> &mut [u8] {
    &mut self.data
  }
}

impl AsNhwcFrame for RgbNhwcFrame {
  fn as_nhwc(&self) -> &[u8] {
    &self.data
  }
}

#[cfg(feature = "image")]
impl From<image::RgbImage> for RgbNhwcFrame {
  fn from(image: image::RgbImage) -> Self {
    let (width, height) = image.dimensions();
    Self {
      width: width as usize,
      height: height as usize,
      data: image.into_raw().into_boxed_slice(),
    }
  }
}

#[cfg(feature = "image")]
impl RgbNhwcFrame {
  pub fn to_rgb_image(&self) -> Option<image::RgbImage> {
    image::RgbImage::from_raw(self.width as u32, self.height as u32, self.data.to_vec())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn rejects_wrong_length() {
    let err = RgbNhwcFrame::from_raw(2, 2, vec![0; 5]).unwrap_err();
    assert!(matches!(
      err,
      FrameError::LengthMismatch {
        expected: 12,
        actual: 5
      }
    ));
  }

  #[test]
  fn copy_reuses_buffer_when_sizes_match() {
    let mut capture = RgbNhwcFrame::with_shape(2, 2);
    let source = RgbNhwcFrame::from_raw(2, 2, (0..12).collect()).unwrap();
    capture.copy_from(&source);
    assert_eq!(capture, source);

    let larger = RgbNhwcFrame::with_shape(4, 4);
    capture.copy_from(&larger);
    assert_eq!(capture.screen_size(), ScreenSize::new(4, 4));
  }
}
