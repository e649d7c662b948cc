// 该文件是 Kanjian （看见） 项目的一部分。
// src/input/read_image_file.rs - 图像文件输入
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

use image::ImageReader;
use thiserror::Error;
use tracing::error;
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, frame::RgbNhwcFrame};

#[derive(Error, Debug)]
pub enum ImageFileInputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("图像加载错误: {0}")]
  ImageLoadError(#[from] image::ImageError),
  #[error("无效的帧数: {0}")]
  InvalidFrames(String),
}

/// 把一张静态图像当作相机画面反复输出
///
/// `image:///path/to/file.png?frames=90`，缺省 `frames` 时无限重复。
pub struct ImageFileInput {
  frame: RgbNhwcFrame,
  frames: Option<usize>,
}

impl FromUrlWithScheme for ImageFileInput {
  const SCHEME: &'static str = "image";
}

impl FromUrl for ImageFileInput {
  type Error = ImageFileInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI 方案不匹配: 期望 '{}'，实际 '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(ImageFileInputError::SchemeMismatch);
    }

    let mut frames = None;
    for (k, v) in url.query_pairs() {
      if k == "frames" {
        let n = v
          .parse::<usize>()
          .map_err(|_| ImageFileInputError::InvalidFrames(v.to_string()))?;
        frames = Some(n);
      }
    }

    let image = ImageReader::open(url.path())?.decode()?;
    Ok(ImageFileInput {
      frame: RgbNhwcFrame::from(image.into_rgb8()),
      frames,
    })
  }
}

impl ImageFileInput {
  pub fn new(frame: RgbNhwcFrame, frames: Option<usize>) -> Self {
    Self { frame, frames }
  }

  pub fn frame(&self) -> &RgbNhwcFrame {
    &self.frame
  }

  pub fn into_nhwc(self) -> ImageFileInputNhwc {
    ImageFileInputNhwc {
      remaining: self.frames,
      inner: self,
    }
  }
}

pub struct ImageFileInputNhwc {
  inner: ImageFileInput,
  remaining: Option<usize>,
}

impl Iterator for ImageFileInputNhwc {
  type Item = RgbNhwcFrame;

  fn next(&mut self) -> Option<Self::Item> {
    if let Some(remaining) = self.remaining.as_mut() {
      if *remaining == 0 {
        return None;
      }
      *remaining -= 1;
    }
    Some(self.inner.frame.clone())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::frame::AsNhwcFrame;

  #[test]
  fn loads_png_and_repeats() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("scene.png");
    image::RgbImage::from_pixel(4, 3, image::Rgb([10, 20, 30]))
      .save(&path)
      .unwrap();

    let url = Url::parse(&format!("image://{}?frames=2", path.display())).unwrap();
    let input = ImageFileInput::from_url(&url).unwrap();
    assert_eq!(input.frame().width(), 4);
    assert_eq!(input.frame().height(), 3);

    let frames: Vec<_> = input.into_nhwc().collect();
    assert_eq!(frames.len(), 2);
    assert_eq!(&frames[0].as_nhwc()[..3], &[10, 20, 30]);
  }

  #[test]
  fn bad_frame_count_is_rejected() {
    let url = Url::parse("image:///nonexistent.png?frames=many").unwrap();
    assert!(matches!(
      ImageFileInput::from_url(&url),
      Err(ImageFileInputError::InvalidFrames(_))
    ));
  }
}
