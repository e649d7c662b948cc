// 该文件是 Kanjian （看见） 项目的一部分。
// src/input.rs - 相机画面输入
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

use crate::{FromUrl, FromUrlWithScheme, frame::RgbNhwcFrame};

#[cfg(feature = "read_image_file")]
mod read_image_file;
#[cfg(feature = "read_image_file")]
pub use self::read_image_file::{ImageFileInput, ImageFileInputError, ImageFileInputNhwc};

#[derive(Error, Debug)]
pub enum InputError {
  #[cfg(feature = "read_image_file")]
  #[error("图像文件输入错误: {0}")]
  ImageFileInputError(#[from] ImageFileInputError),
  #[error("无效的参数 {name}: {value}")]
  InvalidParameter { name: String, value: String },
  #[error("URI 方案不匹配")]
  SchemeMismatch,
}

/// 纯色画面，`blank://?width=640&height=480&frames=90`
///
/// 回放后端不读取像素，无需真实图像即可演示。
pub struct BlankInput {
  width: usize,
  height: usize,
  frames: Option<usize>,
}

impl FromUrlWithScheme for BlankInput {
  const SCHEME: &'static str = "blank";
}

impl FromUrl for BlankInput {
  type Error = InputError;

  fn from_url(url: &url::Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(InputError::SchemeMismatch);
    }

    let mut input = BlankInput {
      width: 640,
      height: 480,
      frames: None,
    };
    for (k, v) in url.query_pairs() {
      let parsed = v.parse::<usize>().map_err(|_| InputError::InvalidParameter {
        name: k.to_string(),
        value: v.to_string(),
      });
      match k.as_ref() {
        "width" => input.width = parsed?,
        "height" => input.height = parsed?,
        "frames" => input.frames = Some(parsed?),
        _ => {}
      }
    }
    Ok(input)
  }
}

impl BlankInput {
  pub fn into_nhwc(self) -> BlankInputNhwc {
    BlankInputNhwc {
      frame: RgbNhwcFrame::with_shape(self.height, self.width),
      remaining: self.frames,
    }
  }
}

pub struct BlankInputNhwc {
  frame: RgbNhwcFrame,
  remaining: Option<usize>,
}

impl Iterator for BlankInputNhwc {
  type Item = RgbNhwcFrame;

  fn next(&mut self) -> Option<Self::Item> {
    if let Some(remaining) = self.remaining.as_mut() {
      if *remaining == 0 {
        return None;
      }
      *remaining -= 1;
    }
    Some(self.frame.clone())
  }
}

pub enum InputWrapper {
  Blank(BlankInput),
  #[cfg(feature = "read_image_file")]
  ReadImageFile(ImageFileInput),
}

impl FromUrl for InputWrapper {
  type Error = InputError;

  fn from_url(url: &url::Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      BlankInput::SCHEME => Ok(InputWrapper::Blank(BlankInput::from_url(url)?)),
      #[cfg(feature = "read_image_file")]
      ImageFileInput::SCHEME => Ok(InputWrapper::ReadImageFile(ImageFileInput::from_url(
        url,
      )?)),
      _ => Err(InputError::SchemeMismatch),
    }
  }
}

impl InputWrapper {
  pub fn into_nhwc(self) -> InputWrapperNhwcIter {
    match self {
      InputWrapper::Blank(input) => InputWrapperNhwcIter::Blank(input.into_nhwc()),
      #[cfg(feature = "read_image_file")]
      InputWrapper::ReadImageFile(input) => InputWrapperNhwcIter::ReadImageFile(input.into_nhwc()),
    }
  }
}

pub enum InputWrapperNhwcIter {
  Blank(BlankInputNhwc),
  #[cfg(feature = "read_image_file")]
  ReadImageFile(ImageFileInputNhwc),
}

impl Iterator for InputWrapperNhwcIter {
  type Item = RgbNhwcFrame;

  fn next(&mut self) -> Option<Self::Item> {
    match self {
      InputWrapperNhwcIter::Blank(input) => input.next(),
      #[cfg(feature = "read_image_file")]
      InputWrapperNhwcIter::ReadImageFile(input) => input.next(),
    }
  }
}
