// 该文件是 Kanjian （看见） 项目的一部分。
// src/output/encode.rs - PNG 编码与 data URI
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

use base64::{Engine as _, engine::general_purpose::STANDARD};
use image::{ExtendedColorType, ImageEncoder, ImageFormat, RgbImage, codecs::png::PngEncoder};
use thiserror::Error;

pub const PNG_DATA_URI_PREFIX: &str = "data:image/png;base64,";

#[derive(Error, Debug)]
pub enum EncodeError {
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("不是 PNG data URI")]
  NotPngDataUri,
  #[error("base64 解码错误: {0}")]
  Base64Error(#[from] base64::DecodeError),
}

/// PNG 编码后的图像
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage(Vec<u8>);

impl EncodedImage {
  pub fn encode(image: &RgbImage) -> Result<Self, EncodeError> {
    let mut buffer = Vec::new();
    PngEncoder::new(&mut buffer).write_image(
      image.as_raw(),
      image.width(),
      image.height(),
      ExtendedColorType::Rgb8,
    )?;
    Ok(Self(buffer))
  }

  pub fn as_bytes(&self) -> &[u8] {
    &self.0
  }

  pub fn to_data_uri(&self) -> String {
    format!("{}{}", PNG_DATA_URI_PREFIX, STANDARD.encode(&self.0))
  }

  pub fn decode(&self) -> Result<RgbImage, EncodeError> {
    let image = image::load_from_memory_with_format(&self.0, ImageFormat::Png)?;
    Ok(image.to_rgb8())
  }
}

/// 解析 `data:image/png;base64,` 形式的字符串
pub fn decode_data_uri(uri: &str) -> Result<RgbImage, EncodeError> {
  let payload = uri
    .strip_prefix(PNG_DATA_URI_PREFIX)
    .ok_or(EncodeError::NotPngDataUri)?;
  EncodedImage(STANDARD.decode(payload)?).decode()
}
