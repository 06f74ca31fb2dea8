// 该文件是 Kanjian （看见） 项目的一部分。
// src/input.rs - 图像输入
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

use std::path::{Path, PathBuf};

use image::{ImageReader, RgbImage};
use thiserror::Error;
use tracing::error;
use url::Url;

use crate::{FromUrl, FromUrlWithScheme};

/// 允许上传的图片扩展名（不区分大小写）
pub const ALLOWED_EXTENSIONS: [&str; 3] = ["jpeg", "jpg", "png"];

#[derive(Error, Debug)]
pub enum InputError {
  #[error("URI 方案不匹配: 期望 '{expected}', 实际 '{found}'")]
  SchemeMismatch { expected: &'static str, found: String },
  #[error("不支持的文件扩展名: {0:?}, 仅支持 jpg, jpeg, png")]
  UnsupportedExtension(String),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("图像解码错误: {0}")]
  ImageLoadError(#[from] image::ImageError),
}

/// 判断文件名的扩展名（最后一个 `.` 之后的部分）是否在允许列表中
pub fn is_allowed_extension(filename: &str) -> bool {
  filename
    .rsplit_once('.')
    .map(|(_, ext)| ext.to_ascii_lowercase())
    .is_some_and(|ext| ALLOWED_EXTENSIONS.contains(&ext.as_str()))
}

/// 校验上传文件名，失败时返回 `UnsupportedExtension`
pub fn check_upload_name(filename: &str) -> Result<(), InputError> {
  if is_allowed_extension(filename) {
    Ok(())
  } else {
    Err(InputError::UnsupportedExtension(filename.to_string()))
  }
}

/// 读取并解码一张图片，格式由文件内容推断
pub fn read_rgb_image(path: impl AsRef<Path>) -> Result<RgbImage, InputError> {
  let image = ImageReader::open(path.as_ref())?
    .with_guessed_format()?
    .decode()?;
  Ok(image.to_rgb8())
}

/// 图片文件输入，URL 形如 `image:///path/to/photo.jpg`
pub struct ImageFileInput {
  path: PathBuf,
  image: RgbImage,
}

impl FromUrlWithScheme for ImageFileInput {
  const SCHEME: &'static str = "image";
}

impl FromUrl for ImageFileInput {
  type Error = InputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(InputError::SchemeMismatch {
        expected: Self::SCHEME,
        found: url.scheme().to_string(),
      });
    }

    Self::open(url.path())
  }
}

impl ImageFileInput {
  pub fn open(path: impl Into<PathBuf>) -> Result<Self, InputError> {
    let path = path.into();
    let image = read_rgb_image(&path)?;
    Ok(Self { path, image })
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  pub fn image(&self) -> &RgbImage {
    &self.image
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn extension_allow_list_is_case_insensitive() {
    assert!(is_allowed_extension("photo.jpg"));
    assert!(is_allowed_extension("photo.JPEG"));
    assert!(is_allowed_extension("archive.tar.Png"));
    assert!(!is_allowed_extension("animation.gif"));
    assert!(!is_allowed_extension("png"));
    assert!(!is_allowed_extension("photo.jpg.exe"));
    assert!(matches!(
      check_upload_name("animation.gif"),
      Err(InputError::UnsupportedExtension(_))
    ));
  }

  #[test]
  fn reads_image_without_extension_by_content() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("upload");
    let mut image = RgbImage::new(4, 3);
    image.put_pixel(1, 1, image::Rgb([10, 20, 30]));
    image
      .save_with_format(&path, image::ImageFormat::Png)
      .unwrap();

    let decoded = read_rgb_image(&path).unwrap();
    assert_eq!(decoded, image);
  }

  #[test]
  fn undecodable_bytes_are_an_input_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.png");
    std::fs::write(&path, b"definitely not a png").unwrap();
    assert!(ImageFileInput::open(&path).is_err());
  }

  #[test]
  fn rejects_foreign_scheme() {
    let url = Url::parse("folder:///tmp/out").unwrap();
    assert!(matches!(
      ImageFileInput::from_url(&url),
      Err(InputError::SchemeMismatch { .. })
    ));
  }
}
