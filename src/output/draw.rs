// 该文件是 Kanjian （看见） 项目的一部分。
// src/output/draw.rs - 检测框绘制
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

use image::{Rgb, RgbImage, imageops};
use imageproc::{drawing::draw_hollow_rect_mut, rect::Rect};

const BOX_COLOR: [u8; 3] = [255, 0, 0]; // 红色

/// 按置信度绘制边框，置信度越高线条越粗
#[derive(Debug, Clone)]
pub struct BoxPainter {
  color: [u8; 3],
}

impl Default for BoxPainter {
  fn default() -> Self {
    Self { color: BOX_COLOR }
  }
}

impl BoxPainter {
  /// 线宽 = trunc(score * 10) - 4，至少 1 像素
  pub fn thickness_for(score: f32) -> u32 {
    let width = (score * 10.0) as i32 - 4;
    width.max(1) as u32
  }

  /// 在图像上绘制一个矩形边框，bbox 为归一化坐标 [y_min, x_min, y_max, x_max]
  pub fn draw_box(&self, image: &mut RgbImage, bbox: &[f32; 4], score: f32) {
    let (w, h) = (image.width() as f32, image.height() as f32);
    if w < 1.0 || h < 1.0 {
      return;
    }

    let y_min = ((bbox[0] * h).floor() as i32).clamp(0, h as i32 - 1);
    let x_min = ((bbox[1] * w).floor() as i32).clamp(0, w as i32 - 1);
    let y_max = ((bbox[2] * h).ceil() as i32).clamp(0, h as i32 - 1);
    let x_max = ((bbox[3] * w).ceil() as i32).clamp(0, w as i32 - 1);

    if x_min > x_max || y_min > y_max {
      return;
    }

    // 由外向内逐圈加粗
    for inset in 0..Self::thickness_for(score) as i32 {
      let (left, top) = (x_min + inset, y_min + inset);
      let (right, bottom) = (x_max - inset, y_max - inset);
      if left > right || top > bottom {
        break;
      }
      let rect =
        Rect::at(left, top).of_size((right - left + 1) as u32, (bottom - top + 1) as u32);
      draw_hollow_rect_mut(image, rect, Rgb(self.color));
    }
  }
}

/// 等比缩小到 `max_size` 以内，不放大；`max_size` 为 0 时保持原样
pub fn fit_within(image: &RgbImage, max_size: u32) -> RgbImage {
  let (width, height) = image.dimensions();
  if max_size == 0 || (width <= max_size && height <= max_size) {
    return image.clone();
  }

  let ratio = (max_size as f64 / width as f64).min(max_size as f64 / height as f64);
  let new_width = ((width as f64 * ratio).round() as u32).clamp(1, max_size);
  let new_height = ((height as f64 * ratio).round() as u32).clamp(1, max_size);
  imageops::thumbnail(image, new_width, new_height)
}
