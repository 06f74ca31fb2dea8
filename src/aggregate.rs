// 该文件是 Kanjian （看见） 项目的一部分。
// src/aggregate.rs - 按类别汇总检测结果
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

use image::RgbImage;
use thiserror::Error;
use tracing::debug;

use crate::{
  label::{LabelEntry, LabelMap},
  model::Detection,
  output::{
    draw::{BoxPainter, fit_within},
    encode::{EncodeError, EncodedImage},
  },
  threshold::Threshold,
};

/// 原图类别的名称
pub const ORIGINAL_CATEGORY: &str = "original";

/// 默认显示尺寸，与常见检测模型输入一致
pub const DEFAULT_DISPLAY_SIZE: u32 = 640;

#[derive(Error, Debug)]
pub enum AggregateError {
  #[error("标签映射中不存在类别 id {0}")]
  Lookup(u32),
  #[error("图像编码错误: {0}")]
  Encode(#[from] EncodeError),
}

/// 一个可显示的结果分组：原图或某一类别的标注图
#[derive(Debug, Clone, PartialEq)]
pub struct Category {
  pub name: String,
  pub image: EncodedImage,
  pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Aggregation {
  /// 第一个总是原图，其余按类别首次出现的顺序排列
  pub categories: Vec<Category>,
  /// 分数不低于阈值的检测数量，按检测计数而非按类别
  pub qualifying: usize,
}

impl Aggregation {
  pub fn original(&self) -> &Category {
    &self.categories[0]
  }

  pub fn classes(&self) -> &[Category] {
    &self.categories[1..]
  }
}

struct Working<'a> {
  class_id: u32,
  label: &'a LabelEntry,
  image: RgbImage,
}

#[derive(Debug, Clone)]
pub struct Aggregator {
  painter: BoxPainter,
  display_size: u32,
}

impl Default for Aggregator {
  fn default() -> Self {
    Self {
      painter: BoxPainter::default(),
      display_size: DEFAULT_DISPLAY_SIZE,
    }
  }
}

impl Aggregator {
  pub fn new(painter: BoxPainter, display_size: u32) -> Self {
    Self {
      painter,
      display_size,
    }
  }

  /// 按类别分组并过滤检测结果
  ///
  /// 每个检测独立判断，不因分数排序而提前结束。未知类别 id 直接返回错误，
  /// 不产生部分结果。
  pub fn aggregate(
    &self,
    source: &RgbImage,
    detections: &[Detection],
    threshold: Threshold,
    labels: &LabelMap,
  ) -> Result<Aggregation, AggregateError> {
    let image = fit_within(source, self.display_size);

    let mut working: Vec<Working<'_>> = Vec::new();
    let mut qualifying = 0usize;

    for detection in detections {
      if !threshold.admits(detection.score) {
        continue;
      }
      qualifying += 1;

      let index = match working
        .iter()
        .position(|w| w.class_id == detection.class_id)
      {
        Some(index) => index,
        None => {
          let label = labels
            .get(detection.class_id)
            .ok_or(AggregateError::Lookup(detection.class_id))?;
          working.push(Working {
            class_id: detection.class_id,
            label,
            image: image.clone(),
          });
          working.len() - 1
        }
      };

      debug!(
        "类别 {} 分数 {:.3} 边框 {:?}",
        detection.class_id, detection.score, detection.bbox
      );
      self
        .painter
        .draw_box(&mut working[index].image, &detection.bbox, detection.score);
    }

    let mut categories = Vec::with_capacity(working.len() + 1);
    categories.push(Category {
      name: ORIGINAL_CATEGORY.to_string(),
      image: EncodedImage::encode(&image)?,
      description: None,
    });
    for Working { label, image, .. } in working {
      categories.push(Category {
        name: label.name.clone(),
        image: EncodedImage::encode(&image)?,
        description: label.description.clone(),
      });
    }

    Ok(Aggregation {
      categories,
      qualifying,
    })
  }
}
