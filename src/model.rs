// 该文件是 Kanjian （看见） 项目的一部分。
// src/model.rs - 模型
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

pub trait Model {
  type Input;
  type Output;
  type Error;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error>;
}

/// 单个检测结果
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Detection {
  pub class_id: u32,
  pub score: f32,
  pub bbox: [f32; 4], // [y_min, x_min, y_max, x_max]，归一化坐标
}

/// 一次推理的全部检测结果，按分数降序排列
#[derive(Debug, Clone, Default)]
pub struct DetectResult {
  pub items: Box<[Detection]>,
}

impl DetectResult {
  pub fn new(items: Vec<Detection>) -> Self {
    Self {
      items: items.into_boxed_slice(),
    }
  }

  /// 推理引擎声明的检测总数
  pub fn num_detections(&self) -> usize {
    self.items.len()
  }

  /// 按分数降序稳定排序，分数相同时保持原有顺序
  pub fn sort_by_score(&mut self) {
    self
      .items
      .sort_by(|a, b| b.score.total_cmp(&a.score));
  }
}

#[cfg(feature = "onnx")]
mod onnx;
#[cfg(feature = "onnx")]
pub use self::onnx::{OnnxDetector, OnnxDetectorBuilder, OnnxError};
