// 该文件是 Kanjian （看见） 项目的一部分。
// src/task.rs - 单次检测任务
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

use std::path::Path;
use std::time::Instant;

use image::RgbImage;
use thiserror::Error;
use tracing::info;

use crate::{
  aggregate::{AggregateError, Aggregation, Aggregator},
  input::{InputError, read_rgb_image},
  label::LabelMap,
  model::{DetectResult, Model},
  threshold::Threshold,
};

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Error, Debug)]
pub enum TaskError {
  #[error("输入错误: {0}")]
  Input(#[from] InputError),
  #[error("推理错误: {0}")]
  Inference(#[source] BoxError),
  #[error(transparent)]
  Aggregate(#[from] AggregateError),
}

/// 解码、推理、汇总的完整流程
pub struct DetectTask<M> {
  model: M,
  labels: LabelMap,
  aggregator: Aggregator,
}

impl<M> DetectTask<M>
where
  M: Model<Input = RgbImage, Output = DetectResult>,
  M::Error: std::error::Error + Send + Sync + 'static,
{
  pub fn new(model: M, labels: LabelMap, aggregator: Aggregator) -> Self {
    Self {
      model,
      labels,
      aggregator,
    }
  }

  pub fn model(&self) -> &M {
    &self.model
  }

  pub fn run(&self, image: &RgbImage, threshold: Threshold) -> Result<Aggregation, TaskError> {
    info!("开始推理, 阈值 {}", threshold);
    let now = Instant::now();
    let result = self
      .model
      .infer(image)
      .map_err(|e| TaskError::Inference(Box::new(e)))?;
    info!(
      "推理完成，耗时: {:.2?}, 共 {} 个候选",
      now.elapsed(),
      result.num_detections()
    );

    let now = Instant::now();
    let aggregation = self
      .aggregator
      .aggregate(image, &result.items, threshold, &self.labels)?;
    info!(
      "汇总完成，耗时: {:.2?}, {} 个检测, {} 个类别",
      now.elapsed(),
      aggregation.qualifying,
      aggregation.classes().len()
    );

    Ok(aggregation)
  }

  /// 读取图片文件后执行检测；无法解码时在推理之前返回错误
  pub fn run_file(
    &self,
    path: impl AsRef<Path>,
    threshold: Threshold,
  ) -> Result<Aggregation, TaskError> {
    let image = read_rgb_image(path)?;
    self.run(&image, threshold)
  }
}

#[cfg(test)]
pub(crate) mod tests {
  use std::sync::atomic::{AtomicUsize, Ordering};

  use super::*;
  use crate::{
    label::LabelEntry,
    model::Detection,
  };

  #[derive(Error, Debug)]
  #[error("stub failure")]
  pub struct StubError;

  /// 返回固定结果的模型
  pub struct StubModel {
    pub detections: Vec<Detection>,
    pub fail: bool,
    pub calls: AtomicUsize,
  }

  impl StubModel {
    pub fn new(detections: Vec<Detection>) -> Self {
      Self {
        detections,
        fail: false,
        calls: AtomicUsize::new(0),
      }
    }
  }

  impl Model for StubModel {
    type Input = RgbImage;
    type Output = DetectResult;
    type Error = StubError;

    fn infer(&self, _input: &Self::Input) -> Result<Self::Output, Self::Error> {
      self.calls.fetch_add(1, Ordering::SeqCst);
      if self.fail {
        return Err(StubError);
      }
      Ok(DetectResult::new(self.detections.clone()))
    }
  }

  pub fn stub_labels() -> LabelMap {
    LabelMap::from_entries([(
      1,
      LabelEntry {
        name: "button".to_string(),
        description: Some("clickable".to_string()),
      },
    )])
  }

  pub fn stub_detections() -> Vec<Detection> {
    vec![
      Detection {
        class_id: 1,
        score: 0.9,
        bbox: [0.1, 0.1, 0.5, 0.5],
      },
      Detection {
        class_id: 1,
        score: 0.4,
        bbox: [0.5, 0.5, 0.9, 0.9],
      },
    ]
  }

  #[test]
  fn run_applies_threshold_snapshot() {
    let task = DetectTask::new(
      StubModel::new(stub_detections()),
      stub_labels(),
      Aggregator::default(),
    );
    let image = RgbImage::new(16, 16);

    let strict = task.run(&image, Threshold::new(0.5).unwrap()).unwrap();
    assert_eq!(strict.qualifying, 1);
    let loose = task.run(&image, Threshold::new(0.3).unwrap()).unwrap();
    assert_eq!(loose.qualifying, 2);
    assert_eq!(loose.categories.len(), 2);
  }

  #[test]
  fn inference_failure_is_reported() {
    let mut model = StubModel::new(vec![]);
    model.fail = true;
    let task = DetectTask::new(model, stub_labels(), Aggregator::default());
    let result = task.run(&RgbImage::new(4, 4), Threshold::default());
    assert!(matches!(result, Err(TaskError::Inference(_))));
  }

  #[test]
  fn undecodable_file_fails_before_inference() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken");
    std::fs::write(&path, b"\x00\x01garbage").unwrap();

    let task = DetectTask::new(StubModel::new(vec![]), stub_labels(), Aggregator::default());
    let result = task.run_file(&path, Threshold::default());
    assert!(matches!(result, Err(TaskError::Input(_))));
    assert_eq!(task.model.calls.load(Ordering::SeqCst), 0);
  }
}
