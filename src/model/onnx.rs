// 该文件是 Kanjian （看见） 项目的一部分。
// src/model/onnx.rs - ONNX Runtime 目标检测模型
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
use std::sync::Mutex;

use image::RgbImage;
use ndarray::Array4;
use ort::session::{Session, builder::GraphOptimizationLevel};
use ort::value::{DynValue, Tensor};
use thiserror::Error;
use tracing::{debug, error, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  model::{DetectResult, Detection, Model},
};

const ONNX_SCHEME: &str = "onnx";
const ONNX_MODEL_FILE: &str = "model.onnx";

const DEFAULT_INPUT_NAME: &str = "input_tensor";
const DEFAULT_BOXES_NAME: &str = "detection_boxes";
const DEFAULT_SCORES_NAME: &str = "detection_scores";
const DEFAULT_CLASSES_NAME: &str = "detection_classes";
const DEFAULT_NUM_DETECTIONS_NAME: &str = "num_detections";

#[derive(Error, Debug)]
pub enum OnnxError {
  #[error("模型文件不存在: {0}")]
  ModelNotFound(PathBuf),
  #[error("模型路径错误: {0}")]
  ModelPathError(String),
  #[error("ONNX Runtime 错误: {0}")]
  OrtError(#[from] ort::Error),
  #[error("张量形状错误: {0}")]
  ShapeError(#[from] ndarray::ShapeError),
  #[error("模型缺少输出: {0}")]
  MissingOutput(String),
  #[error("模型输出无效: {0}")]
  InvalidOutput(String),
  #[error("推理会话锁已损坏")]
  SessionPoisoned,
}

/// TensorFlow 目标检测模型导出为 ONNX 后的输出张量名称
#[derive(Debug, Clone)]
struct OutputNames {
  boxes: String,
  scores: String,
  classes: String,
  num_detections: String,
}

impl Default for OutputNames {
  fn default() -> Self {
    Self {
      boxes: DEFAULT_BOXES_NAME.to_string(),
      scores: DEFAULT_SCORES_NAME.to_string(),
      classes: DEFAULT_CLASSES_NAME.to_string(),
      num_detections: DEFAULT_NUM_DETECTIONS_NAME.to_string(),
    }
  }
}

pub struct OnnxDetector {
  session: Mutex<Session>,
  input_name: String,
  outputs: OutputNames,
}

pub struct OnnxDetectorBuilder {
  model_path: PathBuf,
  input_name: String,
  outputs: OutputNames,
  intra_threads: Option<usize>,
}

impl FromUrlWithScheme for OnnxDetectorBuilder {
  const SCHEME: &'static str = ONNX_SCHEME;
}

impl FromUrl for OnnxDetectorBuilder {
  type Error = OnnxError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(OnnxError::ModelPathError(format!(
        "模型路径必须使用 {} 方案, 实际为 {}",
        Self::SCHEME,
        url.scheme()
      )));
    }

    Ok(Self::new(url.path()))
  }
}

impl OnnxDetectorBuilder {
  pub fn new(model_path: impl Into<PathBuf>) -> Self {
    Self {
      model_path: model_path.into(),
      input_name: DEFAULT_INPUT_NAME.to_string(),
      outputs: OutputNames::default(),
      intra_threads: None,
    }
  }

  /// 从模型目录加载，目录中需包含 `model.onnx`
  pub fn from_model_dir(dir: impl AsRef<Path>) -> Result<Self, OnnxError> {
    let dir = dir.as_ref();
    if !dir.is_dir() {
      error!("模型目录不存在: {}", dir.display());
      return Err(OnnxError::ModelNotFound(dir.to_path_buf()));
    }
    Ok(Self::new(dir.join(ONNX_MODEL_FILE)))
  }

  pub fn input_name(mut self, name: impl Into<String>) -> Self {
    self.input_name = name.into();
    self
  }

  pub fn intra_threads(mut self, threads: usize) -> Self {
    self.intra_threads = Some(threads);
    self
  }

  pub fn build(self) -> Result<OnnxDetector, OnnxError> {
    if !self.model_path.is_file() {
      error!("模型文件不存在: {}", self.model_path.display());
      return Err(OnnxError::ModelNotFound(self.model_path));
    }

    info!("加载模型文件: {}", self.model_path.display());
    let mut builder = Session::builder()?.with_optimization_level(GraphOptimizationLevel::Level3)?;
    if let Some(threads) = self.intra_threads {
      builder = builder.with_intra_threads(threads)?;
    }
    let session = builder.commit_from_file(&self.model_path)?;

    for input in session.inputs.iter() {
      debug!("模型输入: {} {:?}", input.name, input.input_type);
    }
    for output in session.outputs.iter() {
      debug!("模型输出: {} {:?}", output.name, output.output_type);
    }
    info!("模型加载完成");

    Ok(OnnxDetector {
      session: Mutex::new(session),
      input_name: self.input_name,
      outputs: self.outputs,
    })
  }
}

/// 读取浮点输出；部分导出模型的类别张量为 int64
fn extract_f32(value: &DynValue) -> Result<Vec<f32>, OnnxError> {
  if let Ok(view) = value.try_extract_tensor::<f32>() {
    return Ok(view.iter().copied().collect());
  }
  let view = value.try_extract_tensor::<i64>()?;
  Ok(view.iter().map(|&v| v as f32).collect())
}

impl OnnxDetector {
  fn to_input_tensor(image: &RgbImage) -> Result<Array4<u8>, OnnxError> {
    let (width, height) = image.dimensions();
    let array = Array4::from_shape_vec(
      (1, height as usize, width as usize, 3),
      image.as_raw().clone(),
    )?;
    Ok(array)
  }

  fn postprocess(
    boxes: &[f32],
    scores: &[f32],
    classes: &[f32],
    num_detections: usize,
  ) -> Result<DetectResult, OnnxError> {
    let available = scores.len().min(classes.len()).min(boxes.len() / 4);
    if num_detections > available {
      return Err(OnnxError::InvalidOutput(format!(
        "声明的检测数 {} 超过输出长度 {}",
        num_detections, available
      )));
    }

    let items = (0..num_detections)
      .map(|i| {
        let b = &boxes[i * 4..i * 4 + 4];
        Detection {
          class_id: classes[i].round().max(0.0) as u32,
          score: scores[i],
          bbox: [
            b[0].clamp(0.0, 1.0),
            b[1].clamp(0.0, 1.0),
            b[2].clamp(0.0, 1.0),
            b[3].clamp(0.0, 1.0),
          ],
        }
      })
      .collect();

    let mut result = DetectResult::new(items);
    result.sort_by_score();
    Ok(result)
  }
}

impl Model for OnnxDetector {
  type Input = RgbImage;
  type Output = DetectResult;
  type Error = OnnxError;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    debug!("设置模型输入: {}x{}", input.width(), input.height());
    let tensor = Tensor::from_array(Self::to_input_tensor(input)?)?;

    let session = self.session.lock().map_err(|_| OnnxError::SessionPoisoned)?;
    debug!("执行模型推理");
    let outputs = session.run(ort::inputs![self.input_name.as_str() => tensor]?)?;

    let fetch = |name: &str| -> Result<Vec<f32>, OnnxError> {
      let value = outputs
        .get(name)
        .ok_or_else(|| OnnxError::MissingOutput(name.to_string()))?;
      extract_f32(value)
    };

    let boxes = fetch(self.outputs.boxes.as_str())?;
    let scores = fetch(self.outputs.scores.as_str())?;
    let classes = fetch(self.outputs.classes.as_str())?;
    let num_detections = fetch(self.outputs.num_detections.as_str())?
      .first()
      .copied()
      .ok_or_else(|| OnnxError::InvalidOutput("num_detections 为空".to_string()))?;

    let result = Self::postprocess(&boxes, &scores, &classes, num_detections.max(0.0) as usize)?;
    debug!("检测到 {} 个物体", result.num_detections());
    Ok(result)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn builder_rejects_foreign_scheme() {
    let url = Url::parse("yolo26:///tmp/model.rknn").unwrap();
    assert!(matches!(
      OnnxDetectorBuilder::from_url(&url),
      Err(OnnxError::ModelPathError(_))
    ));
  }

  #[test]
  fn builder_keeps_engine_options() {
    let url = Url::parse("onnx:///opt/models/detector.onnx").unwrap();
    let builder = OnnxDetectorBuilder::from_url(&url)
      .unwrap()
      .input_name("images")
      .intra_threads(2);
    assert_eq!(builder.model_path, PathBuf::from("/opt/models/detector.onnx"));
    assert_eq!(builder.input_name, "images");
    assert_eq!(builder.intra_threads, Some(2));
    assert_eq!(builder.outputs.num_detections, "num_detections");
  }

  #[test]
  fn build_fails_for_missing_model() {
    let dir = tempfile::tempdir().unwrap();
    let builder = OnnxDetectorBuilder::new(dir.path().join("absent.onnx"));
    assert!(matches!(builder.build(), Err(OnnxError::ModelNotFound(_))));
    assert!(matches!(
      OnnxDetectorBuilder::from_model_dir(dir.path().join("nope")),
      Err(OnnxError::ModelNotFound(_))
    ));
  }

  #[test]
  fn postprocess_truncates_to_declared_count_and_sorts() {
    let boxes = [
      0.1, 0.1, 0.5, 0.5, //
      0.2, 0.2, 1.3, 0.6, //
      0.0, 0.0, 0.0, 0.0,
    ];
    let scores = [0.6, 0.8, 0.1];
    let classes = [3.0, 1.0, 7.0];
    let result = OnnxDetector::postprocess(&boxes, &scores, &classes, 2).unwrap();

    assert_eq!(result.num_detections(), 2);
    assert_eq!(result.items[0].class_id, 1);
    assert_eq!(result.items[0].bbox[2], 1.0);
    assert_eq!(result.items[1].class_id, 3);
  }

  #[test]
  fn postprocess_rejects_inconsistent_count() {
    let result = OnnxDetector::postprocess(&[0.0; 4], &[0.5], &[1.0], 3);
    assert!(matches!(result, Err(OnnxError::InvalidOutput(_))));
  }

  #[test]
  fn input_tensor_is_nhwc() {
    let mut image = RgbImage::new(3, 2);
    image.put_pixel(2, 1, image::Rgb([7, 8, 9]));
    let array = OnnxDetector::to_input_tensor(&image).unwrap();
    assert_eq!(array.shape(), &[1, 2, 3, 3]);
    assert_eq!(array[[0, 1, 2, 0]], 7);
    assert_eq!(array[[0, 1, 2, 2]], 9);
  }
}
