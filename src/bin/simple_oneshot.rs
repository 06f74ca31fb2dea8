// 该文件是 Kanjian （看见） 项目的一部分。
// src/bin/simple_oneshot.rs - 单张图片检测
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

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use url::Url;

use kanjian::{
  FromUrl,
  aggregate::{Aggregator, DEFAULT_DISPLAY_SIZE},
  input::ImageFileInput,
  label::{DEFAULT_MAX_NUM_CLASSES, LabelMap},
  model::OnnxDetectorBuilder,
  output::{Render, SaveCategoryDirOutput, draw::BoxPainter},
  task::DetectTask,
  threshold::Threshold,
};

/// Kanjian 单张图片检测参数
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// ONNX 模型路径，例如 onnx:///opt/models/detector.onnx
  #[arg(long, value_name = "MODEL")]
  pub model: Url,
  /// 输入图片，例如 image:///tmp/screen.png
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 输出目录，例如 folder:///tmp/result
  #[arg(long, value_name = "OUTPUT")]
  pub output: Url,
  /// 标签文件（pbtxt）
  #[arg(long, value_name = "FILE")]
  pub labels: PathBuf,
  /// 类别描述文件（JSON）
  #[arg(long, value_name = "FILE")]
  pub descriptions: PathBuf,
  /// 置信度阈值 (0.0 - 1.0)
  #[arg(long, default_value = "0.5", value_name = "THRESHOLD")]
  pub threshold: Threshold,
  /// 最大类别数
  #[arg(long, default_value_t = DEFAULT_MAX_NUM_CLASSES)]
  pub max_num_classes: u32,
  /// 结果图片的最大边长，0 表示保持原尺寸
  #[arg(long, default_value_t = DEFAULT_DISPLAY_SIZE)]
  pub display_size: u32,
}

fn main() -> Result<()> {
  kanjian::init_tracing();

  let args = Args::parse();

  info!("模型文件路径: {}", args.model);
  info!("输入来源: {}", args.input);
  info!("输出路径: {}", args.output);

  let input = ImageFileInput::from_url(&args.input).context("无法读取输入图片")?;
  info!(
    "读取图片 {}: {}x{}",
    input.path().display(),
    input.image().width(),
    input.image().height()
  );
  let labels = LabelMap::load(&args.labels, &args.descriptions, args.max_num_classes)?;
  let model = OnnxDetectorBuilder::from_url(&args.model)?.build()?;
  let output = SaveCategoryDirOutput::from_url(&args.output)?;

  let task = DetectTask::new(
    model,
    labels,
    Aggregator::new(BoxPainter::default(), args.display_size),
  );

  info!("开始推理...");
  let now = std::time::Instant::now();
  let result = task.run(input.image(), args.threshold)?;
  info!("推理完成，耗时: {:.2?}", now.elapsed());

  output.render_result(&result)?;
  info!(
    "共 {} 个检测, {} 个类别, 已保存到 {}",
    result.qualifying,
    result.classes().len(),
    output.directory().display()
  );

  Ok(())
}
