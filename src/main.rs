// 该文件是 Kanjian （看见） 项目的一部分。
// src/main.rs - 网页服务主程序
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

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};

use kanjian::{
  FromUrl,
  aggregate::Aggregator,
  args::Args,
  ground_truth::GroundTruth,
  label::LabelMap,
  model::OnnxDetectorBuilder,
  output::draw::BoxPainter,
  server::{AppState, auth, router},
  task::DetectTask,
  threshold::SharedThreshold,
};

async fn shutdown_signal() {
  if let Err(e) = tokio::signal::ctrl_c().await {
    warn!("无法监听中断信号: {}", e);
    std::future::pending::<()>().await;
  }
  info!("收到中断信号，准备退出...");
}

#[tokio::main]
async fn main() -> Result<()> {
  kanjian::init_tracing();

  let args = Args::parse();

  info!("模型路径: {}", args.model_dir().display());
  info!("标签文件路径: {}", args.label_file().display());
  info!("目标检测阈值: {}", args.threshold);

  let labels = LabelMap::load(args.label_file(), args.description_file(), args.max_num_classes)
    .context("无法加载标签映射")?;

  let mut builder = match &args.model_url {
    Some(url) => OnnxDetectorBuilder::from_url(url)?,
    None => OnnxDetectorBuilder::from_model_dir(args.model_dir())?,
  }
  .input_name(args.input_name.clone());
  if let Some(threads) = args.intra_threads {
    builder = builder.intra_threads(threads);
  }
  let model = builder.build().context("无法加载模型")?;

  let state = Arc::new(AppState {
    task: DetectTask::new(
      model,
      labels,
      Aggregator::new(BoxPainter::default(), args.display_size),
    ),
    threshold: SharedThreshold::new(args.threshold),
    ground_truth: GroundTruth::new(args.annotations()),
  });
  let authenticator = auth::from_credentials(args.auth_user.clone(), args.auth_password.clone());
  let app = router(state, authenticator);

  let listener = tokio::net::TcpListener::bind(args.listen)
    .await
    .with_context(|| format!("无法监听地址: {}", args.listen))?;
  info!("服务已启动: http://{}", args.listen);

  axum::serve(listener, app)
    .with_graceful_shutdown(shutdown_signal())
    .await?;

  info!("服务已退出");
  Ok(())
}
