// 该文件是 Kanjian （看见） 项目的一部分。
// src/threshold.rs - 置信度阈值
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

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU32, Ordering};

use thiserror::Error;
use tracing::info;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ThresholdError {
  #[error("阈值不是数字: {0:?}")]
  NotANumber(String),
  #[error("阈值必须在 0.0 与 1.0 之间, 实际为 {0}")]
  OutOfRange(f32),
}

/// 置信度阈值，取值范围 [0, 1]
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Threshold(f32);

impl Threshold {
  pub fn new(value: f32) -> Result<Self, ThresholdError> {
    if (0.0..=1.0).contains(&value) {
      Ok(Self(value))
    } else {
      Err(ThresholdError::OutOfRange(value))
    }
  }

  pub fn value(self) -> f32 {
    self.0
  }

  /// 分数不低于阈值的检测结果才会被保留
  pub fn admits(self, score: f32) -> bool {
    score >= self.0
  }
}

impl Default for Threshold {
  fn default() -> Self {
    Self(0.5)
  }
}

impl fmt::Display for Threshold {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.0)
  }
}

impl FromStr for Threshold {
  type Err = ThresholdError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let s = s.trim();
    let value: f32 = s
      .parse()
      .map_err(|_| ThresholdError::NotANumber(s.to_string()))?;
    Self::new(value)
  }
}

/// 进程内共享的阈值
///
/// 以 f32 的位模式保存在 `AtomicU32` 中。每个请求在开始时读取一次快照，
/// 之后的更新不会影响正在进行的检测。
#[derive(Debug)]
pub struct SharedThreshold(AtomicU32);

impl SharedThreshold {
  pub fn new(threshold: Threshold) -> Self {
    Self(AtomicU32::new(threshold.value().to_bits()))
  }

  pub fn snapshot(&self) -> Threshold {
    Threshold(f32::from_bits(self.0.load(Ordering::Acquire)))
  }

  pub fn set(&self, threshold: Threshold) {
    self.0.store(threshold.value().to_bits(), Ordering::Release);
    info!("置信度阈值已更新为 {}", threshold);
  }

  /// 处理表单提交的阈值：空输入保持不变，返回 `Ok(None)`
  pub fn update_from_input(&self, input: &str) -> Result<Option<Threshold>, ThresholdError> {
    if input.trim().is_empty() {
      return Ok(None);
    }
    let threshold: Threshold = input.parse()?;
    self.set(threshold);
    Ok(Some(threshold))
  }
}

impl Default for SharedThreshold {
  fn default() -> Self {
    Self::new(Threshold::default())
  }
}
