// 该文件是 Kanjian （看见） 项目的一部分。
// src/output/save_category_dir.rs - 将分类结果保存到目录
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

use serde::Serialize;
use thiserror::Error;
use tracing::info;
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, aggregate::Aggregation, output::Render};

const SUMMARY_FILE: &str = "summary.json";

#[derive(Error, Debug)]
pub enum SaveCategoryDirError {
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("JSON 错误: {0}")]
  JsonError(#[from] serde_json::Error),
}

#[derive(Debug, Serialize)]
struct CategoryRecord<'a> {
  name: &'a str,
  description: Option<&'a str>,
  file: String,
}

#[derive(Debug, Serialize)]
struct Summary<'a> {
  num_detections: usize,
  categories: Vec<CategoryRecord<'a>>,
}

/// 每个类别保存为一张 PNG，另写一份 `summary.json`
pub struct SaveCategoryDirOutput {
  directory: PathBuf,
}

impl FromUrlWithScheme for SaveCategoryDirOutput {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for SaveCategoryDirOutput {
  type Error = SaveCategoryDirError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(SaveCategoryDirError::SchemeMismatch(format!(
        "期望保存方式 '{}', 实际保存方式 '{}'",
        Self::SCHEME,
        url.scheme()
      )));
    }

    Ok(Self::new(url.path()))
  }
}

/// 文件名中只保留字母数字、`-` 与 `_`
fn category_file_name(index: usize, name: &str) -> String {
  let safe: String = name
    .chars()
    .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
    .collect();
  format!("{:02}-{}.png", index, safe)
}

impl SaveCategoryDirOutput {
  pub fn new(directory: impl Into<PathBuf>) -> Self {
    Self {
      directory: directory.into(),
    }
  }

  pub fn directory(&self) -> &Path {
    &self.directory
  }
}

impl Render<Aggregation> for SaveCategoryDirOutput {
  type Error = SaveCategoryDirError;

  fn render_result(&self, result: &Aggregation) -> Result<(), Self::Error> {
    std::fs::create_dir_all(&self.directory)?;

    let mut records = Vec::with_capacity(result.categories.len());
    for (index, category) in result.categories.iter().enumerate() {
      let file = category_file_name(index, &category.name);
      std::fs::write(self.directory.join(&file), category.image.as_bytes())?;
      info!("保存类别 {} 到文件: {}", category.name, file);
      records.push(CategoryRecord {
        name: &category.name,
        description: category.description.as_deref(),
        file,
      });
    }

    let summary = Summary {
      num_detections: result.qualifying,
      categories: records,
    };
    std::fs::write(
      self.directory.join(SUMMARY_FILE),
      serde_json::to_string_pretty(&summary)?,
    )?;
    Ok(())
  }
}
