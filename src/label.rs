// 该文件是 Kanjian （看见） 项目的一部分。
// src/label.rs - 类别标签映射
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

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;
use tracing::{debug, info, warn};

/// TensorFlow 目标检测标签文件默认的最大类别数
pub const DEFAULT_MAX_NUM_CLASSES: u32 = 90;

static ID_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\bid\s*:\s*(-?\d+)").unwrap());
static NAME_RE: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r#"\bname\s*:\s*(?:"([^"]*)"|'([^']*)')"#).unwrap());
static DISPLAY_NAME_RE: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r#"\bdisplay_name\s*:\s*(?:"([^"]*)"|'([^']*)')"#).unwrap());

#[derive(Error, Debug)]
pub enum LabelError {
  #[error("标签文件不存在: {0}")]
  NotFound(PathBuf),
  #[error("I/O 错误: {path}: {source}")]
  Io {
    path: PathBuf,
    source: std::io::Error,
  },
  #[error("标签文件格式错误: {0}")]
  Malformed(String),
  #[error("类别描述文件格式错误: {0}")]
  Description(#[from] serde_json::Error),
}

/// 单个类别的显示名称与描述
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelEntry {
  pub name: String,
  pub description: Option<String>,
}

/// 类别 id 到名称、描述的只读映射，进程启动时加载一次
#[derive(Debug, Clone, Default)]
pub struct LabelMap {
  entries: HashMap<u32, LabelEntry>,
}

fn read_file(path: &Path) -> Result<String, LabelError> {
  if !path.is_file() {
    return Err(LabelError::NotFound(path.to_path_buf()));
  }
  std::fs::read_to_string(path).map_err(|source| LabelError::Io {
    path: path.to_path_buf(),
    source,
  })
}

fn quoted(caps: &regex::Captures<'_>) -> String {
  caps
    .get(1)
    .or_else(|| caps.get(2))
    .map(|m| m.as_str().to_string())
    .unwrap_or_default()
}

/// 去掉 `#` 开头的注释，引号内的 `#` 保留
fn strip_comments(text: &str) -> String {
  text
    .lines()
    .map(|line| {
      let mut quote = None;
      for (i, c) in line.char_indices() {
        match (quote, c) {
          (None, '"' | '\'') => quote = Some(c),
          (Some(q), _) if c == q => quote = None,
          (None, '#') => return &line[..i],
          _ => {}
        }
      }
      line
    })
    .collect::<Vec<_>>()
    .join("\n")
}

/// 切分出所有 `item { ... }` 块的内容，支持嵌套花括号，忽略引号内的花括号
fn item_blocks(text: &str) -> Result<Vec<&str>, LabelError> {
  let mut blocks = Vec::new();
  let mut rest = text;

  while let Some(pos) = rest.find("item") {
    let after = rest[pos + 4..].trim_start();
    if !after.starts_with('{') {
      rest = &rest[pos + 4..];
      continue;
    }
    let body = &after[1..];
    let mut depth = 1usize;
    let mut quote = None;
    let mut end = None;
    for (i, c) in body.char_indices() {
      match (quote, c) {
        (None, '"' | '\'') => quote = Some(c),
        (Some(q), _) if c == q => quote = None,
        (None, '{') => depth += 1,
        (None, '}') => {
          depth -= 1;
          if depth == 0 {
            end = Some(i);
            break;
          }
        }
        _ => {}
      }
    }
    let end = end.ok_or_else(|| LabelError::Malformed("item 块缺少右花括号".to_string()))?;
    blocks.push(&body[..end]);
    rest = &body[end + 1..];
  }

  Ok(blocks)
}

impl LabelMap {
  pub fn from_entries(entries: impl IntoIterator<Item = (u32, LabelEntry)>) -> Self {
    Self {
      entries: entries.into_iter().collect(),
    }
  }

  /// 从标签文件与类别描述文件加载
  pub fn load(
    label_path: impl AsRef<Path>,
    description_path: impl AsRef<Path>,
    max_num_classes: u32,
  ) -> Result<Self, LabelError> {
    let label_path = label_path.as_ref();
    let description_path = description_path.as_ref();

    info!("加载标签文件: {}", label_path.display());
    let label_text = read_file(label_path)?;
    info!("加载类别描述文件: {}", description_path.display());
    let descriptions: HashMap<String, String> =
      serde_json::from_str(&read_file(description_path)?)?;

    let map = Self::parse(&label_text, &descriptions, max_num_classes)?;
    if map.is_empty() {
      warn!("标签文件中没有可用的类别: {}", label_path.display());
    }
    info!("共加载 {} 个类别", map.len());
    Ok(map)
  }

  /// 解析 pbtxt 格式的标签文本，优先使用 display_name
  pub fn parse(
    label_text: &str,
    descriptions: &HashMap<String, String>,
    max_num_classes: u32,
  ) -> Result<Self, LabelError> {
    let text = strip_comments(label_text);
    let blocks = item_blocks(&text)?;
    if blocks.is_empty() {
      return Err(LabelError::Malformed("没有找到任何 item".to_string()));
    }

    let mut entries = HashMap::new();
    for block in blocks {
      let id: i64 = ID_RE
        .captures(block)
        .and_then(|caps| caps[1].parse().ok())
        .ok_or_else(|| LabelError::Malformed(format!("item 缺少 id: {}", block.trim())))?;
      if id < 1 {
        return Err(LabelError::Malformed(format!("类别 id 必须不小于 1: {}", id)));
      }
      if id > i64::from(max_num_classes) {
        info!("忽略类别 id {}, 超过最大类别数 {}", id, max_num_classes);
        continue;
      }
      let id = id as u32;

      let name = DISPLAY_NAME_RE
        .captures(block)
        .map(|caps| quoted(&caps))
        .or_else(|| NAME_RE.captures(block).map(|caps| quoted(&caps)))
        .unwrap_or_else(|| format!("category_{}", id));
      let description = descriptions.get(&name).cloned();
      debug!("类别 {}: {} (描述: {})", id, name, description.is_some());

      let entry = LabelEntry { name, description };
      if let Some(old) = entries.insert(id, entry) {
        warn!("类别 id {} 重复定义, 覆盖 {}", id, old.name);
      }
    }

    Ok(Self { entries })
  }

  pub fn get(&self, class_id: u32) -> Option<&LabelEntry> {
    self.entries.get(&class_id)
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }
}
