// 该文件是 Kanjian （看见） 项目的一部分。
// src/ground_truth.rs - 标注文件中的真实目标数量
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

use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

const OBJECT_MARKER: &str = "<object>";

/// 在标注目录中查找与上传图片同名的 `.xml` 文件并统计目标数量
#[derive(Debug, Clone)]
pub struct GroundTruth {
  annotations_dir: PathBuf,
}

impl GroundTruth {
  pub fn new(annotations_dir: impl Into<PathBuf>) -> Self {
    Self {
      annotations_dir: annotations_dir.into(),
    }
  }

  /// 标注文件路径：取文件名中第一个 `.` 之前的部分
  pub fn annotation_path(&self, filename: &str) -> Option<PathBuf> {
    let name = Path::new(filename).file_name()?.to_str()?;
    let stem = name.split('.').next().filter(|s| !s.is_empty())?;
    Some(self.annotations_dir.join(format!("{}.xml", stem)))
  }

  /// 返回包含 `<object>` 的行数；没有标注文件时返回 `None`
  pub fn count(&self, filename: &str) -> Option<usize> {
    let path = self.annotation_path(filename)?;
    let file = match std::fs::File::open(&path) {
      Ok(file) => file,
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
        debug!("没有标注文件: {}", path.display());
        return None;
      }
      Err(e) => {
        warn!("无法打开标注文件 {}: {}", path.display(), e);
        return None;
      }
    };

    let mut count = 0usize;
    for line in BufReader::new(file).lines() {
      match line {
        Ok(line) if line.contains(OBJECT_MARKER) => count += 1,
        Ok(_) => {}
        Err(e) => {
          warn!("读取标注文件 {} 失败: {}", path.display(), e);
          return None;
        }
      }
    }
    debug!("标注文件 {} 中有 {} 个目标", path.display(), count);
    Some(count)
  }
}
