// 该文件是 Kanjian （看见） 项目的一部分。
// src/args.rs - 项目参数配置
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

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use url::Url;

use crate::{aggregate::DEFAULT_DISPLAY_SIZE, label::DEFAULT_MAX_NUM_CLASSES, threshold::Threshold};

/// Kanjian 网页服务参数配置
#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Deploy control element detection app.", long_about = None)]
pub struct Args {
  /// 数据根目录，相对路径均以此为基准
  #[arg(long, env = "KANJIAN_BASE_DIR", default_value = "/opt/object_detection")]
  pub base_dir: PathBuf,

  /// 模型目录（包含 model.onnx）
  #[arg(short = 'm', long, env = "KANJIAN_MODEL_PATH", default_value = "my_model")]
  pub model_path: PathBuf,

  /// 模型 URL，例如 onnx:///opt/models/detector.onnx，优先于 --model-path
  #[arg(long, env = "KANJIAN_MODEL_URL", value_name = "MODEL")]
  pub model_url: Option<Url>,

  /// 标签文件（pbtxt）
  #[arg(short = 'l', long, env = "KANJIAN_LABEL_PATH", default_value = "label_map.pbtxt")]
  pub label_path: PathBuf,

  /// 类别描述文件（JSON）
  #[arg(long, env = "KANJIAN_DESCRIPTION_PATH", default_value = "category_description.json")]
  pub description_path: PathBuf,

  /// 真实标注目录
  #[arg(long, env = "KANJIAN_ANNOTATIONS_DIR", default_value = "annotations")]
  pub annotations_dir: PathBuf,

  /// 模型输入张量名称
  #[arg(long, env = "KANJIAN_INPUT_NAME", default_value = "input_tensor")]
  pub input_name: String,

  /// ONNX Runtime 算子内线程数，不指定时由运行时决定
  #[arg(long, env = "KANJIAN_INTRA_THREADS")]
  pub intra_threads: Option<usize>,

  /// 置信度阈值 (0.0 - 1.0)
  #[arg(short = 't', long, env = "KANJIAN_THRESHOLD", default_value = "0.5", value_name = "THRESHOLD")]
  pub threshold: Threshold,

  /// 最大类别数，超过的标签将被忽略
  #[arg(long, default_value_t = DEFAULT_MAX_NUM_CLASSES)]
  pub max_num_classes: u32,

  /// 结果图片的最大边长，0 表示保持原尺寸
  #[arg(long, default_value_t = DEFAULT_DISPLAY_SIZE)]
  pub display_size: u32,

  /// 监听地址
  #[arg(long, env = "KANJIAN_LISTEN", default_value = "0.0.0.0:80")]
  pub listen: SocketAddr,

  /// HTTP Basic 认证用户名
  #[arg(long, env = "KANJIAN_AUTH_USER", requires = "auth_password")]
  pub auth_user: Option<String>,

  /// HTTP Basic 认证密码
  #[arg(long, env = "KANJIAN_AUTH_PASSWORD", requires = "auth_user", hide_env_values = true)]
  pub auth_password: Option<String>,
}

impl Args {
  pub fn resolve(&self, path: &std::path::Path) -> PathBuf {
    self.base_dir.join(path)
  }

  pub fn label_file(&self) -> PathBuf {
    self.resolve(&self.label_path)
  }

  pub fn description_file(&self) -> PathBuf {
    self.resolve(&self.description_path)
  }

  pub fn annotations(&self) -> PathBuf {
    self.resolve(&self.annotations_dir)
  }

  pub fn model_dir(&self) -> PathBuf {
    self.resolve(&self.model_path)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn defaults_follow_base_dir() {
    let args = Args::try_parse_from(["kanjian-server", "--base-dir", "/srv/od"]).unwrap();
    assert_eq!(args.threshold.value(), 0.5);
    assert_eq!(args.label_file(), PathBuf::from("/srv/od/label_map.pbtxt"));
    assert_eq!(
      args.description_file(),
      PathBuf::from("/srv/od/category_description.json")
    );
    assert_eq!(args.annotations(), PathBuf::from("/srv/od/annotations"));
    assert_eq!(args.model_dir(), PathBuf::from("/srv/od/my_model"));
    assert_eq!(args.input_name, "input_tensor");
    assert_eq!(args.intra_threads, None);
  }

  #[test]
  fn absolute_paths_are_kept() {
    let args =
      Args::try_parse_from(["kanjian-server", "-l", "/etc/labels.pbtxt", "-t", "0.25"]).unwrap();
    assert_eq!(args.label_file(), PathBuf::from("/etc/labels.pbtxt"));
    assert_eq!(args.threshold.value(), 0.25);
  }

  #[test]
  fn engine_options_are_parsed() {
    let args = Args::try_parse_from([
      "kanjian-server",
      "--input-name",
      "images",
      "--intra-threads",
      "4",
    ])
    .unwrap();
    assert_eq!(args.input_name, "images");
    assert_eq!(args.intra_threads, Some(4));
    assert!(Args::try_parse_from(["kanjian-server", "--intra-threads", "many"]).is_err());
  }

  #[test]
  fn threshold_outside_unit_interval_is_rejected() {
    assert!(Args::try_parse_from(["kanjian-server", "-t", "1.5"]).is_err());
    assert!(Args::try_parse_from(["kanjian-server", "-t", "high"]).is_err());
  }

  #[test]
  fn auth_requires_both_fields() {
    assert!(Args::try_parse_from(["kanjian-server", "--auth-user", "admin"]).is_err());
    let args = Args::try_parse_from([
      "kanjian-server",
      "--auth-user",
      "admin",
      "--auth-password",
      "secret",
    ])
    .unwrap();
    assert_eq!(args.auth_user.as_deref(), Some("admin"));
  }
}
