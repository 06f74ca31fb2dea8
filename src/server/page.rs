// 该文件是 Kanjian （看见） 项目的一部分。
// src/server/page.rs - 页面渲染
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

use std::fmt::Write as _;

use crate::{aggregate::Aggregation, input::ALLOWED_EXTENSIONS, threshold::Threshold};

/// 检测结果页面中的附加信息
pub struct ResultView<'a> {
  pub aggregation: &'a Aggregation,
  pub ground_truth: Option<usize>,
}

fn escape(text: &str) -> String {
  let mut out = String::with_capacity(text.len());
  for c in text.chars() {
    match c {
      '&' => out.push_str("&amp;"),
      '<' => out.push_str("&lt;"),
      '>' => out.push_str("&gt;"),
      '"' => out.push_str("&quot;"),
      '\'' => out.push_str("&#39;"),
      _ => out.push(c),
    }
  }
  out
}

fn forms(threshold: Threshold) -> String {
  format!(
    r#"<form action="/post" method="post" enctype="multipart/form-data">
  <label for="input_photo">File extension should be: {extensions} (case-insensitive)</label>
  <input type="file" id="input_photo" name="input_photo" accept=".jpg,.jpeg,.png">
  <input type="submit" value="Upload">
</form>
<form action="/trsvalue" method="post">
  <label for="tt">Detection threshold (current: {threshold})</label>
  <input type="text" id="tt" name="tt" placeholder="0.0 - 1.0">
  <input type="submit" value="Update">
</form>
"#,
    extensions = ALLOWED_EXTENSIONS.join(", "),
    threshold = threshold,
  )
}

fn layout(body: &str) -> String {
  format!(
    r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<title>Object Detection</title>
</head>
<body>
<h1>Object Detection</h1>
{body}</body>
</html>
"#
  )
}

/// 上传页面，可附带一条提示信息
pub fn render_upload(threshold: Threshold, message: Option<&str>) -> String {
  let mut body = String::new();
  if let Some(message) = message {
    let _ = writeln!(body, r#"<p class="error">{}</p>"#, escape(message));
  }
  body.push_str(&forms(threshold));
  layout(&body)
}

/// 检测结果页面
pub fn render_result(threshold: Threshold, view: &ResultView<'_>) -> String {
  let mut body = forms(threshold);

  let _ = writeln!(
    body,
    r#"<p>Number of detections: <span id="num_detections">{}</span></p>"#,
    view.aggregation.qualifying
  );
  if let Some(count) = view.ground_truth {
    let _ = writeln!(
      body,
      r#"<p>Number of objects in annotation: <span id="num_objects">{}</span></p>"#,
      count
    );
  }

  for category in &view.aggregation.categories {
    let _ = writeln!(body, "<div class=\"category\">");
    let _ = writeln!(body, "<h2>{}</h2>", escape(&category.name));
    if let Some(description) = &category.description {
      let _ = writeln!(body, "<p>{}</p>", escape(description));
    }
    let _ = writeln!(
      body,
      r#"<img src="{}" alt="{}">"#,
      category.image.to_data_uri(),
      escape(&category.name)
    );
    let _ = writeln!(body, "</div>");
  }

  layout(&body)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::aggregate::Category;
  use crate::output::encode::EncodedImage;

  fn aggregation() -> Aggregation {
    let png = EncodedImage::encode(&image::RgbImage::new(2, 2)).unwrap();
    Aggregation {
      categories: vec![
        Category {
          name: "original".to_string(),
          image: png.clone(),
          description: None,
        },
        Category {
          name: "<b>button</b>".to_string(),
          image: png,
          description: Some("Tom & Jerry".to_string()),
        },
      ],
      qualifying: 3,
    }
  }

  #[test]
  fn result_page_lists_categories_and_counts() {
    let aggregation = aggregation();
    let html = render_result(
      Threshold::default(),
      &ResultView {
        aggregation: &aggregation,
        ground_truth: Some(4),
      },
    );
    assert!(html.contains(r#"<span id="num_detections">3</span>"#));
    assert!(html.contains(r#"<span id="num_objects">4</span>"#));
    assert!(html.contains("&lt;b&gt;button&lt;/b&gt;"));
    assert!(html.contains("Tom &amp; Jerry"));
    assert_eq!(html.matches("data:image/png;base64,").count(), 2);
  }

  #[test]
  fn ground_truth_is_omitted_when_unknown() {
    let aggregation = aggregation();
    let html = render_result(
      Threshold::default(),
      &ResultView {
        aggregation: &aggregation,
        ground_truth: None,
      },
    );
    assert!(!html.contains("num_objects"));
  }

  #[test]
  fn upload_page_shows_threshold_and_message() {
    let html = render_upload(Threshold::new(0.7).unwrap(), Some("bad <input>"));
    assert!(html.contains("current: 0.7"));
    assert!(html.contains("bad &lt;input&gt;"));
    assert!(html.contains(r#"name="input_photo""#));
  }
}
