// 该文件是 Kanjian （看见） 项目的一部分。
// src/server.rs - 网页前端
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

use std::io::Write as _;
use std::sync::Arc;

use axum::{
  Form, Router,
  extract::{DefaultBodyLimit, Multipart, State, multipart::MultipartRejection},
  http::StatusCode,
  middleware,
  response::{Html, IntoResponse, Redirect, Response},
  routing::get,
};
use image::RgbImage;
use serde::Deserialize;
use tracing::{error, info, warn};

use crate::{
  ground_truth::GroundTruth,
  input::check_upload_name,
  model::{DetectResult, Model},
  task::{DetectTask, TaskError},
  threshold::SharedThreshold,
};

pub mod auth;
pub mod page;

use self::auth::{Authenticator, require_auth};
use self::page::{ResultView, render_result, render_upload};

const UPLOAD_FIELD: &str = "input_photo";
const MAX_UPLOAD_BYTES: usize = 32 * 1024 * 1024;

/// 所有请求共享的状态
pub struct AppState<M> {
  pub task: DetectTask<M>,
  pub threshold: SharedThreshold,
  pub ground_truth: GroundTruth,
}

#[derive(Debug, Deserialize)]
pub struct ThresholdForm {
  #[serde(default)]
  pub tt: String,
}

struct Upload {
  filename: String,
  bytes: axum::body::Bytes,
}

pub fn router<M>(state: Arc<AppState<M>>, auth: Arc<dyn Authenticator>) -> Router
where
  M: Model<Input = RgbImage, Output = DetectResult> + Send + Sync + 'static,
  M::Error: std::error::Error + Send + Sync + 'static,
{
  Router::new()
    .route("/", get(upload::<M>))
    .route("/post", get(redirect_home).post(post_photo::<M>))
    .route("/trsvalue", get(redirect_home).post(update_threshold::<M>))
    .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
    .with_state(state)
    .layer(middleware::from_fn_with_state(auth, require_auth))
}

async fn redirect_home() -> Redirect {
  Redirect::to("/")
}

async fn upload<M>(State(state): State<Arc<AppState<M>>>) -> Html<String> {
  Html(render_upload(state.threshold.snapshot(), None))
}

/// 读取 multipart 中的图片字段，缺失或扩展名不合法时返回 `None`
async fn read_upload(mut multipart: Multipart) -> Option<Upload> {
  loop {
    let field = match multipart.next_field().await {
      Ok(Some(field)) => field,
      Ok(None) => return None,
      Err(e) => {
        warn!("读取上传内容失败: {}", e);
        return None;
      }
    };
    if field.name() != Some(UPLOAD_FIELD) {
      continue;
    }

    let filename = field.file_name().unwrap_or_default().to_string();
    if let Err(e) = check_upload_name(&filename) {
      warn!("拒绝上传: {}", e);
      return None;
    }
    return match field.bytes().await {
      Ok(bytes) if !bytes.is_empty() => Some(Upload { filename, bytes }),
      Ok(_) => {
        warn!("上传文件为空: {}", filename);
        None
      }
      Err(e) => {
        warn!("读取上传文件失败: {}", e);
        None
      }
    };
  }
}

fn error_page<M>(state: &AppState<M>, status: StatusCode, message: &str) -> Response {
  (
    status,
    Html(render_upload(state.threshold.snapshot(), Some(message))),
  )
    .into_response()
}

async fn post_photo<M>(
  State(state): State<Arc<AppState<M>>>,
  multipart: Result<Multipart, MultipartRejection>,
) -> Response
where
  M: Model<Input = RgbImage, Output = DetectResult> + Send + Sync + 'static,
  M::Error: std::error::Error + Send + Sync + 'static,
{
  let multipart = match multipart {
    Ok(multipart) => multipart,
    Err(e) => {
      warn!("上传请求不是合法的 multipart: {}", e);
      return Redirect::to("/").into_response();
    }
  };
  let Some(upload) = read_upload(multipart).await else {
    return Redirect::to("/").into_response();
  };

  // 请求开始时读取一次阈值快照
  let threshold = state.threshold.snapshot();
  info!("收到上传: {} ({} 字节)", upload.filename, upload.bytes.len());

  let worker = Arc::clone(&state);
  let joined = tokio::task::spawn_blocking(move || -> Result<_, TaskError> {
    let mut scratch = tempfile::NamedTempFile::new().map_err(crate::input::InputError::from)?;
    scratch
      .write_all(&upload.bytes)
      .and_then(|_| scratch.flush())
      .map_err(crate::input::InputError::from)?;
    let aggregation = worker.task.run_file(scratch.path(), threshold)?;
    let ground_truth = worker.ground_truth.count(&upload.filename);
    Ok((aggregation, ground_truth))
  })
  .await;

  match joined {
    Ok(Ok((aggregation, ground_truth))) => {
      info!(
        "检测完成: {} 个检测, 标注数量 {:?}",
        aggregation.qualifying, ground_truth
      );
      let view = ResultView {
        aggregation: &aggregation,
        ground_truth,
      };
      Html(render_result(threshold, &view)).into_response()
    }
    Ok(Err(e @ (TaskError::Input(_) | TaskError::Aggregate(_)))) => {
      warn!("请求处理失败: {}", e);
      error_page(&state, StatusCode::UNPROCESSABLE_ENTITY, &e.to_string())
    }
    Ok(Err(e)) => {
      error!("推理失败: {}", e);
      error_page(&state, StatusCode::INTERNAL_SERVER_ERROR, &e.to_string())
    }
    Err(e) => {
      error!("检测任务异常退出: {}", e);
      error_page(&state, StatusCode::INTERNAL_SERVER_ERROR, "检测任务异常退出")
    }
  }
}

async fn update_threshold<M>(
  State(state): State<Arc<AppState<M>>>,
  Form(form): Form<ThresholdForm>,
) -> Response {
  match state.threshold.update_from_input(&form.tt) {
    Ok(_) => Redirect::to("/").into_response(),
    Err(e) => {
      warn!("拒绝阈值更新 {:?}: {}", form.tt, e);
      error_page(&state, StatusCode::BAD_REQUEST, &e.to_string())
    }
  }
}

#[cfg(test)]
mod tests {
  use axum::{
    body::{Body, to_bytes},
    http::{Request, header},
  };
  use base64::{Engine as _, engine::general_purpose::STANDARD};
  use tower::ServiceExt;

  use super::*;
  use crate::{
    aggregate::Aggregator,
    label::LabelMap,
    model::Detection,
    output::encode::EncodedImage,
    server::auth::{AllowAll, BasicAuth},
    task::tests::{StubModel, stub_detections, stub_labels},
    threshold::Threshold,
  };

  const BOUNDARY: &str = "kanjian-test-boundary";

  fn state_with(
    detections: Vec<Detection>,
    labels: LabelMap,
    annotations: &std::path::Path,
  ) -> Arc<AppState<StubModel>> {
    state_for(StubModel::new(detections), labels, annotations)
  }

  fn state_for(
    model: StubModel,
    labels: LabelMap,
    annotations: &std::path::Path,
  ) -> Arc<AppState<StubModel>> {
    Arc::new(AppState {
      task: DetectTask::new(model, labels, Aggregator::default()),
      threshold: SharedThreshold::new(Threshold::new(0.5).unwrap()),
      ground_truth: GroundTruth::new(annotations),
    })
  }

  fn png_bytes() -> Vec<u8> {
    EncodedImage::encode(&RgbImage::new(20, 20))
      .unwrap()
      .as_bytes()
      .to_vec()
  }

  fn multipart_request(filename: &str, content: &[u8]) -> Request<Body> {
    let mut body = Vec::new();
    body.extend_from_slice(
      format!(
        "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"input_photo\"; filename=\"{filename}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
      )
      .as_bytes(),
    );
    body.extend_from_slice(content);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

    Request::builder()
      .method("POST")
      .uri("/post")
      .header(
        header::CONTENT_TYPE,
        format!("multipart/form-data; boundary={BOUNDARY}"),
      )
      .body(Body::from(body))
      .unwrap()
  }

  fn threshold_request(value: &str) -> Request<Body> {
    Request::builder()
      .method("POST")
      .uri("/trsvalue")
      .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
      .body(Body::from(format!("tt={value}")))
      .unwrap()
  }

  async fn body_text(response: Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
  }

  #[tokio::test]
  async fn upload_page_is_served() {
    let dir = tempfile::tempdir().unwrap();
    let app = router(state_with(vec![], stub_labels(), dir.path()), Arc::new(AllowAll));
    let response = app
      .oneshot(Request::get("/").body(Body::empty()).unwrap())
      .await
      .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_text(response).await.contains("input_photo"));
  }

  #[tokio::test]
  async fn valid_upload_renders_categories_and_counts() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("shot.xml"), "<object>\n<object>\n<object>\n").unwrap();
    let app = router(
      state_with(stub_detections(), stub_labels(), dir.path()),
      Arc::new(AllowAll),
    );

    let response = app
      .oneshot(multipart_request("shot.PNG", &png_bytes()))
      .await
      .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let html = body_text(response).await;
    assert!(html.contains(r#"<span id="num_detections">1</span>"#));
    assert!(html.contains(r#"<span id="num_objects">3</span>"#));
    assert!(html.contains("<h2>original</h2>"));
    assert!(html.contains("<h2>button</h2>"));
    assert!(html.contains("clickable"));
  }

  #[tokio::test]
  async fn disallowed_extension_redirects_without_inference() {
    let dir = tempfile::tempdir().unwrap();
    let state = state_with(stub_detections(), stub_labels(), dir.path());
    let app = router(Arc::clone(&state), Arc::new(AllowAll));

    let response = app
      .oneshot(multipart_request("anim.gif", &png_bytes()))
      .await
      .unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(response.headers()[header::LOCATION], "/");
    assert_eq!(state.task_model_calls(), 0);
  }

  #[tokio::test]
  async fn non_multipart_post_redirects_without_inference() {
    let dir = tempfile::tempdir().unwrap();
    let state = state_with(stub_detections(), stub_labels(), dir.path());
    let app = router(Arc::clone(&state), Arc::new(AllowAll));

    let form = Request::builder()
      .method("POST")
      .uri("/post")
      .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
      .body(Body::from("input_photo="))
      .unwrap();
    let response = app.clone().oneshot(form).await.unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(response.headers()[header::LOCATION], "/");

    let no_boundary = Request::builder()
      .method("POST")
      .uri("/post")
      .header(header::CONTENT_TYPE, "multipart/form-data")
      .body(Body::empty())
      .unwrap();
    let response = app.oneshot(no_boundary).await.unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(state.task_model_calls(), 0);
  }

  #[tokio::test]
  async fn engine_failure_is_a_server_error() {
    let dir = tempfile::tempdir().unwrap();
    let mut model = StubModel::new(stub_detections());
    model.fail = true;
    let state = state_for(model, stub_labels(), dir.path());
    let app = router(Arc::clone(&state), Arc::new(AllowAll));

    let response = app
      .oneshot(multipart_request("shot.png", &png_bytes()))
      .await
      .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(state.task_model_calls(), 1);
    let html = body_text(response).await;
    assert!(html.contains("input_photo"));
    assert!(!html.contains("num_detections"));
  }

  #[tokio::test]
  async fn undecodable_upload_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let app = router(
      state_with(stub_detections(), stub_labels(), dir.path()),
      Arc::new(AllowAll),
    );
    let response = app
      .oneshot(multipart_request("broken.jpg", b"not an image"))
      .await
      .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
  }

  #[tokio::test]
  async fn unknown_class_is_reported_as_lookup_failure() {
    let dir = tempfile::tempdir().unwrap();
    let app = router(
      state_with(stub_detections(), LabelMap::default(), dir.path()),
      Arc::new(AllowAll),
    );
    let response = app
      .oneshot(multipart_request("shot.jpg", &png_bytes()))
      .await
      .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let html = body_text(response).await;
    assert!(!html.contains("num_detections"));
  }

  #[tokio::test]
  async fn threshold_update_is_validated() {
    let dir = tempfile::tempdir().unwrap();
    let state = state_with(vec![], stub_labels(), dir.path());
    let app = router(Arc::clone(&state), Arc::new(AllowAll));

    let response = app.clone().oneshot(threshold_request("0.8")).await.unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(state.threshold.snapshot().value(), 0.8);

    let response = app.clone().oneshot(threshold_request("")).await.unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(state.threshold.snapshot().value(), 0.8);

    let response = app.clone().oneshot(threshold_request("7")).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let response = app.oneshot(threshold_request("abc")).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(state.threshold.snapshot().value(), 0.8);
  }

  #[tokio::test]
  async fn basic_auth_guards_every_route() {
    let dir = tempfile::tempdir().unwrap();
    let app = router(
      state_with(vec![], stub_labels(), dir.path()),
      Arc::new(BasicAuth::new("admin", "pw")),
    );

    let response = app
      .clone()
      .oneshot(Request::get("/").body(Body::empty()).unwrap())
      .await
      .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(response.headers().contains_key(header::WWW_AUTHENTICATE));

    let response = app
      .oneshot(
        Request::get("/")
          .header(
            header::AUTHORIZATION,
            format!("Basic {}", STANDARD.encode("admin:pw")),
          )
          .body(Body::empty())
          .unwrap(),
      )
      .await
      .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
  }

  impl AppState<StubModel> {
    fn task_model_calls(&self) -> usize {
      self.task.model().calls.load(std::sync::atomic::Ordering::SeqCst)
    }
  }
}
