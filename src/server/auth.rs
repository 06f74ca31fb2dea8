// 该文件是 Kanjian （看见） 项目的一部分。
// src/server/auth.rs - 请求认证
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

use axum::{
  extract::{Request, State},
  http::{HeaderMap, HeaderValue, StatusCode, header},
  middleware::Next,
  response::{IntoResponse, Response},
};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use subtle::ConstantTimeEq;
use tracing::warn;

const REALM: &str = "kanjian";

/// 每个请求的允许/拒绝判断
pub trait Authenticator: Send + Sync {
  fn authorize(&self, headers: &HeaderMap) -> bool;

  fn realm(&self) -> &str {
    REALM
  }
}

/// 未配置凭据时放行所有请求
pub struct AllowAll;

impl Authenticator for AllowAll {
  fn authorize(&self, _headers: &HeaderMap) -> bool {
    true
  }
}

/// HTTP Basic 认证
pub struct BasicAuth {
  user: String,
  password: String,
}

impl BasicAuth {
  pub fn new(user: impl Into<String>, password: impl Into<String>) -> Self {
    Self {
      user: user.into(),
      password: password.into(),
    }
  }

  fn credentials(headers: &HeaderMap) -> Option<(String, String)> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, encoded) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
      return None;
    }
    let decoded = String::from_utf8(STANDARD.decode(encoded.trim()).ok()?).ok()?;
    let (user, password) = decoded.split_once(':')?;
    Some((user.to_string(), password.to_string()))
  }
}

impl Authenticator for BasicAuth {
  fn authorize(&self, headers: &HeaderMap) -> bool {
    // 用户名与密码都做常量时间比较，两项都比较完再合并结果
    Self::credentials(headers).is_some_and(|(user, password)| {
      let user_ok = user.as_bytes().ct_eq(self.user.as_bytes());
      let password_ok = password.as_bytes().ct_eq(self.password.as_bytes());
      bool::from(user_ok & password_ok)
    })
  }
}

/// 根据参数选择认证方式
pub fn from_credentials(user: Option<String>, password: Option<String>) -> Arc<dyn Authenticator> {
  match (user, password) {
    (Some(user), Some(password)) => Arc::new(BasicAuth::new(user, password)),
    _ => Arc::new(AllowAll),
  }
}

pub async fn require_auth(
  State(auth): State<Arc<dyn Authenticator>>,
  request: Request,
  next: Next,
) -> Response {
  if auth.authorize(request.headers()) {
    return next.run(request).await;
  }

  warn!("拒绝未认证的请求: {} {}", request.method(), request.uri());
  let challenge = format!("Basic realm=\"{}\"", auth.realm());
  let mut response = (StatusCode::UNAUTHORIZED, "Unauthorized").into_response();
  if let Ok(value) = HeaderValue::from_str(&challenge) {
    response
      .headers_mut()
      .insert(header::WWW_AUTHENTICATE, value);
  }
  response
}
