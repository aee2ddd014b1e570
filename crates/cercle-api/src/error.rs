//! API error type and [`axum::response::IntoResponse`] implementation.

use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error("bad request: {0}")]
  BadRequest(String),

  /// A collaborator failed during an initiation flow. The client may retry.
  #[error("upstream provider failure: {0}")]
  Upstream(String),

  #[error("internal error: {0}")]
  Internal(String),
}

impl From<cercle_engine::Error> for ApiError {
  fn from(err: cercle_engine::Error) -> Self {
    use cercle_engine::Error;
    match err {
      Error::InvalidSignature => {
        Self::BadRequest("invalid webhook signature".to_string())
      }
      Error::Malformed(e) => Self::BadRequest(e.to_string()),
      e @ Error::AmountOutOfBounds { .. } => Self::BadRequest(e.to_string()),
      Error::Provider(e) => Self::Upstream(e.to_string()),
      Error::Store(e) => Self::Internal(e.to_string()),
    }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let (status, message) = match &self {
      ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m.clone()),
      ApiError::Upstream(m) => (StatusCode::BAD_GATEWAY, m.clone()),
      ApiError::Internal(m) => (StatusCode::INTERNAL_SERVER_ERROR, m.clone()),
    };
    (status, Json(json!({ "error": message }))).into_response()
  }
}
