//! API error type and [`axum::response::IntoResponse`] implementation.

use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use fila_core::BoxError;
use serde_json::json;
use thiserror::Error;

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error("not found: {0}")]
  NotFound(String),

  #[error("conflict: {0}")]
  Conflict(String),

  #[error("bad request: {0}")]
  BadRequest(String),

  #[error("unavailable: {0}")]
  Unavailable(String),

  #[error("internal error: {0}")]
  Internal(#[source] BoxError),
}

impl From<fila_core::Error> for ApiError {
  fn from(err: fila_core::Error) -> Self {
    if err.is_not_found() {
      Self::NotFound(err.to_string())
    } else if err.is_conflict() {
      Self::Conflict(err.to_string())
    } else {
      Self::Internal(err.into())
    }
  }
}

impl From<fila_analysis::Error> for ApiError {
  fn from(err: fila_analysis::Error) -> Self {
    match err {
      fila_analysis::Error::Core(e) => e.into(),
      other => Self::Internal(other.into()),
    }
  }
}

impl From<fila_cms::Error> for ApiError {
  fn from(err: fila_cms::Error) -> Self { Self::Internal(err.into()) }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let status = match &self {
      ApiError::NotFound(_) => StatusCode::NOT_FOUND,
      ApiError::Conflict(_) => StatusCode::CONFLICT,
      ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
      ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
      ApiError::Internal(e) => {
        tracing::error!(error = %e, "request failed");
        StatusCode::INTERNAL_SERVER_ERROR
      }
    };
    (status, Json(json!({ "error": self.to_string() }))).into_response()
  }
}
