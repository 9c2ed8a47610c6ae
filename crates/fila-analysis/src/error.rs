//! Error types for `fila-analysis`.

use fila_core::{BoxError, cache::CacheError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error(transparent)]
  Core(#[from] fila_core::Error),

  #[error("cms error: {0}")]
  Cms(#[from] fila_cms::Error),

  #[error("ocr error: {0}")]
  Ocr(#[from] fila_ocr::Error),

  #[error("classifier error: {0}")]
  Classifier(#[source] BoxError),

  /// A registered hook rejected the analysis; its transaction was rolled
  /// back.
  #[error("hook {hook} failed: {source}")]
  Hook {
    hook:   &'static str,
    #[source]
    source: fila_core::Error,
  },

  #[error("cache error: {0}")]
  Cache(#[from] CacheError),

  #[error("serialization error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("operation cancelled")]
  Cancelled,
}

impl Error {
  /// Whether the root cause is a missing row.
  pub fn is_not_found(&self) -> bool {
    matches!(self, Self::Core(e) if e.is_not_found())
  }
}

/// Failures of [`LlmClassifier`](crate::LlmClassifier).
#[derive(Debug, Error)]
pub enum LlmError {
  #[error("http error: {0}")]
  Http(#[from] reqwest::Error),

  #[error("unexpected llm response ({status}): {body}")]
  Status { status: u16, body: String },

  #[error("llm returned no content")]
  EmptyResponse,

  #[error("llm returned an invalid verdict: {0}")]
  InvalidVerdict(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
