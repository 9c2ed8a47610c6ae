//! Text extraction through a hosted layout-analysis service.
//!
//! A document is submitted once; the service answers `202 Accepted` with an
//! `Operation-Location` that is polled until the analysis settles.

mod azure;
pub mod error;

use async_trait::async_trait;
use bytes::Bytes;

pub use azure::{AzureDocIntel, OcrConfig};
pub use error::{Error, Result};

/// Turns document bytes into text.
#[async_trait]
pub trait TextExtractor: Send + Sync {
  /// Extract the text of `bytes`, whose MIME type is `mime_type`. Dropping
  /// the future abandons the extraction.
  async fn extract_text(&self, bytes: Bytes, mime_type: &str) -> Result<String>;
}

#[async_trait]
impl<T: TextExtractor + ?Sized> TextExtractor for std::sync::Arc<T> {
  async fn extract_text(&self, bytes: Bytes, mime_type: &str) -> Result<String> {
    (**self).extract_text(bytes, mime_type).await
  }
}
