//! The classifier capability: documents in, [`Verdict`] out.

use std::sync::Arc;

use async_trait::async_trait;

use crate::{BoxError, case::Document, verdict::Verdict};

/// Maps the documents of one case to a structured verdict.
///
/// Implementations are external (an LLM, a rules engine, a fake in tests);
/// failures are opaque to the pipeline and retried by the queue.
#[async_trait]
pub trait Classifier: Send + Sync {
  async fn classify(&self, documents: &[Document]) -> Result<Verdict, BoxError>;
}

#[async_trait]
impl<C: Classifier + ?Sized> Classifier for Arc<C> {
  async fn classify(&self, documents: &[Document]) -> Result<Verdict, BoxError> {
    (**self).classify(documents).await
  }
}
