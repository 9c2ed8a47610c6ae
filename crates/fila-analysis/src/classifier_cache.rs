use std::time::Duration;

use async_trait::async_trait;
use fila_core::{
  BoxError,
  cache::{Cache, remember_json},
  case::Document,
  classify::Classifier,
  verdict::Verdict,
};
use sha2::{Digest, Sha256};

use crate::render_documents;

const VERDICT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Cache key of the verdict for exactly these documents.
fn verdict_key(documents: &[Document]) -> String {
  let digest = Sha256::digest(render_documents(documents).as_bytes());
  format!("classifier:verdict:{}", hex::encode(digest))
}

/// A [`Classifier`] that remembers verdicts by the content it was shown.
/// Failed classifications are not cached.
pub struct CachedClassifier<C, K> {
  inner: C,
  cache: K,
}

impl<C, K> CachedClassifier<C, K> {
  pub fn new(inner: C, cache: K) -> Self { Self { inner, cache } }
}

#[async_trait]
impl<C: Classifier, K: Cache> Classifier for CachedClassifier<C, K> {
  async fn classify(&self, documents: &[Document]) -> Result<Verdict, BoxError> {
    let inner = &self.inner;
    let verdict = remember_json(&self.cache, &verdict_key(documents), VERDICT_TTL, move || {
      inner.classify(documents)
    })
    .await?;
    Ok(verdict)
  }
}

#[cfg(test)]
mod tests {
  use chrono::Utc;
  use fila_cache::MemoryCache;
  use uuid::Uuid;

  use super::*;
  use crate::testing::{FakeClassifier, negative_verdict, positive_verdict};

  fn document(number: &str, text: &str) -> Document {
    Document {
      document_id: 1,
      number: number.into(),
      case_id: Uuid::nil(),
      kind: "Requerimento".into(),
      unit: "AP/01".into(),
      access_link: String::new(),
      mime_type: "application/pdf".into(),
      text: text.into(),
      metadata: serde_json::Value::Null,
      created_at: Utc::now(),
      updated_at: Utc::now(),
    }
  }

  #[tokio::test]
  async fn same_documents_classify_once() {
    let cached = CachedClassifier::new(
      std::sync::Arc::new(FakeClassifier::answering(positive_verdict())),
      MemoryCache::new(),
    );
    let docs = vec![document("1", "texto")];

    let a = cached.classify(&docs).await.unwrap();
    let b = cached.classify(&docs).await.unwrap();
    assert_eq!(a, b);
    assert_eq!(cached.inner.calls(), 1);

    cached.classify(&[document("1", "outro texto")]).await.unwrap();
    assert_eq!(cached.inner.calls(), 2);
  }

  #[tokio::test]
  async fn failures_are_not_cached() {
    let cached = CachedClassifier::new(FakeClassifier::failing("rate limited"), MemoryCache::new());
    let docs = vec![document("1", "texto")];

    assert!(cached.classify(&docs).await.is_err());
    cached.inner.answer(negative_verdict());
    assert!(!cached.classify(&docs).await.unwrap().is_retirement);
    assert_eq!(cached.inner.calls(), 2);
  }

  #[test]
  fn key_depends_on_content() {
    let a = verdict_key(&[document("1", "a")]);
    assert!(a.starts_with("classifier:verdict:"));
    assert_eq!(a.len(), "classifier:verdict:".len() + 64);
    assert_ne!(a, verdict_key(&[document("1", "b")]));
  }
}
