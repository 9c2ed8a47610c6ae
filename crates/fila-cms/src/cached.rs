use std::time::Duration;

use async_trait::async_trait;
use fila_core::cache::{Cache, remember_json};

use crate::{CaseInfo, Cms, DocumentMetadata, DocumentRow, Download, Result, UnitInfo};

const UNITS_KEY: &str = "cms:units";
const UNITS_TTL: Duration = Duration::from_secs(24 * 60 * 60);
const DOCUMENTS_TTL: Duration = Duration::from_secs(12 * 60 * 60);

fn documents_key(number: &str) -> String { format!("cms:documents:{number}") }

/// A [`Cms`] that memoises unit listings and document metadata.
///
/// Faults are never cached; the next call asks the CMS again.
#[derive(Clone)]
pub struct CachedCms<C, K> {
  inner: C,
  cache: K,
}

impl<C, K> CachedCms<C, K> {
  pub fn new(inner: C, cache: K) -> Self { Self { inner, cache } }

  pub fn inner(&self) -> &C { &self.inner }
}

#[async_trait]
impl<C: Cms, K: Cache> Cms for CachedCms<C, K> {
  async fn resolve_case(&self, number: &str) -> Result<CaseInfo> {
    self.inner.resolve_case(number).await
  }

  async fn list_documents(&self, access_link: &str) -> Result<Vec<DocumentRow>> {
    self.inner.list_documents(access_link).await
  }

  async fn fetch_document_metadata(&self, number: &str) -> Result<DocumentMetadata> {
    let inner = &self.inner;
    let meta = remember_json(&self.cache, &documents_key(number), DOCUMENTS_TTL, move || async move {
      inner.fetch_document_metadata(number).await.map_err(Into::into)
    })
    .await?;
    Ok(meta)
  }

  async fn list_units(&self) -> Result<Vec<UnitInfo>> {
    let inner = &self.inner;
    let units = remember_json(&self.cache, UNITS_KEY, UNITS_TTL, move || async move {
      inner.list_units().await.map_err(Into::into)
    })
    .await?;
    Ok(units)
  }

  async fn download(&self, link: &str) -> Result<Download> { self.inner.download(link).await }
}

#[cfg(test)]
mod tests {
  use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
  };

  use fila_cache::MemoryCache;

  use super::*;
  use crate::{Error, RemoteFault, Series};

  #[derive(Default)]
  struct CountingCms {
    metadata_calls: AtomicUsize,
    unit_calls:     AtomicUsize,
  }

  #[async_trait]
  impl Cms for CountingCms {
    async fn resolve_case(&self, _number: &str) -> Result<CaseInfo> {
      Err(Error::Malformed("unused".into()))
    }

    async fn list_documents(&self, _access_link: &str) -> Result<Vec<DocumentRow>> {
      Ok(Vec::new())
    }

    async fn fetch_document_metadata(&self, number: &str) -> Result<DocumentMetadata> {
      self.metadata_calls.fetch_add(1, Ordering::SeqCst);
      if number == "cancelled" {
        return Err(Error::Fault(RemoteFault {
          status:  500,
          code:    "Server".into(),
          message: "Documento cancelado.".into(),
          detail:  Vec::new(),
        }));
      }
      Ok(DocumentMetadata {
        formatted_id: number.to_owned(),
        series: Series {
          id:   "1".into(),
          name: "Requerimento".into(),
        },
        ..Default::default()
      })
    }

    async fn list_units(&self) -> Result<Vec<UnitInfo>> {
      self.unit_calls.fetch_add(1, Ordering::SeqCst);
      Ok(vec![UnitInfo {
        id:           "100".into(),
        abbreviation: "AP/01".into(),
        description:  "Aposentadoria".into(),
      }])
    }

    async fn download(&self, _link: &str) -> Result<Download> {
      Err(Error::Malformed("unused".into()))
    }
  }

  fn cached() -> (CachedCms<Arc<CountingCms>, MemoryCache>, Arc<CountingCms>) {
    let inner = Arc::new(CountingCms::default());
    (CachedCms::new(inner.clone(), MemoryCache::new()), inner)
  }

  #[tokio::test]
  async fn metadata_is_loaded_once_per_document() {
    let (cms, inner) = cached();
    let a = cms.fetch_document_metadata("111").await.unwrap();
    let b = cms.fetch_document_metadata("111").await.unwrap();
    cms.fetch_document_metadata("222").await.unwrap();

    assert_eq!(a, b);
    assert_eq!(a.kind(), "Requerimento");
    assert_eq!(inner.metadata_calls.load(Ordering::SeqCst), 2);
  }

  #[tokio::test]
  async fn faults_pass_through_uncached() {
    let (cms, inner) = cached();
    for _ in 0..2 {
      let err = cms.fetch_document_metadata("cancelled").await.unwrap_err();
      assert!(err.is_fault(), "{err}");
    }
    assert_eq!(inner.metadata_calls.load(Ordering::SeqCst), 2);
  }

  #[tokio::test]
  async fn units_are_cached() {
    let (cms, inner) = cached();
    assert_eq!(cms.list_units().await.unwrap().len(), 1);
    assert_eq!(cms.list_units().await.unwrap()[0].abbreviation, "AP/01");
    assert_eq!(inner.unit_calls.load(Ordering::SeqCst), 1);
  }
}
