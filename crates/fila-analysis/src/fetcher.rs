//! Bounded fan-out over document numbers: metadata, download, OCR.

use std::sync::Arc;

use fila_cms::{Cms, DocumentMetadata};
use fila_ocr::TextExtractor;
use futures::{StreamExt as _, TryStreamExt as _, stream};
use tokio_util::sync::CancellationToken;

use crate::{Error, Result};

/// Most documents fetched at once.
pub const DEFAULT_CONCURRENCY: usize = 5;

/// A document downloaded from the CMS with its text extracted.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedDocument {
  pub number:    String,
  pub text:      String,
  pub mime_type: String,
  pub metadata:  DocumentMetadata,
}

#[derive(Clone)]
pub struct DocumentFetcher {
  cms:         Arc<dyn Cms>,
  ocr:         Arc<dyn TextExtractor>,
  concurrency: usize,
}

impl DocumentFetcher {
  pub fn new(cms: Arc<dyn Cms>, ocr: Arc<dyn TextExtractor>) -> Self {
    Self {
      cms,
      ocr,
      concurrency: DEFAULT_CONCURRENCY,
    }
  }

  pub fn with_concurrency(mut self, concurrency: usize) -> Self {
    self.concurrency = concurrency.max(1);
    self
  }

  /// Fetch every number, at most `concurrency` at a time, and return them in
  /// input order. Documents the CMS refuses with a fault are skipped. The
  /// first other failure to finish drops the work still in flight and is
  /// returned.
  pub async fn fetch(
    &self,
    numbers: Vec<String>,
    cancel: &CancellationToken,
  ) -> Result<Vec<FetchedDocument>> {
    let batch = stream::iter(numbers.into_iter().enumerate())
      .map(|(index, number)| {
        let fetcher = self.clone();
        async move {
          let doc = fetcher.fetch_one(number).await;
          doc.map(|doc| doc.map(|doc| (index, doc)))
        }
      })
      .buffer_unordered(self.concurrency)
      .try_filter_map(|doc| async move { Ok(doc) })
      .try_collect::<Vec<_>>();

    let mut docs = tokio::select! {
      biased;
      _ = cancel.cancelled() => return Err(Error::Cancelled),
      docs = batch => docs?,
    };
    docs.sort_unstable_by_key(|(index, _)| *index);
    Ok(docs.into_iter().map(|(_, doc)| doc).collect())
  }

  async fn fetch_one(&self, number: String) -> Result<Option<FetchedDocument>> {
    let metadata = match self.cms.fetch_document_metadata(&number).await {
      Ok(metadata) => metadata,
      Err(e) if e.is_fault() => {
        tracing::warn!(%number, error = %e, "cms refused document; skipping");
        return Ok(None);
      }
      Err(e) => return Err(e.into()),
    };

    let download = self.cms.download(&metadata.access_link).await?;
    let text = self
      .ocr
      .extract_text(download.bytes, &download.content_type)
      .await?;
    tracing::debug!(%number, chars = text.len(), "document extracted");

    Ok(Some(FetchedDocument {
      number,
      text,
      mime_type: download.content_type,
      metadata,
    }))
  }
}
