//! [`AnalysisService`] orchestrates one case's analysis.

use std::{collections::HashSet, sync::Arc};

use chrono::Utc;
use fila_cms::Cms;
use fila_core::{
  case::{Case, Document, NewCase, NewDocument, ProcessingStatus},
  classify::Classifier,
  hook::AnalyzeHook,
  job::Enqueuer,
  store::{CaseRecords, CaseStore, CaseTx},
  verdict::Verdict,
};
use fila_ocr::TextExtractor;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::{AnalyzeCaseArgs, DocumentFetcher, Error, FetchedDocument, Result};

/// Ingests, classifies and persists cases.
///
/// Hooks are registered with [`register_hook`](Self::register_hook) before
/// the service is shared with the job runner; they run in registration order
/// inside the transaction that records the verdict.
pub struct AnalysisService<S: CaseStore, Q> {
  store:      S,
  queue:      Q,
  cms:        Arc<dyn Cms>,
  fetcher:    DocumentFetcher,
  classifier: Arc<dyn Classifier>,
  hooks:      Vec<Arc<dyn AnalyzeHook<S::Tx>>>,
}

impl<S, Q> AnalysisService<S, Q>
where
  S: CaseStore,
  Q: Enqueuer<S::Tx>,
{
  pub fn new(
    store: S,
    queue: Q,
    cms: Arc<dyn Cms>,
    ocr: Arc<dyn TextExtractor>,
    classifier: Arc<dyn Classifier>,
  ) -> Self {
    let fetcher = DocumentFetcher::new(cms.clone(), ocr);
    Self {
      store,
      queue,
      cms,
      fetcher,
      classifier,
      hooks: Vec::new(),
    }
  }

  pub fn with_fetcher(mut self, fetcher: DocumentFetcher) -> Self {
    self.fetcher = fetcher;
    self
  }

  pub fn register_hook(&mut self, hook: impl AnalyzeHook<S::Tx> + 'static) {
    tracing::debug!(hook = hook.name(), "registered analysis hook");
    self.hooks.push(Arc::new(hook));
  }

  pub fn store(&self) -> &S { &self.store }

  // ─── Triggers ────────────────────────────────────────────────────────────

  /// Register the case `number` and schedule its analysis. The case row and
  /// the job commit together.
  pub async fn trigger(&self, number: &str) -> Result<Case> {
    match self.store.get_case_by_number(number).await {
      Ok(_) => return Err(fila_core::Error::CaseNumberTaken(number.to_owned()).into()),
      Err(e) if e.is_not_found() => {}
      Err(e) => return Err(e.into()),
    }

    let info = self.cms.resolve_case(number).await?;

    let tx = self.store.begin().await?;
    let case = tx
      .save_case(NewCase {
        number:      number.to_owned(),
        unit:        info.unit,
        access_link: info.access_link,
      })
      .await?;
    let enqueued = self
      .queue
      .enqueue_tx(&tx, &AnalyzeCaseArgs {
        case_id: case.case_id,
      })
      .await?;
    tx.commit().await?;

    tracing::info!(case_id = %case.case_id, number, enqueued, "case registered");
    Ok(case)
  }

  /// Schedule another analysis of a stored case. Returns `false` when one is
  /// already scheduled; the case is left untouched in that case.
  pub async fn trigger_reanalysis(&self, case_id: Uuid) -> Result<bool> {
    let tx = self.store.begin().await?;
    let mut case = tx.get_case(case_id).await?;
    let enqueued = self
      .queue
      .enqueue_tx(&tx, &AnalyzeCaseArgs { case_id })
      .await?;
    if enqueued {
      case.status = ProcessingStatus::Pending;
      tx.update_case(&mut case).await?;
    }
    tx.commit().await?;

    tracing::info!(%case_id, enqueued, "reanalysis requested");
    Ok(enqueued)
  }

  // ─── Reads ───────────────────────────────────────────────────────────────

  pub async fn get_case(&self, case_id: Uuid) -> Result<Case> {
    Ok(self.store.get_case(case_id).await?)
  }

  pub async fn get_case_by_number(&self, number: &str) -> Result<Case> {
    Ok(self.store.get_case_by_number(number).await?)
  }

  /// Documents of an existing case; a missing case is `NotFound`.
  pub async fn list_documents(&self, case_id: Uuid) -> Result<Vec<Document>> {
    self.store.get_case(case_id).await?;
    Ok(self.store.list_documents(case_id).await?)
  }

  // ─── Analysis ────────────────────────────────────────────────────────────

  /// Run the whole analysis of one case. On failure after the case was
  /// marked in progress it is put back to `PENDING` before the error is
  /// returned.
  pub async fn analyze(&self, case_id: Uuid, cancel: &CancellationToken) -> Result<()> {
    let mut case = self.store.get_case(case_id).await?;

    case.status = ProcessingStatus::InProgress;
    if let Err(e) = self.store.update_case(&mut case).await {
      tracing::warn!(%case_id, error = %e, "failed to mark case in progress");
    }

    match self.run(&case, cancel).await {
      Ok(()) => {
        tracing::info!(%case_id, "analysis committed");
        Ok(())
      }
      Err(e) => {
        self.set_status(case_id, ProcessingStatus::Pending).await;
        Err(e)
      }
    }
  }

  /// Best-effort status write outside any transaction.
  pub async fn set_status(&self, case_id: Uuid, status: ProcessingStatus) {
    let result = async {
      let mut case = self.store.get_case(case_id).await?;
      case.status = status;
      self.store.update_case(&mut case).await
    }
    .await;
    if let Err(e) = result {
      tracing::warn!(%case_id, %status, error = %e, "failed to update case status");
    }
  }

  async fn run(&self, case: &Case, cancel: &CancellationToken) -> Result<()> {
    let rows = self.cms.list_documents(&case.access_link).await?;

    let stored: HashSet<String> = self
      .store
      .list_documents(case.case_id)
      .await?
      .into_iter()
      .map(|d| d.number)
      .collect();
    let missing: Vec<String> = rows
      .into_iter()
      .map(|row| row.number)
      .filter(|number| !stored.contains(number))
      .collect();
    tracing::debug!(
      case_id = %case.case_id,
      stored = stored.len(),
      missing = missing.len(),
      "fetching documents"
    );

    for doc in self.fetcher.fetch(missing, cancel).await? {
      self.persist_document(case.case_id, doc).await?;
    }

    let documents = self.store.list_documents(case.case_id).await?;
    let verdict = self
      .classifier
      .classify(&documents)
      .await
      .map_err(Error::Classifier)?;

    self.commit_verdict(case.case_id, &verdict, &documents).await
  }

  /// Store one fetched document in its own transaction. A number that is
  /// already stored is left as is.
  async fn persist_document(&self, case_id: Uuid, doc: FetchedDocument) -> Result<()> {
    let input = NewDocument {
      kind: doc.metadata.kind(),
      unit: doc.metadata.issuing_unit.abbreviation.clone(),
      access_link: doc.metadata.access_link.clone(),
      metadata: serde_json::to_value(&doc.metadata)?,
      number: doc.number,
      case_id,
      mime_type: doc.mime_type,
      text: doc.text,
    };

    let tx = self.store.begin().await?;
    match tx.save_document(input).await {
      Ok(saved) => {
        tx.commit().await?;
        tracing::debug!(%case_id, number = %saved.number, "document stored");
      }
      Err(fila_core::Error::DocumentNumberTaken(number)) => {
        tx.rollback().await?;
        tracing::debug!(%case_id, %number, "document already stored");
      }
      Err(e) => return Err(e.into()),
    }
    Ok(())
  }

  /// Record the verdict, run every hook and mark the case `SUCCESS`, all in
  /// one transaction.
  async fn commit_verdict(
    &self,
    case_id: Uuid,
    verdict: &Verdict,
    documents: &[Document],
  ) -> Result<()> {
    let tx = self.store.begin().await?;
    let mut case = tx.get_case(case_id).await?;
    case.classifier_metadata = Some(serde_json::to_value(verdict)?);
    case.analysed_at = Some(Utc::now());
    case.classification = Some(verdict.is_retirement);
    tx.update_case(&mut case).await?;

    for hook in &self.hooks {
      hook
        .on_analyze_complete(&tx, &case, documents)
        .await
        .map_err(|source| Error::Hook {
          hook: hook.name(),
          source,
        })?;
    }

    case.status = ProcessingStatus::Success;
    tx.update_case(&mut case).await?;
    tx.commit().await?;
    Ok(())
  }
}
