use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use fila_core::{
  case::ProcessingStatus,
  job::{Enqueuer, JobArgs},
  store::CaseStore,
};
use fila_queue::{JobContext, WorkError, Worker};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::AnalysisService;

/// Analyse one stored case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalyzeCaseArgs {
  pub case_id: Uuid,
}

impl JobArgs for AnalyzeCaseArgs {
  const KIND: &'static str = "analyze:case";

  fn unique_window() -> Option<Duration> { Some(Duration::from_secs(60 * 60)) }
}

/// Runs [`AnalysisService::analyze`] for queued cases.
///
/// A missing case cancels the job. Any other failure is retried; when the
/// attempt was the last one the case is marked `FAILURE` first. A job
/// interrupted by shutdown leaves the case `PENDING` for the retry.
pub struct AnalyzeCaseWorker<S: CaseStore, Q> {
  service: Arc<AnalysisService<S, Q>>,
}

impl<S: CaseStore, Q> AnalyzeCaseWorker<S, Q> {
  pub fn new(service: Arc<AnalysisService<S, Q>>) -> Self { Self { service } }
}

#[async_trait]
impl<S, Q> Worker<AnalyzeCaseArgs> for AnalyzeCaseWorker<S, Q>
where
  S: CaseStore,
  Q: Enqueuer<S::Tx> + 'static,
{
  async fn work(&self, ctx: &JobContext, args: AnalyzeCaseArgs) -> Result<(), WorkError> {
    let case_id = args.case_id;
    tracing::info!(%case_id, "analysing case");

    match self.service.analyze(case_id, &ctx.cancel).await {
      Ok(()) => Ok(()),
      Err(e) if e.is_not_found() => {
        self.service.set_status(case_id, ProcessingStatus::Failure).await;
        Err(WorkError::cancel(e))
      }
      Err(e) => {
        // A shutdown interrupting the job is not one of its failures.
        if ctx.is_final_attempt() && !ctx.cancel.is_cancelled() {
          self.service.set_status(case_id, ProcessingStatus::Failure).await;
        }
        Err(WorkError::retry(e))
      }
    }
  }
}
