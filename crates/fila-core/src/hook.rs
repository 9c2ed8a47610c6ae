//! Analysis hooks: side effects that run inside the analysis transaction.

use async_trait::async_trait;

use crate::{
  Result,
  case::{Case, Document},
  store::CaseRecords,
};

/// Observes the successful analysis of a case.
///
/// Hooks are registered once, in order, before the first job runs. Each is
/// invoked with the open transaction of the analysis; every write must go
/// through `tx`. Returning an error rolls back the whole transaction,
/// including the writes of hooks that ran before it, and the job is retried.
#[async_trait]
pub trait AnalyzeHook<Tx: CaseRecords>: Send + Sync {
  /// Short name used in logs.
  fn name(&self) -> &'static str;

  async fn on_analyze_complete(
    &self,
    tx: &Tx,
    case: &Case,
    documents: &[Document],
  ) -> Result<()>;
}
