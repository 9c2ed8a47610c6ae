//! The [`Worker`] capability and the per-kind registry.

use std::{collections::HashMap, marker::PhantomData, sync::Arc};

use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use fila_core::{BoxError, job::JobArgs};

use crate::{Error, Result};

/// What a running job can see about itself.
#[derive(Debug, Clone)]
pub struct JobContext {
  pub id:           i64,
  /// 1-based; includes the current run.
  pub attempt:      u32,
  pub max_attempts: u32,
  /// Cancelled when the runner shuts down.
  pub cancel:       CancellationToken,
}

impl JobContext {
  /// Whether a retryable failure of this run discards the job.
  pub fn is_final_attempt(&self) -> bool { self.attempt >= self.max_attempts }
}

/// How a job failed.
#[derive(Debug, Error)]
pub enum WorkError {
  /// Transient; the job is retried with backoff until it runs out of
  /// attempts.
  #[error("{0}")]
  Retry(#[source] BoxError),

  /// Permanent; the job is dropped and never retried.
  #[error("job cancelled: {0}")]
  Cancel(#[source] BoxError),
}

impl WorkError {
  pub fn retry(err: impl Into<BoxError>) -> Self { Self::Retry(err.into()) }

  pub fn cancel(err: impl Into<BoxError>) -> Self { Self::Cancel(err.into()) }
}

/// Executes jobs of one kind.
#[async_trait]
pub trait Worker<A: JobArgs>: Send + Sync + 'static {
  async fn work(&self, ctx: &JobContext, args: A) -> Result<(), WorkError>;
}

// ─── Registry ────────────────────────────────────────────────────────────────

#[async_trait]
trait ErasedWorker: Send + Sync {
  async fn work(&self, ctx: &JobContext, args: serde_json::Value) -> Result<(), WorkError>;
}

struct Typed<A, W> {
  worker: W,
  _args:  PhantomData<fn() -> A>,
}

#[async_trait]
impl<A: JobArgs, W: Worker<A>> ErasedWorker for Typed<A, W> {
  async fn work(&self, ctx: &JobContext, args: serde_json::Value) -> Result<(), WorkError> {
    // Args that no longer decode will never succeed.
    let args: A = serde_json::from_value(args).map_err(WorkError::cancel)?;
    self.worker.work(ctx, args).await
  }
}

/// Job kind → worker. Filled before the runner starts.
#[derive(Default, Clone)]
pub struct Workers {
  by_kind: HashMap<&'static str, Arc<dyn ErasedWorker>>,
}

impl Workers {
  pub fn new() -> Self { Self::default() }

  /// Register `worker` for jobs of kind `A::KIND`.
  pub fn add<A: JobArgs, W: Worker<A>>(&mut self, worker: W) -> Result<()> {
    if self.by_kind.contains_key(A::KIND) {
      return Err(Error::DuplicateWorker(A::KIND));
    }
    self.by_kind.insert(
      A::KIND,
      Arc::new(Typed {
        worker,
        _args: PhantomData::<fn() -> A>,
      }),
    );
    Ok(())
  }

  pub fn kinds(&self) -> Vec<&'static str> {
    let mut kinds: Vec<_> = self.by_kind.keys().copied().collect();
    kinds.sort_unstable();
    kinds
  }

  pub(crate) async fn work(
    &self,
    kind: &str,
    ctx: &JobContext,
    args: serde_json::Value,
  ) -> Result<(), WorkError> {
    match self.by_kind.get(kind) {
      Some(worker) => worker.work(ctx, args).await,
      None => Err(WorkError::cancel(format!("no worker registered for {kind:?}"))),
    }
  }
}
