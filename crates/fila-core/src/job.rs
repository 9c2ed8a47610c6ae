//! Durable job contracts: what a job is, how it is keyed for uniqueness, and
//! what a queue backend must provide.

use std::{future::Future, time::Duration};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::Result;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 25;

/// Longest delay between two attempts of a job.
pub const MAX_BACKOFF: Duration = Duration::from_secs(60 * 60);

// ─── Args ────────────────────────────────────────────────────────────────────

/// The payload of a job kind.
pub trait JobArgs: Serialize + DeserializeOwned + Send + Sync + 'static {
  /// Stable identifier of the job kind, stored with every row.
  const KIND: &'static str;

  /// When set, inserting a job whose kind and args match a live job created
  /// within this window is a no-op.
  fn unique_window() -> Option<Duration> { None }

  fn max_attempts() -> u32 { DEFAULT_MAX_ATTEMPTS }
}

/// A job ready to be inserted.
#[derive(Debug, Clone, PartialEq)]
pub struct NewJob {
  pub kind:          String,
  pub args:          serde_json::Value,
  /// `kind` followed by the canonical JSON of `args`; set only for kinds with
  /// a uniqueness window.
  pub unique_key:    Option<String>,
  pub unique_window: Option<Duration>,
  pub max_attempts:  u32,
}

impl NewJob {
  pub fn from_args<A: JobArgs>(args: &A) -> Result<Self> {
    let args = serde_json::to_value(args)?;
    let unique_window = A::unique_window();
    let unique_key = unique_window.map(|_| format!("{}:{}", A::KIND, args));
    Ok(Self {
      kind: A::KIND.to_owned(),
      args,
      unique_key,
      unique_window,
      max_attempts: A::max_attempts(),
    })
  }
}

// ─── Records ─────────────────────────────────────────────────────────────────

/// ```text
/// available ──claim──▶ running ──ok──────▶ completed
///     ▲                   │ ──cancel──▶ cancelled
///     │                   │ ──err, last─▶ discarded
///     └──── retryable ◀───┘ ──err
/// ```
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
  strum::AsRefStr,
  strum::EnumString,
  strum::Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum JobState {
  Available,
  Running,
  Retryable,
  Completed,
  Cancelled,
  Discarded,
}

impl JobState {
  /// Whether the job will never run again.
  pub fn is_final(self) -> bool {
    matches!(self, Self::Completed | Self::Cancelled | Self::Discarded)
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
  pub id:           i64,
  pub kind:         String,
  pub args:         serde_json::Value,
  pub state:        JobState,
  /// Number of times the job has been claimed, including the current run.
  pub attempt:      u32,
  pub max_attempts: u32,
  pub scheduled_at: DateTime<Utc>,
  pub created_at:   DateTime<Utc>,
  pub attempted_at: Option<DateTime<Utc>>,
  pub finalized_at: Option<DateTime<Utc>>,
  pub last_error:   Option<String>,
}

/// Delay before the next attempt: `attempt⁴` seconds, capped at
/// [`MAX_BACKOFF`].
pub fn retry_backoff(attempt: u32) -> Duration {
  let secs = u64::from(attempt).saturating_pow(4);
  Duration::from_secs(secs).min(MAX_BACKOFF)
}

// ─── Backend ─────────────────────────────────────────────────────────────────

/// Persistence of the job table, driven by the runner.
pub trait JobBackend: Send + Sync + Clone + 'static {
  /// Insert outside any caller transaction. Returns `None` when a unique job
  /// already exists.
  fn insert(
    &self,
    job: NewJob,
  ) -> impl Future<Output = Result<Option<JobRecord>>> + Send + '_;

  /// Atomically move up to `limit` due jobs of the given kinds to `running`,
  /// incrementing their attempt.
  fn claim<'a>(
    &'a self,
    kinds: &'a [&'static str],
    limit: usize,
  ) -> impl Future<Output = Result<Vec<JobRecord>>> + Send + 'a;

  fn complete(&self, id: i64) -> impl Future<Output = Result<()>> + Send + '_;

  /// Schedule another attempt at `at`.
  fn retry(
    &self,
    id: i64,
    error: String,
    at: DateTime<Utc>,
  ) -> impl Future<Output = Result<()>> + Send + '_;

  /// Drop the job permanently on the worker's request.
  fn cancel(
    &self,
    id: i64,
    error: String,
  ) -> impl Future<Output = Result<()>> + Send + '_;

  /// Drop the job permanently after its last attempt failed.
  fn discard(
    &self,
    id: i64,
    error: String,
  ) -> impl Future<Output = Result<()>> + Send + '_;

  /// Make jobs stuck in `running` (left behind by a crashed process)
  /// available again. Returns how many were rescued.
  fn rescue_running(&self) -> impl Future<Output = Result<usize>> + Send + '_;

  fn get(&self, id: i64) -> impl Future<Output = Result<JobRecord>> + Send + '_;

  /// All jobs of a kind, oldest first.
  fn list<'a>(
    &'a self,
    kind: &'a str,
  ) -> impl Future<Output = Result<Vec<JobRecord>>> + Send + 'a;
}

/// Inserts jobs inside a caller's transaction `Tx`, so the job exists iff the
/// caller's writes commit.
pub trait Enqueuer<Tx>: Send + Sync {
  /// Returns `false` when the job was deduplicated and nothing was scheduled.
  fn enqueue_tx<'a, A: JobArgs>(
    &'a self,
    tx: &'a Tx,
    args: &'a A,
  ) -> impl Future<Output = Result<bool>> + Send + 'a;
}
