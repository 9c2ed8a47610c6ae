//! [`Runner`] polls the job table and executes due jobs.

use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::Instrument as _;

use fila_core::job::{JobBackend, JobRecord, retry_backoff};

use crate::{JobContext, Result, WorkError, Workers};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);
pub const DEFAULT_MAX_WORKERS: usize = 100;
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Shortest poll interval the runner uses; a zero interval is raised to it.
const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

#[derive(Debug, Clone)]
pub struct RunnerConfig {
  pub poll_interval:  Duration,
  /// Most jobs executing at once.
  pub max_workers:    usize,
  /// How long a running job may keep going after shutdown is requested, so
  /// workers that watch their token can clean up. Jobs still running after
  /// it are dropped and rescheduled.
  pub shutdown_grace: Duration,
}

impl Default for RunnerConfig {
  fn default() -> Self {
    Self {
      poll_interval:  DEFAULT_POLL_INTERVAL,
      max_workers:    DEFAULT_MAX_WORKERS,
      shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
    }
  }
}

/// What happened to a job after one execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
  Completed,
  Retried { at: DateTime<Utc> },
  Cancelled,
  Discarded,
}

pub struct Runner<B> {
  backend: B,
  workers: Arc<Workers>,
  config:  RunnerConfig,
}

impl<B: JobBackend> Runner<B> {
  pub fn new(backend: B, workers: Workers, config: RunnerConfig) -> Self {
    Self {
      backend,
      workers: Arc::new(workers),
      config,
    }
  }

  /// Run until `shutdown` is cancelled, then wait for in-flight jobs. Jobs
  /// still running when shutdown is requested see their context token
  /// cancelled, get [`RunnerConfig::shutdown_grace`] to return and are
  /// rescheduled.
  pub async fn run(&self, shutdown: CancellationToken) -> Result<()> {
    let rescued = self.backend.rescue_running().await?;
    if rescued > 0 {
      tracing::warn!(rescued, "rescued jobs left running by a previous process");
    }

    let kinds = self.workers.kinds();
    tracing::info!(?kinds, max_workers = self.config.max_workers, "job runner started");

    let mut tasks = JoinSet::new();
    let mut ticker = tokio::time::interval(self.config.poll_interval.max(MIN_POLL_INTERVAL));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
      tokio::select! {
        _ = shutdown.cancelled() => break,
        _ = ticker.tick() => {}
      }
      while tasks.try_join_next().is_some() {}

      let free = self.config.max_workers.saturating_sub(tasks.len());
      if free == 0 {
        continue;
      }
      let jobs = match self.backend.claim(&kinds, free).await {
        Ok(jobs) => jobs,
        Err(e) => {
          tracing::error!(error = %e, "failed to claim jobs");
          continue;
        }
      };
      for job in jobs {
        let backend = self.backend.clone();
        let workers = self.workers.clone();
        let cancel = shutdown.child_token();
        let grace = self.config.shutdown_grace;
        tasks.spawn(async move { execute(&backend, &workers, job, cancel, grace).await });
      }
    }

    tracing::info!(in_flight = tasks.len(), "job runner stopping");
    while tasks.join_next().await.is_some() {}
    Ok(())
  }

  /// Claim and execute at most one due job inline. Returns `None` when no
  /// job was due.
  pub async fn work_one(&self) -> Result<Option<(JobRecord, JobOutcome)>> {
    let kinds = self.workers.kinds();
    let Some(job) = self.backend.claim(&kinds, 1).await?.into_iter().next() else {
      return Ok(None);
    };
    let outcome = execute(
      &self.backend,
      &self.workers,
      job.clone(),
      CancellationToken::new(),
      self.config.shutdown_grace,
    )
    .await;
    Ok(Some((job, outcome)))
  }
}

/// Next run time for a job whose `attempt` failed.
fn next_attempt_at(attempt: u32) -> DateTime<Utc> {
  let delay = chrono::Duration::from_std(retry_backoff(attempt)).unwrap_or(chrono::Duration::zero());
  Utc::now() + delay
}

async fn execute<B: JobBackend>(
  backend: &B,
  workers: &Workers,
  job: JobRecord,
  cancel: CancellationToken,
  grace: Duration,
) -> JobOutcome {
  let span = tracing::info_span!("job", job_id = job.id, kind = %job.kind, attempt = job.attempt);
  async move {
    let ctx = JobContext {
      id: job.id,
      attempt: job.attempt,
      max_attempts: job.max_attempts,
      cancel: cancel.clone(),
    };

    let work = workers.work(&job.kind, &ctx, job.args);
    tokio::pin!(work);
    let result = tokio::select! {
      biased;
      result = &mut work => result,
      _ = cancel.cancelled() => match tokio::time::timeout(grace, &mut work).await {
        Ok(result) => result,
        Err(_) => Err(WorkError::retry("runner shut down")),
      },
    };

    let (outcome, recorded) = match result {
      Ok(()) => {
        tracing::info!("job completed");
        (JobOutcome::Completed, backend.complete(job.id).await)
      }
      Err(WorkError::Cancel(e)) => {
        tracing::warn!(error = %e, "job cancelled");
        (JobOutcome::Cancelled, backend.cancel(job.id, e.to_string()).await)
      }
      Err(WorkError::Retry(e)) if ctx.is_final_attempt() => {
        tracing::error!(error = %e, "job discarded after final attempt");
        (JobOutcome::Discarded, backend.discard(job.id, e.to_string()).await)
      }
      Err(WorkError::Retry(e)) => {
        let at = if cancel.is_cancelled() {
          Utc::now()
        } else {
          next_attempt_at(job.attempt)
        };
        tracing::warn!(error = %e, retry_at = %at, "job failed; will retry");
        (JobOutcome::Retried { at }, backend.retry(job.id, e.to_string(), at).await)
      }
    };

    if let Err(e) = recorded {
      tracing::error!(error = %e, "failed to record job outcome");
    }
    outcome
  }
  .instrument(span)
  .await
}

#[cfg(test)]
mod tests {
  use std::sync::Mutex;

  use async_trait::async_trait;
  use fila_core::job::{JobArgs, JobState, NewJob};
  use fila_store_sqlite::{SqliteQueue, SqliteStore};
  use serde::{Deserialize, Serialize};

  use super::*;
  use crate::Worker;

  #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
  struct Echo {
    value: String,
  }

  impl JobArgs for Echo {
    const KIND: &'static str = "test:echo";
  }

  #[derive(Clone, Copy)]
  enum Behaviour {
    Succeed,
    Retry,
    Cancel,
  }

  struct Recorder {
    behaviour: Behaviour,
    seen:      Arc<Mutex<Vec<(String, u32)>>>,
  }

  #[async_trait]
  impl Worker<Echo> for Recorder {
    async fn work(&self, ctx: &JobContext, args: Echo) -> Result<(), WorkError> {
      self.seen.lock().unwrap().push((args.value, ctx.attempt));
      match self.behaviour {
        Behaviour::Succeed => Ok(()),
        Behaviour::Retry => Err(WorkError::retry("flaky")),
        Behaviour::Cancel => Err(WorkError::cancel("gone")),
      }
    }
  }

  async fn runner(
    behaviour: Behaviour,
  ) -> (Runner<SqliteQueue>, SqliteQueue, Arc<Mutex<Vec<(String, u32)>>>) {
    let store = SqliteStore::open_in_memory().await.unwrap();
    let queue = store.queue();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let mut workers = Workers::new();
    workers
      .add(Recorder {
        behaviour,
        seen: seen.clone(),
      })
      .unwrap();
    let config = RunnerConfig {
      poll_interval:  Duration::from_millis(10),
      max_workers:    4,
      shutdown_grace: Duration::from_millis(200),
    };
    (Runner::new(queue.clone(), workers, config), queue, seen)
  }

  async fn insert(queue: &SqliteQueue, value: &str, max_attempts: u32) -> i64 {
    let mut job = NewJob::from_args(&Echo {
      value: value.to_owned(),
    })
    .unwrap();
    job.max_attempts = max_attempts;
    queue.insert(job).await.unwrap().unwrap().id
  }

  #[test]
  fn duplicate_registration_is_rejected() {
    struct Noop;
    #[async_trait]
    impl Worker<Echo> for Noop {
      async fn work(&self, _: &JobContext, _: Echo) -> Result<(), WorkError> { Ok(()) }
    }
    let mut workers = Workers::new();
    workers.add(Noop).unwrap();
    assert!(matches!(
      workers.add(Noop),
      Err(crate::Error::DuplicateWorker("test:echo"))
    ));
  }

  #[tokio::test]
  async fn successful_job_completes() {
    let (runner, queue, seen) = runner(Behaviour::Succeed).await;
    let id = insert(&queue, "hello", 25).await;

    let (job, outcome) = runner.work_one().await.unwrap().unwrap();
    assert_eq!(job.id, id);
    assert_eq!(outcome, JobOutcome::Completed);
    assert_eq!(queue.get(id).await.unwrap().state, JobState::Completed);
    assert_eq!(*seen.lock().unwrap(), vec![("hello".to_owned(), 1)]);

    assert!(runner.work_one().await.unwrap().is_none());
  }

  #[tokio::test]
  async fn failing_job_is_retried_later() {
    let (runner, queue, _) = runner(Behaviour::Retry).await;
    let id = insert(&queue, "x", 25).await;

    let (_, outcome) = runner.work_one().await.unwrap().unwrap();
    let JobOutcome::Retried { at } = outcome else {
      panic!("expected a retry, got {outcome:?}");
    };
    assert!(at > Utc::now() - chrono::Duration::seconds(1));

    let job = queue.get(id).await.unwrap();
    assert_eq!(job.state, JobState::Retryable);
    assert_eq!(job.last_error.as_deref(), Some("flaky"));
  }

  #[tokio::test]
  async fn final_attempt_discards() {
    let (runner, queue, _) = runner(Behaviour::Retry).await;
    let id = insert(&queue, "x", 1).await;

    let (_, outcome) = runner.work_one().await.unwrap().unwrap();
    assert_eq!(outcome, JobOutcome::Discarded);
    assert_eq!(queue.get(id).await.unwrap().state, JobState::Discarded);
  }

  #[tokio::test]
  async fn cancel_drops_the_job() {
    let (runner, queue, _) = runner(Behaviour::Cancel).await;
    let id = insert(&queue, "x", 25).await;

    let (_, outcome) = runner.work_one().await.unwrap().unwrap();
    assert_eq!(outcome, JobOutcome::Cancelled);
    let job = queue.get(id).await.unwrap();
    assert_eq!(job.state, JobState::Cancelled);
    assert!(job.finalized_at.is_some());
  }

  #[tokio::test]
  async fn run_loop_executes_jobs_until_shutdown() {
    let (runner, queue, seen) = runner(Behaviour::Succeed).await;
    let runner = Arc::new(runner);
    let shutdown = CancellationToken::new();
    let handle = {
      let (runner, shutdown) = (runner.clone(), shutdown.clone());
      tokio::spawn(async move { runner.run(shutdown).await })
    };

    let ids = [
      insert(&queue, "a", 25).await,
      insert(&queue, "b", 25).await,
      insert(&queue, "c", 25).await,
    ];

    let mut completed = 0;
    for _ in 0..200 {
      completed = 0;
      for id in ids {
        if queue.get(id).await.unwrap().state == JobState::Completed {
          completed += 1;
        }
      }
      if completed == ids.len() {
        break;
      }
      tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(completed, ids.len());

    shutdown.cancel();
    handle.await.unwrap().unwrap();
    assert_eq!(seen.lock().unwrap().len(), 3);
  }

  /// Holds its job until the context token fires, then records that it saw
  /// the cancellation (or stalls forever when `cooperative` is false).
  struct Stalling {
    cooperative: bool,
    started:     Arc<tokio::sync::Notify>,
    cleaned_up:  Arc<Mutex<bool>>,
  }

  #[async_trait]
  impl Worker<Echo> for Stalling {
    async fn work(&self, ctx: &JobContext, _: Echo) -> Result<(), WorkError> {
      self.started.notify_one();
      if !self.cooperative {
        std::future::pending::<()>().await;
      }
      ctx.cancel.cancelled().await;
      *self.cleaned_up.lock().unwrap() = true;
      Err(WorkError::retry("interrupted"))
    }
  }

  async fn shut_down_mid_job(cooperative: bool) -> (JobRecord, bool) {
    let store = SqliteStore::open_in_memory().await.unwrap();
    let queue = store.queue();
    let started = Arc::new(tokio::sync::Notify::new());
    let cleaned_up = Arc::new(Mutex::new(false));
    let mut workers = Workers::new();
    workers
      .add(Stalling {
        cooperative,
        started: started.clone(),
        cleaned_up: cleaned_up.clone(),
      })
      .unwrap();
    let config = RunnerConfig {
      poll_interval:  Duration::ZERO,
      max_workers:    4,
      shutdown_grace: Duration::from_millis(200),
    };
    let runner = Runner::new(queue.clone(), workers, config);
    let id = insert(&queue, "x", 25).await;

    let shutdown = CancellationToken::new();
    let handle = {
      let shutdown = shutdown.clone();
      tokio::spawn(async move { runner.run(shutdown).await })
    };
    started.notified().await;
    shutdown.cancel();
    handle.await.unwrap().unwrap();

    let cleaned_up = *cleaned_up.lock().unwrap();
    (queue.get(id).await.unwrap(), cleaned_up)
  }

  #[tokio::test]
  async fn shutdown_lets_workers_observe_cancellation() {
    let (job, cleaned_up) = shut_down_mid_job(true).await;
    assert!(cleaned_up);
    assert_eq!(job.state, JobState::Retryable);
    assert_eq!(job.last_error.as_deref(), Some("interrupted"));
  }

  #[tokio::test]
  async fn shutdown_drops_workers_that_ignore_cancellation() {
    let (job, cleaned_up) = shut_down_mid_job(false).await;
    assert!(!cleaned_up);
    assert_eq!(job.state, JobState::Retryable);
    assert_eq!(job.last_error.as_deref(), Some("runner shut down"));
  }
}
