//! [`SqliteQueue`]: the durable job table.
//!
//! Jobs live in the same database as the case store, so a job inserted
//! through [`Enqueuer::enqueue_tx`] exists iff the caller's transaction
//! commits.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension as _, TransactionBehavior};
use tokio::sync::Mutex;
use tokio_rusqlite::Connection;

use fila_core::job::{Enqueuer, JobArgs, JobBackend, JobRecord, JobState, NewJob};

use crate::{
  Error, Result, SqliteTx,
  encode::{JOB_COLUMNS, RawJob, encode_dt},
};

#[derive(Clone)]
pub struct SqliteQueue {
  conn: Connection,
  gate: Arc<Mutex<()>>,
}

impl SqliteQueue {
  pub(crate) fn new(conn: Connection, gate: Arc<Mutex<()>>) -> Self { Self { conn, gate } }

  async fn set_state(
    &self,
    id: i64,
    state: JobState,
    error: Option<String>,
    scheduled_at: Option<DateTime<Utc>>,
  ) -> Result<()> {
    let now = encode_dt(Utc::now());
    let finalized = state.is_final().then(|| now.clone());
    let scheduled = scheduled_at.map(encode_dt);
    let state = state.as_ref().to_owned();

    let _gate = self.gate.lock().await;
    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE jobs SET state = ?2, finalized_at = ?3, \
           last_error = COALESCE(?4, last_error), \
           scheduled_at = COALESCE(?5, scheduled_at) WHERE id = ?1",
          rusqlite::params![id, state, finalized, error, scheduled],
        )?)
      })
      .await?;

    if changed == 0 {
      return Err(fila_core::Error::not_found(format!("job {id}")).into());
    }
    Ok(())
  }
}

/// Insert `job` unless a live job with the same unique key was created within
/// its window. Returns the new row id.
fn insert_job(
  conn: &rusqlite::Connection,
  job: &NewJob,
  args: &str,
  now: DateTime<Utc>,
) -> rusqlite::Result<Option<i64>> {
  if let (Some(key), Some(window)) = (&job.unique_key, job.unique_window) {
    let cutoff = chrono::Duration::from_std(window)
      .ok()
      .and_then(|w| now.checked_sub_signed(w))
      .unwrap_or(DateTime::<Utc>::MIN_UTC);
    let taken = conn
      .query_row(
        "SELECT 1 FROM jobs WHERE unique_key = ?1 AND created_at >= ?2 \
         AND state NOT IN ('cancelled', 'discarded') LIMIT 1",
        rusqlite::params![key, encode_dt(cutoff)],
        |_| Ok(()),
      )
      .optional()?;
    if taken.is_some() {
      return Ok(None);
    }
  }

  let at = encode_dt(now);
  conn.execute(
    "INSERT INTO jobs (kind, args, unique_key, state, attempt, max_attempts, scheduled_at, \
     created_at) VALUES (?1, ?2, ?3, 'available', 0, ?4, ?5, ?5)",
    rusqlite::params![job.kind, args, job.unique_key, job.max_attempts, at],
  )?;
  Ok(Some(conn.last_insert_rowid()))
}

fn select_job(conn: &rusqlite::Connection, id: i64) -> rusqlite::Result<Option<RawJob>> {
  conn
    .query_row(
      &format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = ?1"),
      rusqlite::params![id],
      RawJob::from_row,
    )
    .optional()
}

impl JobBackend for SqliteQueue {
  async fn insert(&self, job: NewJob) -> fila_core::Result<Option<JobRecord>> {
    let args = serde_json::to_string(&job.args)?;
    let now = crate::encode::now();

    let _gate = self.gate.lock().await;
    let raw = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let raw = match insert_job(&tx, &job, &args, now)? {
          Some(id) => select_job(&tx, id)?,
          None => None,
        };
        tx.commit()?;
        Ok(raw)
      })
      .await
      .map_err(Error::from)?;

    Ok(raw.map(RawJob::into_job).transpose()?)
  }

  async fn claim(&self, kinds: &[&'static str], limit: usize) -> fila_core::Result<Vec<JobRecord>> {
    if kinds.is_empty() || limit == 0 {
      return Ok(Vec::new());
    }
    let kinds: Vec<String> = kinds.iter().map(|k| (*k).to_owned()).collect();
    let now = encode_dt(Utc::now());
    let limit = i64::try_from(limit).unwrap_or(i64::MAX);

    let _gate = self.gate.lock().await;
    let raws: Vec<RawJob> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let placeholders = vec!["?"; kinds.len()].join(", ");
        let ids: Vec<i64> = {
          let mut stmt = tx.prepare(&format!(
            "SELECT id FROM jobs WHERE state IN ('available', 'retryable') \
             AND scheduled_at <= ? AND kind IN ({placeholders}) \
             ORDER BY scheduled_at, id LIMIT ?"
          ))?;
          let mut params: Vec<rusqlite::types::Value> = vec![now.clone().into()];
          params.extend(kinds.into_iter().map(Into::into));
          params.push(limit.into());
          stmt
            .query_map(rusqlite::params_from_iter(params), |row| row.get(0))?
            .collect::<rusqlite::Result<_>>()?
        };

        let mut claimed = Vec::with_capacity(ids.len());
        for id in ids {
          tx.execute(
            "UPDATE jobs SET state = 'running', attempt = attempt + 1, attempted_at = ?2 \
             WHERE id = ?1",
            rusqlite::params![id, now],
          )?;
          if let Some(raw) = select_job(&tx, id)? {
            claimed.push(raw);
          }
        }
        tx.commit()?;
        Ok(claimed)
      })
      .await
      .map_err(Error::from)?;

    Ok(raws.into_iter().map(RawJob::into_job).collect::<Result<_>>()?)
  }

  async fn complete(&self, id: i64) -> fila_core::Result<()> {
    Ok(self.set_state(id, JobState::Completed, None, None).await?)
  }

  async fn retry(&self, id: i64, error: String, at: DateTime<Utc>) -> fila_core::Result<()> {
    Ok(self.set_state(id, JobState::Retryable, Some(error), Some(at)).await?)
  }

  async fn cancel(&self, id: i64, error: String) -> fila_core::Result<()> {
    Ok(self.set_state(id, JobState::Cancelled, Some(error), None).await?)
  }

  async fn discard(&self, id: i64, error: String) -> fila_core::Result<()> {
    Ok(self.set_state(id, JobState::Discarded, Some(error), None).await?)
  }

  async fn rescue_running(&self) -> fila_core::Result<usize> {
    let now = encode_dt(Utc::now());
    let _gate = self.gate.lock().await;
    let rescued = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE jobs SET state = 'retryable', scheduled_at = ?1 WHERE state = 'running'",
          rusqlite::params![now],
        )?)
      })
      .await
      .map_err(Error::from)?;
    Ok(rescued)
  }

  async fn get(&self, id: i64) -> fila_core::Result<JobRecord> {
    let _gate = self.gate.lock().await;
    let raw = self
      .conn
      .call(move |conn| Ok(select_job(conn, id)?))
      .await
      .map_err(Error::from)?;
    let raw = raw.ok_or_else(|| fila_core::Error::not_found(format!("job {id}")))?;
    Ok(raw.into_job()?)
  }

  async fn list(&self, kind: &str) -> fila_core::Result<Vec<JobRecord>> {
    let kind = kind.to_owned();
    let _gate = self.gate.lock().await;
    let raws: Vec<RawJob> = self
      .conn
      .call(move |conn| {
        let mut stmt =
          conn.prepare(&format!("SELECT {JOB_COLUMNS} FROM jobs WHERE kind = ?1 ORDER BY id"))?;
        let rows = stmt
          .query_map(rusqlite::params![kind], RawJob::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await
      .map_err(Error::from)?;
    Ok(raws.into_iter().map(RawJob::into_job).collect::<Result<_>>()?)
  }
}

impl Enqueuer<SqliteTx> for SqliteQueue {
  async fn enqueue_tx<A: JobArgs>(&self, tx: &SqliteTx, args: &A) -> fila_core::Result<bool> {
    let job = NewJob::from_args(args)?;
    let args = serde_json::to_string(&job.args)?;
    let now = crate::encode::now();

    // The transaction already holds the gate.
    let id = tx
      .conn
      .call(move |conn| Ok(insert_job(conn, &job, &args, now)?))
      .await
      .map_err(Error::from)?;
    Ok(id.is_some())
  }
}
