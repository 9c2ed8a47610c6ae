//! [`SqliteStore`]: the SQLite implementation of [`CaseStore`].

use std::{path::Path, sync::Arc};

use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio_rusqlite::Connection;
use uuid::Uuid;

use fila_core::{
  case::{Case, Document, NewCase, NewDocument},
  retirement::{NewRetirementCase, NewStatusHistory, RetirementCase, StatusHistory},
  store::{CaseRecords, CaseStore, CaseTx},
};

use crate::{Result, SqliteCache, SqliteQueue, records, schema::SCHEMA};

// ─── Store ───────────────────────────────────────────────────────────────────

/// The case store backed by a single SQLite file.
///
/// Every statement runs while holding `gate`; an open [`SqliteTx`] holds it
/// until it finishes, so statements of other callers are never interleaved
/// with a transaction's.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: Connection,
  gate: Arc<Mutex<()>>,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = Connection::open(path).await?;
    Self::init(conn).await
  }

  /// Open an in-memory store, for tests.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = Connection::open_in_memory().await?;
    Self::init(conn).await
  }

  async fn init(conn: Connection) -> Result<Self> {
    conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(Self {
      conn,
      gate: Arc::new(Mutex::new(())),
    })
  }

  /// The durable job queue sharing this store's connection.
  pub fn queue(&self) -> SqliteQueue { SqliteQueue::new(self.conn.clone(), self.gate.clone()) }

  /// The shared cache sharing this store's connection.
  pub fn cache(&self) -> SqliteCache { SqliteCache::new(self.conn.clone(), self.gate.clone()) }
}

impl CaseRecords for SqliteStore {
  // ── Cases ─────────────────────────────────────────────────────────────────

  async fn save_case(&self, input: NewCase) -> fila_core::Result<Case> {
    let _gate = self.gate.lock().await;
    Ok(records::save_case(&self.conn, input).await?)
  }

  async fn get_case(&self, case_id: Uuid) -> fila_core::Result<Case> {
    let _gate = self.gate.lock().await;
    Ok(records::get_case(&self.conn, case_id).await?)
  }

  async fn get_case_by_number(&self, number: &str) -> fila_core::Result<Case> {
    let _gate = self.gate.lock().await;
    Ok(records::get_case_by_number(&self.conn, number).await?)
  }

  async fn update_case(&self, case: &mut Case) -> fila_core::Result<()> {
    let _gate = self.gate.lock().await;
    Ok(records::update_case(&self.conn, case).await?)
  }

  // ── Documents ─────────────────────────────────────────────────────────────

  async fn save_document(&self, input: NewDocument) -> fila_core::Result<Document> {
    let _gate = self.gate.lock().await;
    Ok(records::save_document(&self.conn, input).await?)
  }

  async fn get_document_by_number(&self, number: &str) -> fila_core::Result<Document> {
    let _gate = self.gate.lock().await;
    Ok(records::get_document_by_number(&self.conn, number).await?)
  }

  async fn list_documents(&self, case_id: Uuid) -> fila_core::Result<Vec<Document>> {
    let _gate = self.gate.lock().await;
    Ok(records::list_documents(&self.conn, case_id).await?)
  }

  // ── Retirement cases ──────────────────────────────────────────────────────

  async fn save_retirement_case(
    &self,
    input: NewRetirementCase,
  ) -> fila_core::Result<RetirementCase> {
    let _gate = self.gate.lock().await;
    Ok(records::save_retirement_case(&self.conn, input).await?)
  }

  async fn get_retirement_case(&self, retirement_id: i64) -> fila_core::Result<RetirementCase> {
    let _gate = self.gate.lock().await;
    Ok(records::get_retirement_case(&self.conn, retirement_id).await?)
  }

  async fn get_retirement_case_by_case_number(
    &self,
    number: &str,
  ) -> fila_core::Result<RetirementCase> {
    let _gate = self.gate.lock().await;
    Ok(records::get_retirement_case_by_case_number(&self.conn, number).await?)
  }

  async fn update_retirement_case(&self, rc: &mut RetirementCase) -> fila_core::Result<()> {
    let _gate = self.gate.lock().await;
    Ok(records::update_retirement_case(&self.conn, rc).await?)
  }

  // ── Status history ────────────────────────────────────────────────────────

  async fn save_status_history(
    &self,
    input: NewStatusHistory,
  ) -> fila_core::Result<StatusHistory> {
    let _gate = self.gate.lock().await;
    Ok(records::save_status_history(&self.conn, input).await?)
  }

  async fn list_status_history(&self, retirement_id: i64) -> fila_core::Result<Vec<StatusHistory>> {
    let _gate = self.gate.lock().await;
    Ok(records::list_status_history(&self.conn, retirement_id).await?)
  }
}

impl CaseStore for SqliteStore {
  type Tx = SqliteTx;

  async fn begin(&self) -> fila_core::Result<SqliteTx> {
    let guard = self.gate.clone().lock_owned().await;
    self
      .conn
      .call(|conn| {
        conn.execute_batch("BEGIN IMMEDIATE")?;
        Ok(())
      })
      .await
      .map_err(crate::Error::from)?;
    Ok(SqliteTx {
      conn:  self.conn.clone(),
      guard: Some(guard),
    })
  }
}

// ─── Transaction ─────────────────────────────────────────────────────────────

/// An open `BEGIN IMMEDIATE` transaction on the store's connection.
///
/// Holds the connection gate until committed, rolled back or dropped.
/// Dropping an unfinished transaction schedules a `ROLLBACK` that runs before
/// the gate is released.
pub struct SqliteTx {
  pub(crate) conn: Connection,
  guard:           Option<OwnedMutexGuard<()>>,
}

impl SqliteTx {
  async fn finish(&mut self, statement: &'static str) -> fila_core::Result<()> {
    self
      .conn
      .call(move |conn| {
        conn.execute_batch(statement)?;
        Ok(())
      })
      .await
      .map_err(crate::Error::from)?;
    self.guard.take();
    Ok(())
  }
}

impl CaseTx for SqliteTx {
  async fn commit(mut self) -> fila_core::Result<()> { self.finish("COMMIT").await }

  async fn rollback(mut self) -> fila_core::Result<()> { self.finish("ROLLBACK").await }
}

impl Drop for SqliteTx {
  fn drop(&mut self) {
    let Some(guard) = self.guard.take() else {
      return;
    };
    let conn = self.conn.clone();
    match tokio::runtime::Handle::try_current() {
      Ok(handle) => {
        handle.spawn(async move {
          let result = conn
            .call(|conn| {
              conn.execute_batch("ROLLBACK")?;
              Ok(())
            })
            .await;
          if let Err(e) = result {
            tracing::error!(error = %e, "rollback of abandoned transaction failed");
          }
          drop(guard);
        });
      }
      Err(_) => {
        tracing::error!("transaction dropped outside a runtime; it was not rolled back");
      }
    }
  }
}

impl CaseRecords for SqliteTx {
  async fn save_case(&self, input: NewCase) -> fila_core::Result<Case> {
    Ok(records::save_case(&self.conn, input).await?)
  }

  async fn get_case(&self, case_id: Uuid) -> fila_core::Result<Case> {
    Ok(records::get_case(&self.conn, case_id).await?)
  }

  async fn get_case_by_number(&self, number: &str) -> fila_core::Result<Case> {
    Ok(records::get_case_by_number(&self.conn, number).await?)
  }

  async fn update_case(&self, case: &mut Case) -> fila_core::Result<()> {
    Ok(records::update_case(&self.conn, case).await?)
  }

  async fn save_document(&self, input: NewDocument) -> fila_core::Result<Document> {
    Ok(records::save_document(&self.conn, input).await?)
  }

  async fn get_document_by_number(&self, number: &str) -> fila_core::Result<Document> {
    Ok(records::get_document_by_number(&self.conn, number).await?)
  }

  async fn list_documents(&self, case_id: Uuid) -> fila_core::Result<Vec<Document>> {
    Ok(records::list_documents(&self.conn, case_id).await?)
  }

  async fn save_retirement_case(
    &self,
    input: NewRetirementCase,
  ) -> fila_core::Result<RetirementCase> {
    Ok(records::save_retirement_case(&self.conn, input).await?)
  }

  async fn get_retirement_case(&self, retirement_id: i64) -> fila_core::Result<RetirementCase> {
    Ok(records::get_retirement_case(&self.conn, retirement_id).await?)
  }

  async fn get_retirement_case_by_case_number(
    &self,
    number: &str,
  ) -> fila_core::Result<RetirementCase> {
    Ok(records::get_retirement_case_by_case_number(&self.conn, number).await?)
  }

  async fn update_retirement_case(&self, rc: &mut RetirementCase) -> fila_core::Result<()> {
    Ok(records::update_retirement_case(&self.conn, rc).await?)
  }

  async fn save_status_history(
    &self,
    input: NewStatusHistory,
  ) -> fila_core::Result<StatusHistory> {
    Ok(records::save_status_history(&self.conn, input).await?)
  }

  async fn list_status_history(&self, retirement_id: i64) -> fila_core::Result<Vec<StatusHistory>> {
    Ok(records::list_status_history(&self.conn, retirement_id).await?)
  }
}
