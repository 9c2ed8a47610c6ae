//! Error type for `fila-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] fila_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl From<Error> for fila_core::Error {
  fn from(err: Error) -> Self {
    match err {
      Error::Core(e) => e,
      Error::Json(e) => fila_core::Error::Serialization(e),
      other => fila_core::Error::storage(other),
    }
  }
}

/// The `table.column` named by a UNIQUE constraint failure, if `err` is one.
pub(crate) fn unique_violation(err: &tokio_rusqlite::Error) -> Option<&str> {
  match err {
    tokio_rusqlite::Error::Rusqlite(rusqlite::Error::SqliteFailure(e, Some(msg)))
      if e.code == rusqlite::ErrorCode::ConstraintViolation =>
    {
      msg.strip_prefix("UNIQUE constraint failed: ")
    }
    _ => None,
  }
}
