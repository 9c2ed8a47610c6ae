//! Error type for `fila-queue`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("queue backend error: {0}")]
  Backend(#[from] fila_core::Error),

  #[error("a worker is already registered for job kind {0:?}")]
  DuplicateWorker(&'static str),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
