//! Error types for `fila-core`.

use thiserror::Error;
use uuid::Uuid;

/// A type-erased error, used wherever a collaborator's failure is carried
/// through without being inspected.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum Error {
  /// A lookup returned no row.
  #[error("{0} not found")]
  NotFound(String),

  #[error("case number {0:?} is already taken")]
  CaseNumberTaken(String),

  #[error("document number {0:?} is already taken")]
  DocumentNumberTaken(String),

  #[error("a retirement case already exists for case {0}")]
  RetirementCaseExists(Uuid),

  #[error("invalid date {value:?}: {source}")]
  InvalidDate {
    value:  String,
    #[source]
    source: chrono::ParseError,
  },

  #[error("unknown status: {0:?}")]
  UnknownStatus(String),

  #[error("case {0} has no classifier verdict")]
  MissingVerdict(Uuid),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),

  /// Any failure of the storage backend that is not one of the sentinels
  /// above.
  #[error("storage error: {0}")]
  Storage(#[source] BoxError),
}

impl Error {
  pub fn not_found(what: impl std::fmt::Display) -> Self {
    Self::NotFound(what.to_string())
  }

  pub fn storage(err: impl Into<BoxError>) -> Self { Self::Storage(err.into()) }

  pub fn is_not_found(&self) -> bool { matches!(self, Self::NotFound(_)) }

  /// Whether this is one of the unique-column sentinels.
  pub fn is_conflict(&self) -> bool {
    matches!(
      self,
      Self::CaseNumberTaken(_)
        | Self::DocumentNumberTaken(_)
        | Self::RetirementCaseExists(_)
    )
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
