//! Error types for `fila-cms`.

use fila_core::cache::CacheError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A SOAP fault returned with a non-success HTTP status.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("remote fault ({status}) {code}: {message}")]
pub struct RemoteFault {
  pub status:  u16,
  pub code:    String,
  pub message: String,
  pub detail:  Vec<FaultDetail>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaultDetail {
  pub key:   String,
  pub value: String,
}

#[derive(Debug, Error)]
pub enum Error {
  /// The CMS rejected the request. Callers may treat this as a soft failure
  /// (e.g. a cancelled document).
  #[error(transparent)]
  Fault(#[from] RemoteFault),

  #[error("http error: {0}")]
  Http(#[from] reqwest::Error),

  /// A non-success response whose body is not a SOAP fault.
  #[error("unexpected response ({status}): {body}")]
  Status { status: u16, body: String },

  #[error("malformed response: {0}")]
  Malformed(String),

  #[error("xml error: {0}")]
  Xml(#[from] quick_xml::Error),

  #[error("cache error: {0}")]
  Cache(CacheError),
}

impl Error {
  pub fn is_fault(&self) -> bool { matches!(self, Self::Fault(_)) }
}

impl From<CacheError> for Error {
  /// Loads that failed with a CMS fault surface as that fault again, so
  /// callers see the same error with or without a cache in front.
  fn from(err: CacheError) -> Self {
    if let CacheError::Load(source) = &err {
      if let Some(Error::Fault(fault)) = source.downcast_ref::<Error>() {
        return Self::Fault(fault.clone());
      }
    }
    Self::Cache(err)
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
