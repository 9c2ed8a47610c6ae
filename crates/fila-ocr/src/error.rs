//! Error types for `fila-ocr`.

use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  /// The service finished the analysis and reported it as failed.
  #[error("document analysis failed")]
  OcrFailed,

  #[error("document analysis did not finish within {0:?}")]
  OcrTimeout(Duration),

  /// The service answered with something other than the expected status or
  /// operation state.
  #[error("unexpected ocr response ({status}): {body}")]
  OcrProtocol { status: u16, body: String },

  #[error("http error: {0}")]
  Http(#[from] reqwest::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
