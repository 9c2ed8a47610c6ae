//! The classifier's structured output for one case.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Dates in a verdict are plain ISO calendar dates.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// What the classifier concluded about a case. Stored verbatim as the case's
/// classifier metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
  pub is_retirement:            bool,
  /// National id of the requester, digits only.
  pub requester_id:             String,
  /// `YYYY-MM-DD`.
  pub request_date:             String,
  /// `YYYY-MM-DD`.
  pub birth_date:               String,
  pub judicial:                 bool,
  pub invalidity:               bool,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub diligence_responsible_id: Option<String>,
}

impl Verdict {
  pub fn birth_date(&self) -> Result<NaiveDate> { parse_date(&self.birth_date) }

  pub fn request_date(&self) -> Result<NaiveDate> { parse_date(&self.request_date) }
}

/// Parse a `YYYY-MM-DD` date, surrounding whitespace tolerated.
pub fn parse_date(value: &str) -> Result<NaiveDate> {
  NaiveDate::parse_from_str(value.trim(), DATE_FORMAT).map_err(|source| {
    Error::InvalidDate {
      value: value.to_owned(),
      source,
    }
  })
}
