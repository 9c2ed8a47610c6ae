//! Retirement cases and their append-only status history.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Note attached to the history row written when the pipeline materialises a
/// retirement case.
pub const SEED_NOTE: &str = "created by automated analysis";

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
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum RetirementStatus {
  AnalysisPending,
  InAnalysis,
  InDiligence,
  ReturnFromDiligence,
  Concluded,
  InvalidReading,
}

/// A case the classifier recognised as a retirement request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetirementCase {
  pub retirement_id:   i64,
  /// The parent [`Case`](crate::case::Case); at most one retirement case per
  /// case.
  pub case_id:         Uuid,
  /// National id of the requester, digits only.
  pub requester_id:    String,
  pub birth_date:      NaiveDate,
  pub request_date:    NaiveDate,
  pub invalidity:      bool,
  pub judicial:        bool,
  pub priority:        bool,
  pub score:           i32,
  pub status:          RetirementStatus,
  pub analyst_id:      Option<i64>,
  pub last_analyst_id: Option<i64>,
  pub created_at:      DateTime<Utc>,
  pub updated_at:      DateTime<Utc>,
}

impl RetirementCase {
  /// Move the case to `new_status` and return the history row that records
  /// the change. The caller persists both in the same transaction.
  pub fn transition(
    &mut self,
    new_status: RetirementStatus,
    user_id: Option<i64>,
    note: Option<String>,
  ) -> NewStatusHistory {
    let previous = std::mem::replace(&mut self.status, new_status);
    NewStatusHistory {
      retirement_id: self.retirement_id,
      previous_status: Some(previous),
      new_status,
      user_id,
      note,
    }
  }
}

/// Input to [`crate::store::CaseRecords::save_retirement_case`].
#[derive(Debug, Clone)]
pub struct NewRetirementCase {
  pub case_id:         Uuid,
  pub requester_id:    String,
  pub birth_date:      NaiveDate,
  pub request_date:    NaiveDate,
  pub invalidity:      bool,
  pub judicial:        bool,
  pub priority:        bool,
  pub score:           i32,
  pub status:          RetirementStatus,
  pub analyst_id:      Option<i64>,
  pub last_analyst_id: Option<i64>,
}

/// One status transition of a retirement case. Never updated or deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusHistory {
  pub history_id:      i64,
  pub retirement_id:   i64,
  /// `None` only on the seed row written at creation.
  pub previous_status: Option<RetirementStatus>,
  pub new_status:      RetirementStatus,
  /// `None` for system actions.
  pub user_id:         Option<i64>,
  pub note:            Option<String>,
  pub changed_at:      DateTime<Utc>,
}

/// Input to [`crate::store::CaseRecords::save_status_history`].
#[derive(Debug, Clone)]
pub struct NewStatusHistory {
  pub retirement_id:   i64,
  pub previous_status: Option<RetirementStatus>,
  pub new_status:      RetirementStatus,
  pub user_id:         Option<i64>,
  pub note:            Option<String>,
}

impl NewStatusHistory {
  /// The first history row of a retirement case, written by the system.
  pub fn seed(retirement_id: i64, status: RetirementStatus) -> Self {
    Self {
      retirement_id,
      previous_status: None,
      new_status: status,
      user_id: None,
      note: Some(SEED_NOTE.to_owned()),
    }
  }
}
