//! Cases and documents: the external process under analysis and the units
//! of content inside it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ─── Processing status ───────────────────────────────────────────────────────

/// Where a case is in the analysis pipeline.
///
/// ```text
/// PENDING ──start──▶ IN_PROGRESS ──ok──▶ SUCCESS
///                         │
///                         └──err──▶ PENDING (retried)
/// any ──cancel──▶ FAILURE
/// ```
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
pub enum ProcessingStatus {
  Pending,
  InProgress,
  Success,
  Failure,
}

// ─── Case ────────────────────────────────────────────────────────────────────

/// The organisational unit a case originates from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unit {
  pub id:           String,
  pub abbreviation: String,
}

/// An external administrative process tracked by the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Case {
  pub case_id:             Uuid,
  /// Externally assigned case number; unique.
  pub number:              String,
  pub unit:                Unit,
  /// Public access page of the case in the CMS.
  pub access_link:         String,
  pub status:              ProcessingStatus,
  /// The classifier's verdict; `None` until the case has been analysed.
  pub classification:      Option<bool>,
  pub analysed_at:         Option<DateTime<Utc>>,
  /// The serialised [`Verdict`](crate::verdict::Verdict) that produced
  /// `classification`.
  pub classifier_metadata: Option<serde_json::Value>,
  pub created_at:          DateTime<Utc>,
  pub updated_at:          DateTime<Utc>,
}

/// Input to [`crate::store::CaseRecords::save_case`]. Identity, status and
/// timestamps are assigned by the store.
#[derive(Debug, Clone)]
pub struct NewCase {
  pub number:      String,
  pub unit:        Unit,
  pub access_link: String,
}

// ─── Document ────────────────────────────────────────────────────────────────

/// A single attachment of a case, with the text extracted from it.
/// Documents are never updated once stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
  pub document_id: i64,
  /// External document number; unique across all cases.
  pub number:      String,
  pub case_id:     Uuid,
  /// Series name, followed by the document's own number when it has one.
  pub kind:        String,
  /// Abbreviation of the issuing unit.
  pub unit:        String,
  pub access_link: String,
  pub mime_type:   String,
  pub text:        String,
  /// Raw metadata returned by the CMS for this document.
  pub metadata:    serde_json::Value,
  pub created_at:  DateTime<Utc>,
  pub updated_at:  DateTime<Utc>,
}

/// Input to [`crate::store::CaseRecords::save_document`].
#[derive(Debug, Clone)]
pub struct NewDocument {
  pub number:      String,
  pub case_id:     Uuid,
  pub kind:        String,
  pub unit:        String,
  pub access_link: String,
  pub mime_type:   String,
  pub text:        String,
  pub metadata:    serde_json::Value,
}
