//! Encoding and decoding helpers between domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as RFC 3339 UTC strings with microsecond precision,
//! calendar dates as `YYYY-MM-DD`, statuses by their upper-case names, blobs
//! as compact JSON and UUIDs as hyphenated lowercase strings.

use chrono::{DateTime, NaiveDate, SecondsFormat, SubsecRound as _, Utc};
use fila_core::{
  case::{Case, Document, ProcessingStatus, Unit},
  job::{JobRecord, JobState},
  retirement::{RetirementCase, RetirementStatus, StatusHistory},
  verdict::DATE_FORMAT,
};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── Dates ───────────────────────────────────────────────────────────────────

/// The current time at the precision timestamps are stored with, so a record
/// returned by a write equals the same record read back.
pub fn now() -> DateTime<Utc> { Utc::now().trunc_subsecs(6) }

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

pub fn encode_date(d: NaiveDate) -> String { d.format(DATE_FORMAT).to_string() }

pub fn decode_date(s: &str) -> Result<NaiveDate> {
  NaiveDate::parse_from_str(s, DATE_FORMAT).map_err(|e| Error::DateParse(e.to_string()))
}

fn decode_opt_dt(s: Option<String>) -> Result<Option<DateTime<Utc>>> {
  s.as_deref().map(decode_dt).transpose()
}

// ─── Statuses ────────────────────────────────────────────────────────────────

fn unknown(s: &str) -> Error { fila_core::Error::UnknownStatus(s.to_owned()).into() }

pub fn decode_processing_status(s: &str) -> Result<ProcessingStatus> {
  s.parse().map_err(|_| unknown(s))
}

pub fn decode_retirement_status(s: &str) -> Result<RetirementStatus> {
  s.parse().map_err(|_| unknown(s))
}

pub fn decode_job_state(s: &str) -> Result<JobState> { s.parse().map_err(|_| unknown(s)) }

// ─── Row types ───────────────────────────────────────────────────────────────

pub const CASE_COLUMNS: &str = "case_id, number, unit_id, unit_abbreviation, access_link, \
                                status, classification, analysed_at, classifier_metadata, \
                                created_at, updated_at";

/// Raw values read directly from a `cases` row.
pub struct RawCase {
  pub case_id:             String,
  pub number:              String,
  pub unit_id:             String,
  pub unit_abbreviation:   String,
  pub access_link:         String,
  pub status:              String,
  pub classification:      Option<bool>,
  pub analysed_at:         Option<String>,
  pub classifier_metadata: Option<String>,
  pub created_at:          String,
  pub updated_at:          String,
}

impl RawCase {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      case_id:             row.get(0)?,
      number:              row.get(1)?,
      unit_id:             row.get(2)?,
      unit_abbreviation:   row.get(3)?,
      access_link:         row.get(4)?,
      status:              row.get(5)?,
      classification:      row.get(6)?,
      analysed_at:         row.get(7)?,
      classifier_metadata: row.get(8)?,
      created_at:          row.get(9)?,
      updated_at:          row.get(10)?,
    })
  }

  pub fn into_case(self) -> Result<Case> {
    Ok(Case {
      case_id:             decode_uuid(&self.case_id)?,
      number:              self.number,
      unit:                Unit {
        id:           self.unit_id,
        abbreviation: self.unit_abbreviation,
      },
      access_link:         self.access_link,
      status:              decode_processing_status(&self.status)?,
      classification:      self.classification,
      analysed_at:         decode_opt_dt(self.analysed_at)?,
      classifier_metadata: self
        .classifier_metadata
        .as_deref()
        .map(serde_json::from_str)
        .transpose()?,
      created_at:          decode_dt(&self.created_at)?,
      updated_at:          decode_dt(&self.updated_at)?,
    })
  }
}

pub const DOCUMENT_COLUMNS: &str = "document_id, number, case_id, kind, unit, access_link, \
                                    mime_type, text, metadata, created_at, updated_at";

/// Raw values read directly from a `documents` row.
pub struct RawDocument {
  pub document_id: i64,
  pub number:      String,
  pub case_id:     String,
  pub kind:        String,
  pub unit:        String,
  pub access_link: String,
  pub mime_type:   String,
  pub text:        String,
  pub metadata:    String,
  pub created_at:  String,
  pub updated_at:  String,
}

impl RawDocument {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      document_id: row.get(0)?,
      number:      row.get(1)?,
      case_id:     row.get(2)?,
      kind:        row.get(3)?,
      unit:        row.get(4)?,
      access_link: row.get(5)?,
      mime_type:   row.get(6)?,
      text:        row.get(7)?,
      metadata:    row.get(8)?,
      created_at:  row.get(9)?,
      updated_at:  row.get(10)?,
    })
  }

  pub fn into_document(self) -> Result<Document> {
    Ok(Document {
      document_id: self.document_id,
      number:      self.number,
      case_id:     decode_uuid(&self.case_id)?,
      kind:        self.kind,
      unit:        self.unit,
      access_link: self.access_link,
      mime_type:   self.mime_type,
      text:        self.text,
      metadata:    serde_json::from_str(&self.metadata)?,
      created_at:  decode_dt(&self.created_at)?,
      updated_at:  decode_dt(&self.updated_at)?,
    })
  }
}

pub const RETIREMENT_COLUMNS: &str = "r.retirement_id, r.case_id, r.requester_id, r.birth_date, \
                                      r.request_date, r.invalidity, r.judicial, r.priority, \
                                      r.score, r.status, r.analyst_id, r.last_analyst_id, \
                                      r.created_at, r.updated_at";

/// Raw values read from a `retirement_cases` row aliased as `r`.
pub struct RawRetirementCase {
  pub retirement_id:   i64,
  pub case_id:         String,
  pub requester_id:    String,
  pub birth_date:      String,
  pub request_date:    String,
  pub invalidity:      bool,
  pub judicial:        bool,
  pub priority:        bool,
  pub score:           i32,
  pub status:          String,
  pub analyst_id:      Option<i64>,
  pub last_analyst_id: Option<i64>,
  pub created_at:      String,
  pub updated_at:      String,
}

impl RawRetirementCase {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      retirement_id:   row.get(0)?,
      case_id:         row.get(1)?,
      requester_id:    row.get(2)?,
      birth_date:      row.get(3)?,
      request_date:    row.get(4)?,
      invalidity:      row.get(5)?,
      judicial:        row.get(6)?,
      priority:        row.get(7)?,
      score:           row.get(8)?,
      status:          row.get(9)?,
      analyst_id:      row.get(10)?,
      last_analyst_id: row.get(11)?,
      created_at:      row.get(12)?,
      updated_at:      row.get(13)?,
    })
  }

  pub fn into_retirement_case(self) -> Result<RetirementCase> {
    Ok(RetirementCase {
      retirement_id:   self.retirement_id,
      case_id:         decode_uuid(&self.case_id)?,
      requester_id:    self.requester_id,
      birth_date:      decode_date(&self.birth_date)?,
      request_date:    decode_date(&self.request_date)?,
      invalidity:      self.invalidity,
      judicial:        self.judicial,
      priority:        self.priority,
      score:           self.score,
      status:          decode_retirement_status(&self.status)?,
      analyst_id:      self.analyst_id,
      last_analyst_id: self.last_analyst_id,
      created_at:      decode_dt(&self.created_at)?,
      updated_at:      decode_dt(&self.updated_at)?,
    })
  }
}

/// Raw values read directly from a `status_history` row.
pub struct RawStatusHistory {
  pub history_id:      i64,
  pub retirement_id:   i64,
  pub previous_status: Option<String>,
  pub new_status:      String,
  pub user_id:         Option<i64>,
  pub note:            Option<String>,
  pub changed_at:      String,
}

impl RawStatusHistory {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      history_id:      row.get(0)?,
      retirement_id:   row.get(1)?,
      previous_status: row.get(2)?,
      new_status:      row.get(3)?,
      user_id:         row.get(4)?,
      note:            row.get(5)?,
      changed_at:      row.get(6)?,
    })
  }

  pub fn into_status_history(self) -> Result<StatusHistory> {
    Ok(StatusHistory {
      history_id:      self.history_id,
      retirement_id:   self.retirement_id,
      previous_status: self
        .previous_status
        .as_deref()
        .map(decode_retirement_status)
        .transpose()?,
      new_status:      decode_retirement_status(&self.new_status)?,
      user_id:         self.user_id,
      note:            self.note,
      changed_at:      decode_dt(&self.changed_at)?,
    })
  }
}

pub const JOB_COLUMNS: &str = "id, kind, args, state, attempt, max_attempts, scheduled_at, \
                               created_at, attempted_at, finalized_at, last_error";

/// Raw values read directly from a `jobs` row.
pub struct RawJob {
  pub id:           i64,
  pub kind:         String,
  pub args:         String,
  pub state:        String,
  pub attempt:      u32,
  pub max_attempts: u32,
  pub scheduled_at: String,
  pub created_at:   String,
  pub attempted_at: Option<String>,
  pub finalized_at: Option<String>,
  pub last_error:   Option<String>,
}

impl RawJob {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:           row.get(0)?,
      kind:         row.get(1)?,
      args:         row.get(2)?,
      state:        row.get(3)?,
      attempt:      row.get(4)?,
      max_attempts: row.get(5)?,
      scheduled_at: row.get(6)?,
      created_at:   row.get(7)?,
      attempted_at: row.get(8)?,
      finalized_at: row.get(9)?,
      last_error:   row.get(10)?,
    })
  }

  pub fn into_job(self) -> Result<JobRecord> {
    Ok(JobRecord {
      id:           self.id,
      kind:         self.kind,
      args:         serde_json::from_str(&self.args)?,
      state:        decode_job_state(&self.state)?,
      attempt:      self.attempt,
      max_attempts: self.max_attempts,
      scheduled_at: decode_dt(&self.scheduled_at)?,
      created_at:   decode_dt(&self.created_at)?,
      attempted_at: decode_opt_dt(self.attempted_at)?,
      finalized_at: decode_opt_dt(self.finalized_at)?,
      last_error:   self.last_error,
    })
  }
}
