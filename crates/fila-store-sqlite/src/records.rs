//! Statement-level implementation of [`CaseRecords`](fila_core::store::CaseRecords).
//!
//! These functions know nothing about locking or transactions; the store and
//! the transaction handle call them while holding the connection gate.

use rusqlite::OptionalExtension as _;
use tokio_rusqlite::Connection;
use uuid::Uuid;

use fila_core::{
  Error as CoreError,
  case::{Case, Document, NewCase, NewDocument, ProcessingStatus},
  retirement::{NewRetirementCase, NewStatusHistory, RetirementCase, StatusHistory},
};

use crate::{
  Error, Result,
  encode::{
    CASE_COLUMNS, DOCUMENT_COLUMNS, RETIREMENT_COLUMNS, RawCase, RawDocument,
    RawRetirementCase, RawStatusHistory, encode_date, encode_dt, encode_uuid, now,
  },
  error::unique_violation,
};

/// Map a UNIQUE failure on `column` to `sentinel`, anything else to a
/// database error.
fn on_unique(
  err: tokio_rusqlite::Error,
  column: &str,
  sentinel: impl FnOnce() -> CoreError,
) -> Error {
  match unique_violation(&err) {
    Some(c) if c == column => sentinel().into(),
    _ => err.into(),
  }
}

// ─── Cases ───────────────────────────────────────────────────────────────────

pub async fn save_case(conn: &Connection, input: NewCase) -> Result<Case> {
  let now = now();
  let case = Case {
    case_id:             Uuid::new_v4(),
    number:              input.number,
    unit:                input.unit,
    access_link:         input.access_link,
    status:              ProcessingStatus::Pending,
    classification:      None,
    analysed_at:         None,
    classifier_metadata: None,
    created_at:          now,
    updated_at:          now,
  };

  let id_str = encode_uuid(case.case_id);
  let number = case.number.clone();
  let unit_id = case.unit.id.clone();
  let unit_abbr = case.unit.abbreviation.clone();
  let link = case.access_link.clone();
  let status = case.status.as_ref().to_owned();
  let at_str = encode_dt(now);

  conn
    .call(move |conn| {
      conn.execute(
        "INSERT INTO cases (case_id, number, unit_id, unit_abbreviation, access_link, \
         status, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
        rusqlite::params![id_str, number, unit_id, unit_abbr, link, status, at_str],
      )?;
      Ok(())
    })
    .await
    .map_err(|e| {
      on_unique(e, "cases.number", || CoreError::CaseNumberTaken(case.number.clone()))
    })?;

  Ok(case)
}

async fn query_case(conn: &Connection, filter: &'static str, param: String) -> Result<Option<Case>> {
  let raw: Option<RawCase> = conn
    .call(move |conn| {
      Ok(
        conn
          .query_row(
            &format!("SELECT {CASE_COLUMNS} FROM cases WHERE {filter} = ?1"),
            rusqlite::params![param],
            RawCase::from_row,
          )
          .optional()?,
      )
    })
    .await?;

  raw.map(RawCase::into_case).transpose()
}

pub async fn get_case(conn: &Connection, case_id: Uuid) -> Result<Case> {
  query_case(conn, "case_id", encode_uuid(case_id))
    .await?
    .ok_or_else(|| CoreError::not_found(format!("case {case_id}")).into())
}

pub async fn get_case_by_number(conn: &Connection, number: &str) -> Result<Case> {
  query_case(conn, "number", number.to_owned())
    .await?
    .ok_or_else(|| CoreError::not_found(format!("case {number:?}")).into())
}

pub async fn update_case(conn: &Connection, case: &mut Case) -> Result<()> {
  case.updated_at = now();

  let id_str = encode_uuid(case.case_id);
  let unit_id = case.unit.id.clone();
  let unit_abbr = case.unit.abbreviation.clone();
  let link = case.access_link.clone();
  let status = case.status.as_ref().to_owned();
  let classification = case.classification;
  let analysed_at = case.analysed_at.map(encode_dt);
  let metadata = case
    .classifier_metadata
    .as_ref()
    .map(serde_json::to_string)
    .transpose()?;
  let updated_at = encode_dt(case.updated_at);

  let changed = conn
    .call(move |conn| {
      Ok(conn.execute(
        "UPDATE cases SET unit_id = ?2, unit_abbreviation = ?3, access_link = ?4, \
         status = ?5, classification = ?6, analysed_at = ?7, classifier_metadata = ?8, \
         updated_at = ?9 WHERE case_id = ?1",
        rusqlite::params![
          id_str,
          unit_id,
          unit_abbr,
          link,
          status,
          classification,
          analysed_at,
          metadata,
          updated_at
        ],
      )?)
    })
    .await?;

  if changed == 0 {
    return Err(CoreError::not_found(format!("case {}", case.case_id)).into());
  }
  Ok(())
}

// ─── Documents ───────────────────────────────────────────────────────────────

pub async fn save_document(conn: &Connection, input: NewDocument) -> Result<Document> {
  let now = now();
  let number = input.number.clone();
  let case_str = encode_uuid(input.case_id);
  let kind = input.kind.clone();
  let unit = input.unit.clone();
  let link = input.access_link.clone();
  let mime = input.mime_type.clone();
  let text = input.text.clone();
  let metadata = serde_json::to_string(&input.metadata)?;
  let at_str = encode_dt(now);

  let document_id = conn
    .call(move |conn| {
      conn.execute(
        "INSERT INTO documents (number, case_id, kind, unit, access_link, mime_type, text, \
         metadata, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)",
        rusqlite::params![number, case_str, kind, unit, link, mime, text, metadata, at_str],
      )?;
      Ok(conn.last_insert_rowid())
    })
    .await
    .map_err(|e| {
      on_unique(e, "documents.number", || {
        CoreError::DocumentNumberTaken(input.number.clone())
      })
    })?;

  Ok(Document {
    document_id,
    number: input.number,
    case_id: input.case_id,
    kind: input.kind,
    unit: input.unit,
    access_link: input.access_link,
    mime_type: input.mime_type,
    text: input.text,
    metadata: input.metadata,
    created_at: now,
    updated_at: now,
  })
}

pub async fn get_document_by_number(conn: &Connection, number: &str) -> Result<Document> {
  let param = number.to_owned();
  let raw: Option<RawDocument> = conn
    .call(move |conn| {
      Ok(
        conn
          .query_row(
            &format!("SELECT {DOCUMENT_COLUMNS} FROM documents WHERE number = ?1"),
            rusqlite::params![param],
            RawDocument::from_row,
          )
          .optional()?,
      )
    })
    .await?;

  raw
    .ok_or_else(|| CoreError::not_found(format!("document {number:?}")))?
    .into_document()
}

pub async fn list_documents(conn: &Connection, case_id: Uuid) -> Result<Vec<Document>> {
  let case_str = encode_uuid(case_id);
  let raws: Vec<RawDocument> = conn
    .call(move |conn| {
      let mut stmt = conn.prepare(&format!(
        "SELECT {DOCUMENT_COLUMNS} FROM documents WHERE case_id = ?1 ORDER BY document_id"
      ))?;
      let rows = stmt
        .query_map(rusqlite::params![case_str], RawDocument::from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
      Ok(rows)
    })
    .await?;

  raws.into_iter().map(RawDocument::into_document).collect()
}

// ─── Retirement cases ────────────────────────────────────────────────────────

pub async fn save_retirement_case(
  conn: &Connection,
  input: NewRetirementCase,
) -> Result<RetirementCase> {
  let now = now();
  let case_id = input.case_id;
  let case_str = encode_uuid(input.case_id);
  let requester = input.requester_id.clone();
  let birth = encode_date(input.birth_date);
  let request = encode_date(input.request_date);
  let (invalidity, judicial, priority, score) =
    (input.invalidity, input.judicial, input.priority, input.score);
  let status = input.status.as_ref().to_owned();
  let (analyst, last_analyst) = (input.analyst_id, input.last_analyst_id);
  let at_str = encode_dt(now);

  let retirement_id = conn
    .call(move |conn| {
      conn.execute(
        "INSERT INTO retirement_cases (case_id, requester_id, birth_date, request_date, \
         invalidity, judicial, priority, score, status, analyst_id, last_analyst_id, \
         created_at, updated_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?12)",
        rusqlite::params![
          case_str,
          requester,
          birth,
          request,
          invalidity,
          judicial,
          priority,
          score,
          status,
          analyst,
          last_analyst,
          at_str
        ],
      )?;
      Ok(conn.last_insert_rowid())
    })
    .await
    .map_err(|e| {
      on_unique(e, "retirement_cases.case_id", || {
        CoreError::RetirementCaseExists(case_id)
      })
    })?;

  Ok(RetirementCase {
    retirement_id,
    case_id: input.case_id,
    requester_id: input.requester_id,
    birth_date: input.birth_date,
    request_date: input.request_date,
    invalidity: input.invalidity,
    judicial: input.judicial,
    priority: input.priority,
    score: input.score,
    status: input.status,
    analyst_id: input.analyst_id,
    last_analyst_id: input.last_analyst_id,
    created_at: now,
    updated_at: now,
  })
}

async fn query_retirement_case(
  conn: &Connection,
  filter: &'static str,
  param: rusqlite::types::Value,
) -> Result<Option<RetirementCase>> {
  let raw: Option<RawRetirementCase> = conn
    .call(move |conn| {
      Ok(
        conn
          .query_row(
            &format!(
              "SELECT {RETIREMENT_COLUMNS} FROM retirement_cases r \
               JOIN cases c ON c.case_id = r.case_id WHERE {filter} = ?1"
            ),
            rusqlite::params![param],
            RawRetirementCase::from_row,
          )
          .optional()?,
      )
    })
    .await?;

  raw.map(RawRetirementCase::into_retirement_case).transpose()
}

pub async fn get_retirement_case(conn: &Connection, retirement_id: i64) -> Result<RetirementCase> {
  query_retirement_case(conn, "r.retirement_id", retirement_id.into())
    .await?
    .ok_or_else(|| CoreError::not_found(format!("retirement case {retirement_id}")).into())
}

pub async fn get_retirement_case_by_case_number(
  conn: &Connection,
  number: &str,
) -> Result<RetirementCase> {
  query_retirement_case(conn, "c.number", number.to_owned().into())
    .await?
    .ok_or_else(|| {
      CoreError::not_found(format!("retirement case for case {number:?}")).into()
    })
}

pub async fn update_retirement_case(conn: &Connection, rc: &mut RetirementCase) -> Result<()> {
  rc.updated_at = now();

  let id = rc.retirement_id;
  let requester = rc.requester_id.clone();
  let birth = encode_date(rc.birth_date);
  let request = encode_date(rc.request_date);
  let (invalidity, judicial, priority, score) =
    (rc.invalidity, rc.judicial, rc.priority, rc.score);
  let status = rc.status.as_ref().to_owned();
  let (analyst, last_analyst) = (rc.analyst_id, rc.last_analyst_id);
  let updated_at = encode_dt(rc.updated_at);

  let changed = conn
    .call(move |conn| {
      Ok(conn.execute(
        "UPDATE retirement_cases SET requester_id = ?2, birth_date = ?3, request_date = ?4, \
         invalidity = ?5, judicial = ?6, priority = ?7, score = ?8, status = ?9, \
         analyst_id = ?10, last_analyst_id = ?11, updated_at = ?12 \
         WHERE retirement_id = ?1",
        rusqlite::params![
          id,
          requester,
          birth,
          request,
          invalidity,
          judicial,
          priority,
          score,
          status,
          analyst,
          last_analyst,
          updated_at
        ],
      )?)
    })
    .await?;

  if changed == 0 {
    return Err(CoreError::not_found(format!("retirement case {id}")).into());
  }
  Ok(())
}

// ─── Status history ──────────────────────────────────────────────────────────

pub async fn save_status_history(
  conn: &Connection,
  input: NewStatusHistory,
) -> Result<StatusHistory> {
  let now = now();
  let retirement_id = input.retirement_id;
  let previous = input.previous_status.map(|s| s.as_ref().to_owned());
  let new = input.new_status.as_ref().to_owned();
  let user = input.user_id;
  let note = input.note.clone();
  let at_str = encode_dt(now);

  let history_id = conn
    .call(move |conn| {
      conn.execute(
        "INSERT INTO status_history (retirement_id, previous_status, new_status, user_id, \
         note, changed_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        rusqlite::params![retirement_id, previous, new, user, note, at_str],
      )?;
      Ok(conn.last_insert_rowid())
    })
    .await?;

  Ok(StatusHistory {
    history_id,
    retirement_id,
    previous_status: input.previous_status,
    new_status: input.new_status,
    user_id: input.user_id,
    note: input.note,
    changed_at: now,
  })
}

pub async fn list_status_history(
  conn: &Connection,
  retirement_id: i64,
) -> Result<Vec<StatusHistory>> {
  let raws: Vec<RawStatusHistory> = conn
    .call(move |conn| {
      let mut stmt = conn.prepare(
        "SELECT history_id, retirement_id, previous_status, new_status, user_id, note, \
         changed_at FROM status_history WHERE retirement_id = ?1 ORDER BY history_id",
      )?;
      let rows = stmt
        .query_map(rusqlite::params![retirement_id], RawStatusHistory::from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
      Ok(rows)
    })
    .await?;

  raws.into_iter().map(RawStatusHistory::into_status_history).collect()
}
