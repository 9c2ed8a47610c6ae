//! Handlers for `/cases` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/cases` | Body: `{"number":"…"}`; 409 if already registered |
//! | `GET`  | `/cases/{id}` | 404 if not found |
//! | `GET`  | `/cases/{id}/documents` | 404 if the case is not found |
//! | `POST` | `/cases/{id}/analyze` | 202 with `{"enqueued":bool}` |

use axum::{
  Json,
  extract::{Path, State},
  http::StatusCode,
  response::IntoResponse,
};
use fila_core::{
  case::{Case, Document},
  job::Enqueuer,
  store::CaseStore,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{AppState, error::ApiError};

// ─── Create ───────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CreateBody {
  pub number: String,
}

/// `POST /cases`: register a case and schedule its analysis.
pub async fn create<S, Q>(
  State(state): State<AppState<S, Q>>,
  Json(body): Json<CreateBody>,
) -> Result<impl IntoResponse, ApiError>
where
  S: CaseStore,
  Q: Enqueuer<S::Tx> + 'static,
{
  let number = body.number.trim();
  if number.is_empty() {
    return Err(ApiError::BadRequest("case number must not be blank".into()));
  }
  let case = state.analysis.trigger(number).await?;
  Ok((StatusCode::CREATED, Json(case)))
}

// ─── Reads ────────────────────────────────────────────────────────────────────

/// `GET /cases/{id}`
pub async fn get_one<S, Q>(
  State(state): State<AppState<S, Q>>,
  Path(id): Path<Uuid>,
) -> Result<Json<Case>, ApiError>
where
  S: CaseStore,
  Q: Enqueuer<S::Tx> + 'static,
{
  Ok(Json(state.analysis.get_case(id).await?))
}

/// `GET /cases/{id}/documents`
pub async fn documents<S, Q>(
  State(state): State<AppState<S, Q>>,
  Path(id): Path<Uuid>,
) -> Result<Json<Vec<Document>>, ApiError>
where
  S: CaseStore,
  Q: Enqueuer<S::Tx> + 'static,
{
  Ok(Json(state.analysis.list_documents(id).await?))
}

// ─── Re-analysis ──────────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
pub struct Enqueued {
  pub enqueued: bool,
}

/// `POST /cases/{id}/analyze`
pub async fn analyze<S, Q>(
  State(state): State<AppState<S, Q>>,
  Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError>
where
  S: CaseStore,
  Q: Enqueuer<S::Tx> + 'static,
{
  let enqueued = state.analysis.trigger_reanalysis(id).await?;
  Ok((StatusCode::ACCEPTED, Json(Enqueued { enqueued })))
}
