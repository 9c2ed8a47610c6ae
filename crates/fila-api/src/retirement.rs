//! Handlers for `/retirement-cases` endpoints, keyed by the parent case's
//! number.

use axum::{
  Json,
  extract::{Path, State},
};
use fila_core::{
  job::Enqueuer,
  retirement::{RetirementCase, StatusHistory},
  store::CaseStore,
};

use crate::{AppState, error::ApiError};

/// `GET /retirement-cases/{number}`
pub async fn get_one<S, Q>(
  State(state): State<AppState<S, Q>>,
  Path(number): Path<String>,
) -> Result<Json<RetirementCase>, ApiError>
where
  S: CaseStore,
  Q: Enqueuer<S::Tx> + 'static,
{
  Ok(Json(state.retirements.get_by_case_number(&number).await?))
}

/// `GET /retirement-cases/{number}/history`, oldest first.
pub async fn history<S, Q>(
  State(state): State<AppState<S, Q>>,
  Path(number): Path<String>,
) -> Result<Json<Vec<StatusHistory>>, ApiError>
where
  S: CaseStore,
  Q: Enqueuer<S::Tx> + 'static,
{
  Ok(Json(state.retirements.list_history(&number).await?))
}
