//! Read-only data-lake lookups. Answer `503` when the server runs without a
//! data-lake backend.

use axum::{
  Json,
  extract::{Query, State},
};
use fila_analysis::OpenCase;
use fila_core::{job::Enqueuer, store::CaseStore};
use serde::Deserialize;

use crate::{AppState, DataLakeLookups, error::ApiError};

#[derive(Deserialize)]
pub struct OpenCasesQuery {
  #[serde(default)]
  unit: String,
}

fn lookups<S: CaseStore, Q>(state: &AppState<S, Q>) -> Result<&DataLakeLookups, ApiError> {
  state
    .datalake
    .as_deref()
    .ok_or_else(|| ApiError::Unavailable("no data lake is configured".into()))
}

/// `GET /datalake/open-cases?unit=…`: cases currently open at `unit`.
pub async fn open_cases<S, Q>(
  State(state): State<AppState<S, Q>>,
  Query(query): Query<OpenCasesQuery>,
) -> Result<Json<Vec<OpenCase>>, ApiError>
where
  S: CaseStore,
  Q: Enqueuer<S::Tx> + 'static,
{
  let unit = query.unit.trim();
  if unit.is_empty() {
    return Err(ApiError::BadRequest("the `unit` parameter is required".into()));
  }
  Ok(Json(lookups(&state)?.list_open_cases(unit).await?))
}

/// `GET /datalake/units`: units with open cases.
pub async fn units<S, Q>(State(state): State<AppState<S, Q>>) -> Result<Json<Vec<String>>, ApiError>
where
  S: CaseStore,
  Q: Enqueuer<S::Tx> + 'static,
{
  Ok(Json(lookups(&state)?.list_units().await?))
}
