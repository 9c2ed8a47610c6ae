use axum::{Json, extract::State};
use fila_cms::UnitInfo;
use fila_core::{job::Enqueuer, store::CaseStore};

use crate::{AppState, error::ApiError};

/// `GET /units`: every CMS unit.
pub async fn list<S, Q>(State(state): State<AppState<S, Q>>) -> Result<Json<Vec<UnitInfo>>, ApiError>
where
  S: CaseStore,
  Q: Enqueuer<S::Tx> + 'static,
{
  Ok(Json(state.cms.list_units().await?))
}
