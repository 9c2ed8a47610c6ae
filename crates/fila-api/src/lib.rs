//! JSON HTTP edge of the analysis pipeline.
//!
//! Exposes an axum [`Router`] that registers cases for analysis and reads
//! back cases, documents and retirement cases. The server binary wires it to
//! the SQLite store, the job runner and the external clients.

pub mod cases;
pub mod datalake;
pub mod error;
pub mod retirement;
pub mod units;

use std::{path::PathBuf, sync::Arc, time::Duration};

use axum::{
  Router,
  routing::{get, post},
};
use fila_analysis::{AnalysisService, DataLake, DataLakeService, LlmConfig, RetirementService};
use fila_cms::{Cms, CmsConfig};
use fila_core::{job::Enqueuer, store::CaseStore};
use fila_ocr::OcrConfig;
use fila_queue::RunnerConfig;
use fila_store_sqlite::SqliteCache;
use serde::Deserialize;
use tower_http::trace::TraceLayer;

pub use error::ApiError;

// ─── Configuration ────────────────────────────────────────────────────────────

fn default_host() -> String { "127.0.0.1".into() }
fn default_port() -> u16 { 8080 }
fn default_poll_interval_ms() -> u64 { 1_000 }
fn default_max_workers() -> usize { 100 }
fn default_shutdown_grace_ms() -> u64 { 10_000 }

/// Runtime server configuration, deserialised from `config.toml` and
/// `FILA_`-prefixed environment variables.
#[derive(Deserialize, Clone)]
pub struct ServerConfig {
  #[serde(default = "default_host")]
  pub host:       String,
  #[serde(default = "default_port")]
  pub port:       u16,
  pub store_path: PathBuf,
  pub cms:        CmsConfig,
  pub ocr:        OcrConfig,
  pub llm:        LlmConfig,
  #[serde(default)]
  pub queue:      QueueConfig,
}

#[derive(Deserialize, Clone)]
pub struct QueueConfig {
  #[serde(default = "default_poll_interval_ms")]
  pub poll_interval_ms:  u64,
  #[serde(default = "default_max_workers")]
  pub max_workers:       usize,
  #[serde(default = "default_shutdown_grace_ms")]
  pub shutdown_grace_ms: u64,
}

impl Default for QueueConfig {
  fn default() -> Self {
    Self {
      poll_interval_ms:  default_poll_interval_ms(),
      max_workers:       default_max_workers(),
      shutdown_grace_ms: default_shutdown_grace_ms(),
    }
  }
}

impl From<&QueueConfig> for RunnerConfig {
  fn from(config: &QueueConfig) -> Self {
    Self {
      poll_interval:  Duration::from_millis(config.poll_interval_ms),
      max_workers:    config.max_workers,
      shutdown_grace: Duration::from_millis(config.shutdown_grace_ms),
    }
  }
}

// ─── Application state ────────────────────────────────────────────────────────

/// Data-lake lookups over any backend, cached in the shared store.
pub type DataLakeLookups = DataLakeService<Arc<dyn DataLake>, SqliteCache>;

/// Shared state threaded through all axum handlers.
pub struct AppState<S: CaseStore, Q> {
  pub analysis:    Arc<AnalysisService<S, Q>>,
  pub retirements: RetirementService<S>,
  /// Used for unit listings; normally a cached client.
  pub cms:         Arc<dyn Cms>,
  /// `None` when no data-lake backend is available.
  pub datalake:    Option<Arc<DataLakeLookups>>,
}

impl<S: CaseStore, Q> Clone for AppState<S, Q> {
  fn clone(&self) -> Self {
    Self {
      analysis:    self.analysis.clone(),
      retirements: self.retirements.clone(),
      cms:         self.cms.clone(),
      datalake:    self.datalake.clone(),
    }
  }
}

// ─── Router ───────────────────────────────────────────────────────────────────

/// Build the API router with request tracing.
pub fn router<S, Q>(state: AppState<S, Q>) -> Router
where
  S: CaseStore,
  Q: Enqueuer<S::Tx> + 'static,
{
  Router::new()
    .route("/cases",                             post(cases::create::<S, Q>))
    .route("/cases/{id}",                        get(cases::get_one::<S, Q>))
    .route("/cases/{id}/documents",              get(cases::documents::<S, Q>))
    .route("/cases/{id}/analyze",                post(cases::analyze::<S, Q>))
    .route("/retirement-cases/{number}",         get(retirement::get_one::<S, Q>))
    .route("/retirement-cases/{number}/history", get(retirement::history::<S, Q>))
    .route("/units",                             get(units::list::<S, Q>))
    .route("/datalake/open-cases",               get(datalake::open_cases::<S, Q>))
    .route("/datalake/units",                    get(datalake::units::<S, Q>))
    .layer(TraceLayer::new_for_http())
    .with_state(state)
}

#[cfg(test)]
mod tests;
