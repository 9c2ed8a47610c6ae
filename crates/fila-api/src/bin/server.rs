//! fila analysis server binary.
//!
//! Reads `config.toml` (or the path specified with `--config`) plus
//! `FILA_`-prefixed environment variables, opens the SQLite store, starts the
//! job runner and serves the JSON API over HTTP. Nested keys are set from the
//! environment with a double underscore, e.g. `FILA_CMS__URL`.

use std::{
  path::{Path, PathBuf},
  sync::Arc,
  time::Duration,
};

use anyhow::Context as _;
use clap::Parser;
use fila_analysis::{
  AnalysisService, AnalyzeCaseWorker, CachedClassifier, LlmClassifier, RetirementHook,
  RetirementService,
};
use fila_api::{AppState, ServerConfig};
use fila_cache::SingleFlight;
use fila_cms::{CachedCms, Cms, SeiClient};
use fila_ocr::AzureDocIntel;
use fila_queue::{Runner, Workers};
use fila_store_sqlite::{SqliteCache, SqliteStore};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

const PURGE_INTERVAL: Duration = Duration::from_secs(10 * 60);

#[derive(Parser)]
#[command(author, version, about = "fila retirement analysis server")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "config.toml")]
  config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  // Initialise tracing.
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  // Load configuration.
  let settings = config::Config::builder()
    .add_source(config::File::from(cli.config).required(false))
    .add_source(config::Environment::with_prefix("FILA").separator("__"))
    .build()
    .context("failed to read config file")?;

  let server_cfg: ServerConfig = settings
    .try_deserialize()
    .context("failed to deserialise ServerConfig")?;

  let store_path = expand_tilde(&server_cfg.store_path);
  let store = SqliteStore::open(&store_path)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;

  // External collaborators, each behind the shared cache.
  let cache = SingleFlight::new(store.cache());
  let cms: Arc<dyn Cms> = Arc::new(CachedCms::new(
    SeiClient::new(server_cfg.cms.clone()),
    cache.clone(),
  ));
  let ocr = Arc::new(AzureDocIntel::new(server_cfg.ocr.clone()));
  let classifier = Arc::new(CachedClassifier::new(
    LlmClassifier::new(server_cfg.llm.clone()),
    cache,
  ));

  let mut analysis =
    AnalysisService::new(store.clone(), store.queue(), cms.clone(), ocr, classifier);
  analysis.register_hook(RetirementHook);
  let analysis = Arc::new(analysis);

  // Background jobs.
  let mut workers = Workers::new();
  workers
    .add(AnalyzeCaseWorker::new(analysis.clone()))
    .context("failed to register analysis worker")?;
  let runner = Runner::new(store.queue(), workers, (&server_cfg.queue).into());

  let shutdown = CancellationToken::new();
  let runner_task = tokio::spawn({
    let shutdown = shutdown.clone();
    async move { runner.run(shutdown).await }
  });
  let purge_task = tokio::spawn(purge_cache(store.cache(), shutdown.clone()));

  // The data lake has no backend in this build; its routes answer 503.
  tracing::info!("no data lake backend configured");
  let state = AppState {
    analysis,
    retirements: RetirementService::new(store.clone()),
    cms,
    datalake: None,
  };

  let app = fila_api::router(state);
  let address = format!("{}:{}", server_cfg.host, server_cfg.port);

  tracing::info!("Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app)
    .with_graceful_shutdown({
      let shutdown = shutdown.clone();
      async move {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("shutting down");
        shutdown.cancel();
      }
    })
    .await
    .context("server error")?;

  // Covers the server stopping for any reason other than the signal.
  shutdown.cancel();
  runner_task
    .await
    .context("job runner panicked")?
    .context("job runner failed")?;
  purge_task.await.context("cache purge task panicked")?;

  Ok(())
}

/// Periodically drop expired cache rows until `shutdown` fires.
async fn purge_cache(cache: SqliteCache, shutdown: CancellationToken) {
  let mut ticker = tokio::time::interval(PURGE_INTERVAL);
  loop {
    tokio::select! {
      _ = shutdown.cancelled() => return,
      _ = ticker.tick() => {}
    }
    match cache.purge_expired().await {
      Ok(0) => {}
      Ok(removed) => tracing::debug!(removed, "purged expired cache entries"),
      Err(e) => tracing::warn!(error = %e, "cache purge failed"),
    }
  }
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
