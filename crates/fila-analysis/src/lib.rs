//! The analysis pipeline: ingest a case from the CMS, extract its documents,
//! classify them and persist the outcome.
//!
//! [`AnalysisService`] owns the orchestration and runs its registered
//! [`AnalyzeHook`](fila_core::hook::AnalyzeHook)s inside the analysis
//! transaction. [`AnalyzeCaseWorker`] drives it from the job queue.

mod classifier_cache;
mod datalake;
mod fetcher;
mod llm;
mod retirement;
mod service;
mod worker;

#[cfg(test)]
mod testing;

pub mod error;

pub use classifier_cache::CachedClassifier;
pub use datalake::{DataLake, DataLakeService, OpenCase};
pub use error::{Error, LlmError, Result};
pub use fetcher::{DEFAULT_CONCURRENCY, DocumentFetcher, FetchedDocument};
pub use llm::{LlmClassifier, LlmConfig, render_documents};
pub use retirement::{RetirementHook, RetirementService};
pub use service::AnalysisService;
pub use worker::{AnalyzeCaseArgs, AnalyzeCaseWorker};
