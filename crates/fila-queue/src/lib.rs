//! Background job execution.
//!
//! Workers are registered per job kind in a [`Workers`] registry; the
//! [`Runner`] claims due jobs from a [`JobBackend`](fila_core::job::JobBackend)
//! and runs them concurrently, translating each [`WorkError`] into the job's
//! next state.

mod runner;
mod worker;

pub mod error;

pub use error::{Error, Result};
pub use runner::{JobOutcome, Runner, RunnerConfig};
pub use worker::{JobContext, WorkError, Worker, Workers};
