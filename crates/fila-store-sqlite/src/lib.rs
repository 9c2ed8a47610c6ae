//! SQLite backend for the analysis pipeline.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime. One connection backs the case store,
//! the durable job queue and the shared cache.

mod encode;
mod records;
mod schema;
mod store;

pub mod cache;
pub mod error;
pub mod queue;

pub use cache::SqliteCache;
pub use error::{Error, Result};
pub use queue::SqliteQueue;
pub use store::{SqliteStore, SqliteTx};
