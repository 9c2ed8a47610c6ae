//! Core types and trait definitions for the retirement-case analysis pipeline.
//!
//! This crate is deliberately free of HTTP and database dependencies. It
//! defines the domain records, the store and cache abstractions, the queue
//! contracts, and the capabilities (classifier, analysis hooks) that the
//! pipeline composes.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod cache;
pub mod case;
pub mod classify;
pub mod error;
pub mod hook;
pub mod job;
pub mod retirement;
pub mod score;
pub mod store;
pub mod verdict;

pub use error::{BoxError, Error, Result};
