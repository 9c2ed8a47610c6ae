//! In-process cache layers.
//!
//! - [`MemoryCache`]: a TTL map behind a read-write lock, swept periodically.
//! - [`SingleFlight`]: coalesces concurrent [`remember`] calls on one key into
//!   a single load, in front of any other [`Cache`].
//!
//! [`remember`]: fila_core::cache::Cache::remember
//! [`Cache`]: fila_core::cache::Cache

mod memory;
mod single_flight;

pub use memory::MemoryCache;
pub use single_flight::SingleFlight;
