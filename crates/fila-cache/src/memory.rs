//! [`MemoryCache`]: a process-local TTL map.

use std::{
  collections::HashMap,
  sync::{Arc, PoisonError, RwLock, Weak},
  time::Duration,
};

use bytes::Bytes;
use tokio::time::Instant;

use fila_core::cache::{Cache, CacheError};

pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

struct Entry {
  value:      Bytes,
  expires_at: Option<Instant>,
}

impl Entry {
  fn is_live(&self, now: Instant) -> bool { self.expires_at.is_none_or(|at| at > now) }
}

type Entries = RwLock<HashMap<String, Entry>>;

/// A [`Cache`] held in process memory.
///
/// Expired entries are invisible to reads immediately and physically removed
/// by a background sweep. The sweep task holds only a weak reference and
/// stops once the last clone of the cache is dropped.
///
/// Cloning is cheap and clones share entries.
#[derive(Clone)]
pub struct MemoryCache {
  entries: Arc<Entries>,
}

impl MemoryCache {
  /// Create a cache swept every minute. Must be called inside a tokio
  /// runtime for the sweep to run.
  pub fn new() -> Self { Self::with_sweep_interval(DEFAULT_SWEEP_INTERVAL) }

  pub fn with_sweep_interval(every: Duration) -> Self {
    let entries = Arc::new(Entries::default());
    match tokio::runtime::Handle::try_current() {
      Ok(handle) => {
        handle.spawn(sweep(Arc::downgrade(&entries), every));
      }
      Err(_) => tracing::warn!("no tokio runtime; memory cache will not be swept"),
    }
    Self { entries }
  }

  /// Number of stored entries, including expired ones not yet swept.
  pub fn len(&self) -> usize {
    self
      .entries
      .read()
      .unwrap_or_else(PoisonError::into_inner)
      .len()
  }

  pub fn is_empty(&self) -> bool { self.len() == 0 }
}

impl Default for MemoryCache {
  fn default() -> Self { Self::new() }
}

async fn sweep(entries: Weak<Entries>, every: Duration) {
  let mut ticker = tokio::time::interval(every);
  ticker.tick().await;
  loop {
    ticker.tick().await;
    let Some(entries) = entries.upgrade() else {
      break;
    };
    let now = Instant::now();
    let mut map = entries.write().unwrap_or_else(PoisonError::into_inner);
    let before = map.len();
    map.retain(|_, e| e.is_live(now));
    let removed = before - map.len();
    if removed > 0 {
      tracing::debug!(removed, "swept expired cache entries");
    }
  }
}

impl Cache for MemoryCache {
  async fn get(&self, key: &str) -> Result<Option<Bytes>, CacheError> {
    let map = self.entries.read().unwrap_or_else(PoisonError::into_inner);
    Ok(
      map
        .get(key)
        .filter(|e| e.is_live(Instant::now()))
        .map(|e| e.value.clone()),
    )
  }

  async fn put(&self, key: &str, value: Bytes, ttl: Duration) -> Result<(), CacheError> {
    let expires_at = if ttl.is_zero() {
      None
    } else {
      Instant::now().checked_add(ttl)
    };
    self
      .entries
      .write()
      .unwrap_or_else(PoisonError::into_inner)
      .insert(key.to_owned(), Entry { value, expires_at });
    Ok(())
  }

  async fn delete(&self, key: &str) -> Result<(), CacheError> {
    self
      .entries
      .write()
      .unwrap_or_else(PoisonError::into_inner)
      .remove(key);
    Ok(())
  }
}
