//! The key/value cache abstraction.
//!
//! Values are opaque bytes. A zero TTL means the entry never expires.
//! [`Cache::remember`] is the read-through primitive every consumer uses;
//! [`remember_json`] layers serde on top of it.

use std::{future::Future, sync::Arc, time::Duration};

use bytes::Bytes;
use serde::{Serialize, de::DeserializeOwned};
use thiserror::Error;

use crate::BoxError;

/// A reference-counted error, so one failure can be handed to every waiter of
/// a coalesced load.
pub type SharedError = Arc<dyn std::error::Error + Send + Sync>;

/// TTL meaning "keep forever".
pub const NO_EXPIRY: Duration = Duration::ZERO;

#[derive(Debug, Clone, Error)]
pub enum CacheError {
  /// The cache backend itself failed.
  #[error("cache backend error: {0}")]
  Backend(#[source] SharedError),

  /// The loader passed to [`Cache::remember`] failed. Never cached.
  #[error("cache load failed: {0}")]
  Load(#[source] SharedError),

  /// The load this call was waiting on was abandoned by its caller.
  #[error("cache load cancelled")]
  Cancelled,

  /// A cached value could not be decoded. The key has been deleted unless
  /// `cleanup` says otherwise.
  #[error("cached value under {key:?} could not be decoded: {source}")]
  Decode {
    key:     String,
    #[source]
    source:  SharedError,
    cleanup: Option<SharedError>,
  },
}

impl CacheError {
  pub fn backend(err: impl Into<BoxError>) -> Self { Self::Backend(Arc::from(err.into())) }

  pub fn load(err: impl Into<BoxError>) -> Self { Self::Load(Arc::from(err.into())) }
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// A byte-oriented cache with per-entry TTLs.
pub trait Cache: Send + Sync {
  /// The live value under `key`, or `None` if absent or expired.
  fn get<'a>(
    &'a self,
    key: &'a str,
  ) -> impl Future<Output = Result<Option<Bytes>, CacheError>> + Send + 'a;

  fn put<'a>(
    &'a self,
    key: &'a str,
    value: Bytes,
    ttl: Duration,
  ) -> impl Future<Output = Result<(), CacheError>> + Send + 'a;

  fn delete<'a>(
    &'a self,
    key: &'a str,
  ) -> impl Future<Output = Result<(), CacheError>> + Send + 'a;

  /// Return the cached value for `key`; on a miss run `load`, store its result
  /// under `ttl` and return it. A failing `load` stores nothing.
  fn remember<'a, F, Fut>(
    &'a self,
    key: &'a str,
    ttl: Duration,
    load: F,
  ) -> impl Future<Output = Result<Bytes, CacheError>> + Send + 'a
  where
    F: FnOnce() -> Fut + Send + 'a,
    Fut: Future<Output = Result<Bytes, BoxError>> + Send + 'a,
  {
    async move {
      if let Some(hit) = self.get(key).await? {
        return Ok(hit);
      }
      let value = load().await.map_err(CacheError::load)?;
      self.put(key, value.clone(), ttl).await?;
      Ok(value)
    }
  }
}

impl<C: Cache> Cache for Arc<C> {
  fn get<'a>(
    &'a self,
    key: &'a str,
  ) -> impl Future<Output = Result<Option<Bytes>, CacheError>> + Send + 'a {
    (**self).get(key)
  }

  fn put<'a>(
    &'a self,
    key: &'a str,
    value: Bytes,
    ttl: Duration,
  ) -> impl Future<Output = Result<(), CacheError>> + Send + 'a {
    (**self).put(key, value, ttl)
  }

  fn delete<'a>(
    &'a self,
    key: &'a str,
  ) -> impl Future<Output = Result<(), CacheError>> + Send + 'a {
    (**self).delete(key)
  }

  fn remember<'a, F, Fut>(
    &'a self,
    key: &'a str,
    ttl: Duration,
    load: F,
  ) -> impl Future<Output = Result<Bytes, CacheError>> + Send + 'a
  where
    F: FnOnce() -> Fut + Send + 'a,
    Fut: Future<Output = Result<Bytes, BoxError>> + Send + 'a,
  {
    (**self).remember(key, ttl, load)
  }
}

// ─── JSON helper ─────────────────────────────────────────────────────────────

/// [`Cache::remember`] for serde values stored as JSON.
///
/// A cached value that no longer decodes is deleted before the error is
/// returned, so the next call reloads it.
pub async fn remember_json<C, T, F, Fut>(
  cache: &C,
  key: &str,
  ttl: Duration,
  load: F,
) -> Result<T, CacheError>
where
  C: Cache,
  T: Serialize + DeserializeOwned + Send,
  F: FnOnce() -> Fut + Send,
  Fut: Future<Output = Result<T, BoxError>> + Send,
{
  let bytes = cache
    .remember(key, ttl, move || async move {
      let value = load().await?;
      Ok(Bytes::from(serde_json::to_vec(&value)?))
    })
    .await?;

  match serde_json::from_slice(&bytes) {
    Ok(value) => Ok(value),
    Err(err) => {
      let cleanup = cache.delete(key).await.err().map(|e| Arc::new(e) as SharedError);
      Err(CacheError::Decode {
        key: key.to_owned(),
        source: Arc::new(err),
        cleanup,
      })
    }
  }
}
