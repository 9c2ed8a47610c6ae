//! [`SqliteCache`]: the shared, cross-process level of the cache.

use std::{sync::Arc, time::Duration};

use bytes::Bytes;
use chrono::Utc;
use rusqlite::OptionalExtension as _;
use tokio::sync::Mutex;
use tokio_rusqlite::Connection;

use fila_core::cache::{Cache, CacheError};

use crate::{Error, Result, encode::encode_dt};

/// A [`Cache`] stored in the `cache_entries` table.
///
/// Expired entries are invisible to [`Cache::get`] and removed by
/// [`SqliteCache::purge_expired`].
#[derive(Clone)]
pub struct SqliteCache {
  conn: Connection,
  gate: Arc<Mutex<()>>,
}

impl SqliteCache {
  pub(crate) fn new(conn: Connection, gate: Arc<Mutex<()>>) -> Self { Self { conn, gate } }

  /// Delete every expired entry. Returns how many were removed.
  pub async fn purge_expired(&self) -> Result<usize> {
    let now = encode_dt(Utc::now());
    let _gate = self.gate.lock().await;
    Ok(
      self
        .conn
        .call(move |conn| {
          Ok(conn.execute(
            "DELETE FROM cache_entries WHERE expires_at IS NOT NULL AND expires_at <= ?1",
            rusqlite::params![now],
          )?)
        })
        .await?,
    )
  }
}

fn backend(err: tokio_rusqlite::Error) -> CacheError { CacheError::backend(Error::from(err)) }

impl Cache for SqliteCache {
  async fn get(&self, key: &str) -> Result<Option<Bytes>, CacheError> {
    let key = key.to_owned();
    let now = encode_dt(Utc::now());
    let _gate = self.gate.lock().await;
    let value: Option<Vec<u8>> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT value FROM cache_entries WHERE key = ?1 \
               AND (expires_at IS NULL OR expires_at > ?2)",
              rusqlite::params![key, now],
              |row| row.get(0),
            )
            .optional()?,
        )
      })
      .await
      .map_err(backend)?;
    Ok(value.map(Bytes::from))
  }

  async fn put(&self, key: &str, value: Bytes, ttl: Duration) -> Result<(), CacheError> {
    let key = key.to_owned();
    let expires_at = if ttl.is_zero() {
      None
    } else {
      let ttl = chrono::Duration::from_std(ttl).map_err(CacheError::backend)?;
      Utc::now().checked_add_signed(ttl).map(encode_dt)
    };
    let _gate = self.gate.lock().await;
    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO cache_entries (key, value, expires_at) VALUES (?1, ?2, ?3) \
           ON CONFLICT (key) DO UPDATE SET value = excluded.value, \
           expires_at = excluded.expires_at",
          rusqlite::params![key, value.as_ref(), expires_at],
        )?;
        Ok(())
      })
      .await
      .map_err(backend)
  }

  async fn delete(&self, key: &str) -> Result<(), CacheError> {
    let key = key.to_owned();
    let _gate = self.gate.lock().await;
    self
      .conn
      .call(move |conn| {
        conn.execute("DELETE FROM cache_entries WHERE key = ?1", rusqlite::params![key])?;
        Ok(())
      })
      .await
      .map_err(backend)
  }
}
