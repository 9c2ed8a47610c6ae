//! Read-only lookups against the reporting data lake, memoised through a
//! single-flight cache.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fila_cache::SingleFlight;
use fila_core::{
  BoxError,
  cache::{Cache, remember_json},
  case::Unit,
};
use serde::{Deserialize, Serialize};

use crate::Result;

const LOOKUP_TTL: Duration = Duration::from_secs(2 * 60 * 60);
const UNITS_KEY: &str = "datalake:units";

/// A case currently open at some unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenCase {
  pub number:      String,
  /// Abbreviation of the unit holding the case.
  pub unit:        String,
  pub received_at: DateTime<Utc>,
  /// The unit that opened the case.
  pub origin:      Unit,
}

/// The query backend. Implemented outside this crate.
#[async_trait]
pub trait DataLake: Send + Sync {
  async fn list_open_cases(&self, unit: &str) -> Result<Vec<OpenCase>, BoxError>;

  /// Abbreviations of every unit with open cases.
  async fn list_units(&self) -> Result<Vec<String>, BoxError>;
}

#[async_trait]
impl<D: DataLake + ?Sized> DataLake for std::sync::Arc<D> {
  async fn list_open_cases(&self, unit: &str) -> Result<Vec<OpenCase>, BoxError> {
    (**self).list_open_cases(unit).await
  }

  async fn list_units(&self) -> Result<Vec<String>, BoxError> { (**self).list_units().await }
}

/// Data-lake lookups cached for two hours, with concurrent misses on the same
/// key coalesced into one query.
pub struct DataLakeService<D, K> {
  lake:  D,
  cache: SingleFlight<K>,
}

impl<D: DataLake, K: Cache> DataLakeService<D, K> {
  pub fn new(lake: D, cache: K) -> Self {
    Self {
      lake,
      cache: SingleFlight::new(cache),
    }
  }

  pub async fn list_open_cases(&self, unit: &str) -> Result<Vec<OpenCase>> {
    let lake = &self.lake;
    let key = format!("datalake:cases:{unit}");
    let cases = remember_json(&self.cache, &key, LOOKUP_TTL, move || lake.list_open_cases(unit))
      .await?;
    Ok(cases)
  }

  pub async fn list_units(&self) -> Result<Vec<String>> {
    let lake = &self.lake;
    let units = remember_json(&self.cache, UNITS_KEY, LOOKUP_TTL, move || lake.list_units()).await?;
    Ok(units)
  }
}

#[cfg(test)]
mod tests {
  use std::sync::atomic::{AtomicUsize, Ordering};

  use fila_cache::MemoryCache;

  use super::*;

  #[derive(Default)]
  struct SlowLake {
    queries: AtomicUsize,
  }

  #[async_trait]
  impl DataLake for SlowLake {
    async fn list_open_cases(&self, unit: &str) -> Result<Vec<OpenCase>, BoxError> {
      self.queries.fetch_add(1, Ordering::SeqCst);
      tokio::time::sleep(Duration::from_millis(30)).await;
      if unit == "down" {
        return Err("lake unavailable".into());
      }
      Ok(vec![OpenCase {
        number:      "1500.01.0000001/2025-01".into(),
        unit:        unit.to_owned(),
        received_at: Utc::now(),
        origin:      Unit {
          id:           "100".into(),
          abbreviation: "AP/01".into(),
        },
      }])
    }

    async fn list_units(&self) -> Result<Vec<String>, BoxError> {
      self.queries.fetch_add(1, Ordering::SeqCst);
      Ok(vec!["AP/01".into(), "AP/02".into()])
    }
  }

  #[tokio::test]
  async fn concurrent_lookups_share_one_query() {
    let service = DataLakeService::new(SlowLake::default(), MemoryCache::new());
    let (a, b, c) = tokio::join!(
      service.list_open_cases("AP/01"),
      service.list_open_cases("AP/01"),
      service.list_open_cases("AP/01"),
    );
    assert_eq!(a.unwrap(), b.unwrap());
    assert_eq!(c.unwrap()[0].unit, "AP/01");
    assert_eq!(service.lake.queries.load(Ordering::SeqCst), 1);

    service.list_open_cases("AP/01").await.unwrap();
    assert_eq!(service.lake.queries.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn failures_reach_every_caller_and_are_not_cached() {
    let service = DataLakeService::new(SlowLake::default(), MemoryCache::new());
    let (a, b) = tokio::join!(service.list_open_cases("down"), service.list_open_cases("down"));
    assert!(a.is_err() && b.is_err());
    assert_eq!(service.lake.queries.load(Ordering::SeqCst), 1);

    assert!(service.list_open_cases("down").await.is_err());
    assert_eq!(service.lake.queries.load(Ordering::SeqCst), 2);
  }

  #[tokio::test]
  async fn units_are_cached() {
    let service = DataLakeService::new(SlowLake::default(), MemoryCache::new());
    assert_eq!(service.list_units().await.unwrap().len(), 2);
    service.list_units().await.unwrap();
    assert_eq!(service.lake.queries.load(Ordering::SeqCst), 1);
  }
}
