//! [`SingleFlight`]: duplicate-load suppression in front of a cache.

use std::{
  collections::HashMap,
  future::Future,
  sync::{Arc, Mutex, PoisonError},
  time::Duration,
};

use bytes::Bytes;
use tokio::sync::watch;

use fila_core::{
  BoxError,
  cache::{Cache, CacheError},
};

type Outcome = Option<Result<Bytes, CacheError>>;
type Flights = Mutex<HashMap<String, watch::Receiver<Outcome>>>;

/// Wraps a [`Cache`] so that concurrent [`Cache::remember`] calls for the same
/// key run `load` once. Every caller receives the leader's result, including
/// its error. If the leader's future is dropped before finishing, waiters
/// receive [`CacheError::Cancelled`].
///
/// Coalescing is process-local; `get`, `put` and `delete` pass straight
/// through.
#[derive(Clone)]
pub struct SingleFlight<C> {
  inner:   C,
  flights: Arc<Flights>,
}

impl<C> SingleFlight<C> {
  pub fn new(inner: C) -> Self {
    Self {
      inner,
      flights: Arc::default(),
    }
  }

  pub fn inner(&self) -> &C { &self.inner }
}

enum Role {
  Leader(FlightGuard),
  Waiter(watch::Receiver<Outcome>),
}

/// Owns the sender of one flight; unregisters the flight when dropped.
struct FlightGuard {
  key:     String,
  flights: Arc<Flights>,
  tx:      watch::Sender<Outcome>,
}

impl Drop for FlightGuard {
  fn drop(&mut self) {
    self
      .flights
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .remove(&self.key);
  }
}

impl<C: Cache> SingleFlight<C> {
  fn join(&self, key: &str) -> Role {
    let mut flights = self.flights.lock().unwrap_or_else(PoisonError::into_inner);
    if let Some(rx) = flights.get(key) {
      return Role::Waiter(rx.clone());
    }
    let (tx, rx) = watch::channel(None);
    flights.insert(key.to_owned(), rx);
    Role::Leader(FlightGuard {
      key: key.to_owned(),
      flights: self.flights.clone(),
      tx,
    })
  }
}

impl<C: Cache> Cache for SingleFlight<C> {
  fn get<'a>(
    &'a self,
    key: &'a str,
  ) -> impl Future<Output = Result<Option<Bytes>, CacheError>> + Send + 'a {
    self.inner.get(key)
  }

  fn put<'a>(
    &'a self,
    key: &'a str,
    value: Bytes,
    ttl: Duration,
  ) -> impl Future<Output = Result<(), CacheError>> + Send + 'a {
    self.inner.put(key, value, ttl)
  }

  fn delete<'a>(
    &'a self,
    key: &'a str,
  ) -> impl Future<Output = Result<(), CacheError>> + Send + 'a {
    self.inner.delete(key)
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
    async move {
      match self.join(key) {
        Role::Leader(guard) => {
          let result = self.inner.remember(key, ttl, load).await;
          guard.tx.send_replace(Some(result.clone()));
          result
        }
        Role::Waiter(mut rx) => {
          // A closed channel without an outcome means the leader was dropped.
          let outcome = rx.wait_for(Option::is_some).await.map(|v| v.clone());
          outcome.ok().flatten().unwrap_or(Err(CacheError::Cancelled))
        }
      }
    }
  }
}
