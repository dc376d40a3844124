//! Scriptable store wrapper for tests.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::client::{RemoteError, RemoteStore};
use super::memory::MemoryStore;
use super::query::{Filter, Query};

/// Wraps a [`MemoryStore`], counting calls and injecting failures or delay.
#[derive(Default)]
pub struct ScriptedStore {
  pub inner: MemoryStore,
  failures: AtomicUsize,
  delay_ms: AtomicUsize,
  selects: AtomicUsize,
  writes: AtomicUsize,
}

impl ScriptedStore {
  pub fn new() -> Arc<Self> {
    Arc::new(Self::default())
  }

  /// Fail the next `n` calls with a transport error.
  pub fn fail_next(&self, n: usize) {
    self.failures.store(n, Ordering::SeqCst);
  }

  /// Fail every call from now on.
  pub fn go_offline(&self) {
    self.fail_next(usize::MAX);
  }

  pub fn set_delay(&self, delay: Duration) {
    self.delay_ms.store(delay.as_millis() as usize, Ordering::SeqCst);
  }

  pub fn selects(&self) -> usize {
    self.selects.load(Ordering::SeqCst)
  }

  pub fn writes(&self) -> usize {
    self.writes.load(Ordering::SeqCst)
  }

  pub fn calls(&self) -> usize {
    self.selects() + self.writes()
  }

  async fn before_call(&self) -> Result<(), RemoteError> {
    let delay = self.delay_ms.load(Ordering::SeqCst);
    if delay > 0 {
      tokio::time::sleep(Duration::from_millis(delay as u64)).await;
    }
    let failing = self
      .failures
      .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| match n {
        0 => None,
        usize::MAX => Some(usize::MAX),
        n => Some(n - 1),
      })
      .is_ok();
    if failing {
      return Err(RemoteError::Transport("connection reset".to_string()));
    }
    Ok(())
  }
}

#[async_trait]
impl RemoteStore for ScriptedStore {
  async fn select(&self, query: &Query) -> Result<Vec<Value>, RemoteError> {
    self.selects.fetch_add(1, Ordering::SeqCst);
    self.before_call().await?;
    self.inner.select(query).await
  }

  async fn insert(&self, table: &str, rows: Vec<Value>) -> Result<Vec<Value>, RemoteError> {
    self.writes.fetch_add(1, Ordering::SeqCst);
    self.before_call().await?;
    self.inner.insert(table, rows).await
  }

  async fn update(
    &self,
    table: &str,
    filters: &[Filter],
    patch: Value,
  ) -> Result<Vec<Value>, RemoteError> {
    self.writes.fetch_add(1, Ordering::SeqCst);
    self.before_call().await?;
    self.inner.update(table, filters, patch).await
  }

  async fn upsert(
    &self,
    table: &str,
    rows: Vec<Value>,
    on_conflict: &[&str],
  ) -> Result<Vec<Value>, RemoteError> {
    self.writes.fetch_add(1, Ordering::SeqCst);
    self.before_call().await?;
    self.inner.upsert(table, rows, on_conflict).await
  }
}
