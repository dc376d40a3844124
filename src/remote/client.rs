//! The remote tabular store seam.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use super::query::{Filter, Query};

#[derive(Debug, Clone, Error)]
pub enum RemoteError {
  #[error("network error: {0}")]
  Transport(String),
  #[error("http {status}: {message}")]
  Http { status: u16, message: String },
  #[error("invalid request: {0}")]
  InvalidRequest(String),
  #[error("{0} returned no rows")]
  Empty(String),
  #[error("attempt aborted: {0}")]
  Aborted(String),
}

/// A remote store exposing select/insert/update/upsert over JSON rows.
///
/// Every call either returns the affected rows or an error, never both.
#[async_trait]
pub trait RemoteStore: Send + Sync {
  async fn select(&self, query: &Query) -> Result<Vec<Value>, RemoteError>;

  /// Insert rows and return them as stored.
  async fn insert(&self, table: &str, rows: Vec<Value>) -> Result<Vec<Value>, RemoteError>;

  /// Merge `patch` into every row matching `filters`.
  async fn update(
    &self,
    table: &str,
    filters: &[Filter],
    patch: Value,
  ) -> Result<Vec<Value>, RemoteError>;

  /// Insert-or-update keyed by the `on_conflict` columns.
  async fn upsert(
    &self,
    table: &str,
    rows: Vec<Value>,
    on_conflict: &[&str],
  ) -> Result<Vec<Value>, RemoteError>;
}
