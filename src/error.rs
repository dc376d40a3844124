use std::time::Duration;
use thiserror::Error;

use crate::remote::RemoteError;

/// Failure of a single remote store operation.
///
/// Reads absorb these at the executor boundary; writes hand them back to
/// the caller.
#[derive(Debug, Error)]
pub enum StoreError {
  #[error("remote store error: {0}")]
  Remote(#[from] RemoteError),
  #[error("timeout: {label} exceeded {}ms", after.as_millis())]
  Timeout { label: String, after: Duration },
  #[error("authentication required")]
  AuthRequired,
  #[error("unexpected row shape from {table}: {source}")]
  Decode {
    table: String,
    #[source]
    source: serde_json::Error,
  },
}

impl StoreError {
  pub fn is_timeout(&self) -> bool {
    matches!(self, StoreError::Timeout { .. })
  }
}
