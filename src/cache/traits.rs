//! Core traits and types for the snapshot cache.

use color_eyre::Result;
use serde::{de::DeserializeOwned, Serialize};

/// Backend holding serialized snapshots, one per named slot.
///
/// Slots are read and written whole; there is no partial update.
pub trait SnapshotStorage: Send + Sync {
  fn read(&self, slot: &str) -> Result<Option<Vec<u8>>>;

  fn write(&self, slot: &str, data: &[u8]) -> Result<()>;

  /// Evict every slot.
  fn clear(&self) -> Result<()>;
}

/// Trait for entities whose listing can be snapshotted.
pub trait Cacheable: Clone + Send + Sync + Serialize + DeserializeOwned + 'static {
  /// Slot name the listing is persisted under
  fn slot() -> &'static str;
}

/// Result of a cache load, including where the data came from.
#[derive(Debug, Clone)]
pub struct CacheResult<T> {
  pub data: T,
  pub source: CacheSource,
}

impl<T> CacheResult<T> {
  pub fn from_network(data: T) -> Self {
    Self {
      data,
      source: CacheSource::Network,
    }
  }

  pub fn from_snapshot(data: T) -> Self {
    Self {
      data,
      source: CacheSource::Snapshot,
    }
  }

  pub fn unavailable(data: T) -> Self {
    Self {
      data,
      source: CacheSource::Unavailable,
    }
  }
}

/// Indicates where loaded data came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
  /// Fetched from the remote store just now
  Network,
  /// Last known good snapshot; a background refresh was started
  Snapshot,
  /// Nothing cached and the remote fetch failed
  Unavailable,
}
