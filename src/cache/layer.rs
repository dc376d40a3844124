//! Snapshot cache that serves the last good listing and refreshes it in the
//! background.

use color_eyre::{eyre::eyre, Result};
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, warn};

use super::tasks::BackgroundTasks;
use super::traits::{CacheResult, Cacheable, SnapshotStorage};

/// Offline-first cache over a [`SnapshotStorage`] backend.
///
/// There is no expiry: every `load` refreshes opportunistically. Concurrent
/// loads may each start a refresh; they overwrite the same slot.
pub struct SnapshotCache {
  storage: Arc<dyn SnapshotStorage>,
  tasks: BackgroundTasks,
}

impl SnapshotCache {
  /// Create a new cache with the given storage backend.
  pub fn new(storage: Arc<dyn SnapshotStorage>, tasks: BackgroundTasks) -> Self {
    Self { storage, tasks }
  }

  pub fn tasks(&self) -> &BackgroundTasks {
    &self.tasks
  }

  /// Read the persisted snapshot for `T`.
  ///
  /// An unreadable or undecodable snapshot counts as empty.
  pub fn snapshot<T: Cacheable>(&self) -> Vec<T> {
    let raw = match self.storage.read(T::slot()) {
      Ok(Some(raw)) => raw,
      Ok(None) => return Vec::new(),
      Err(e) => {
        warn!(slot = T::slot(), "failed to read snapshot: {}", e);
        return Vec::new();
      }
    };

    serde_json::from_slice(&raw).unwrap_or_else(|e| {
      warn!(slot = T::slot(), "discarding undecodable snapshot: {}", e);
      Vec::new()
    })
  }

  /// Overwrite the snapshot for `T`.
  pub fn store<T: Cacheable>(&self, data: &[T]) -> Result<()> {
    let raw =
      serde_json::to_vec(data).map_err(|e| eyre!("Failed to serialize snapshot: {}", e))?;
    self.storage.write(T::slot(), &raw)
  }

  /// Evict every snapshot.
  pub fn clear(&self) -> Result<()> {
    self.storage.clear()
  }

  /// Load a listing, snapshot first.
  ///
  /// `fetch` yields `None` when the remote read failed.
  /// 1. Snapshot non-empty: return it now, refresh in the background
  /// 2. Snapshot empty: await the fetch and persist it on success
  ///
  /// A failed fetch never touches the snapshot.
  pub async fn load<T, F, Fut>(&self, fetch: F) -> CacheResult<Vec<T>>
  where
    T: Cacheable,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Option<Vec<T>>> + Send + 'static,
  {
    let cached = self.snapshot::<T>();

    if !cached.is_empty() {
      let cache = self.clone();
      let refresh = fetch();
      self.tasks.spawn(T::slot(), async move {
        match refresh.await {
          Some(fresh) => match cache.store(&fresh) {
            Ok(()) => debug!(slot = T::slot(), count = fresh.len(), "snapshot refreshed"),
            Err(e) => warn!(slot = T::slot(), "failed to persist refreshed snapshot: {}", e),
          },
          None => warn!(slot = T::slot(), "background refresh failed, keeping snapshot"),
        }
      });
      return CacheResult::from_snapshot(cached);
    }

    match fetch().await {
      Some(fresh) => {
        if let Err(e) = self.store(&fresh) {
          warn!(slot = T::slot(), "failed to persist snapshot: {}", e);
        }
        CacheResult::from_network(fresh)
      }
      None => CacheResult::unavailable(cached),
    }
  }
}

impl Clone for SnapshotCache {
  fn clone(&self) -> Self {
    Self {
      storage: Arc::clone(&self.storage),
      tasks: self.tasks.clone(),
    }
  }
}
