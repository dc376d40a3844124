//! Offline-first snapshot cache.
//!
//! This module provides a storage-agnostic cache that:
//! - Persists the last successful listing per slot (memory, file or SQLite)
//! - Serves that snapshot immediately and refreshes it in the background
//! - Tracks background refreshes so shutdown can wait for them

mod layer;
mod storage;
mod tasks;
mod traits;

use color_eyre::Result;
use std::sync::Arc;

use crate::config::{CacheBackend, CacheConfig};

pub use layer::SnapshotCache;
pub use storage::{FileStorage, MemoryStorage, NoopStorage, SqliteStorage};
pub use tasks::BackgroundTasks;
pub use traits::{CacheResult, CacheSource, Cacheable, SnapshotStorage};

/// Build the configured storage backend.
pub fn open_storage(config: &CacheConfig) -> Result<Arc<dyn SnapshotStorage>> {
  let dir = || match &config.path {
    Some(path) => Ok(path.clone()),
    None => storage::default_dir(),
  };

  let storage: Arc<dyn SnapshotStorage> = match config.backend {
    CacheBackend::None => Arc::new(NoopStorage),
    CacheBackend::Memory => Arc::new(MemoryStorage::new()),
    CacheBackend::File => Arc::new(FileStorage::open(&dir()?)?),
    CacheBackend::Sqlite => Arc::new(SqliteStorage::open(&dir()?.join("cache.db"))?),
  };
  Ok(storage)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_open_file_backend_in_configured_dir() {
    let dir = tempfile::tempdir().unwrap();
    let config = CacheConfig {
      backend: CacheBackend::File,
      path: Some(dir.path().join("snapshots")),
    };

    let storage = open_storage(&config).unwrap();
    storage.write("workspaces", b"[]").unwrap();
    assert!(dir.path().join("snapshots").is_dir());
  }

  #[test]
  fn test_open_sqlite_backend_creates_database() {
    let dir = tempfile::tempdir().unwrap();
    let config = CacheConfig {
      backend: CacheBackend::Sqlite,
      path: Some(dir.path().to_path_buf()),
    };

    open_storage(&config).unwrap();
    assert!(dir.path().join("cache.db").exists());
  }
}
