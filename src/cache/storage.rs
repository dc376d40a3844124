//! Snapshot storage backends.

use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::traits::SnapshotStorage;

/// Storage implementation that doesn't cache anything.
/// Used when caching is disabled - every read misses.
pub struct NoopStorage;

impl SnapshotStorage for NoopStorage {
  fn read(&self, _slot: &str) -> Result<Option<Vec<u8>>> {
    Ok(None) // Always miss
  }

  fn write(&self, _slot: &str, _data: &[u8]) -> Result<()> {
    Ok(()) // Discard
  }

  fn clear(&self) -> Result<()> {
    Ok(())
  }
}

/// Process-local storage; snapshots vanish on exit.
#[derive(Default)]
pub struct MemoryStorage {
  slots: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryStorage {
  pub fn new() -> Self {
    Self::default()
  }
}

impl SnapshotStorage for MemoryStorage {
  fn read(&self, slot: &str) -> Result<Option<Vec<u8>>> {
    let slots = self
      .slots
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    Ok(slots.get(slot).cloned())
  }

  fn write(&self, slot: &str, data: &[u8]) -> Result<()> {
    let mut slots = self
      .slots
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    slots.insert(slot.to_string(), data.to_vec());
    Ok(())
  }

  fn clear(&self) -> Result<()> {
    let mut slots = self
      .slots
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    slots.clear();
    Ok(())
  }
}

/// One JSON file per slot inside a directory.
pub struct FileStorage {
  dir: PathBuf,
}

impl FileStorage {
  pub fn open(dir: &Path) -> Result<Self> {
    std::fs::create_dir_all(dir)
      .map_err(|e| eyre!("Failed to create cache directory {}: {}", dir.display(), e))?;
    Ok(Self {
      dir: dir.to_path_buf(),
    })
  }

  /// Hashed so any slot name maps to a safe, fixed-length file name.
  fn slot_path(&self, slot: &str) -> PathBuf {
    let mut hasher = Sha256::new();
    hasher.update(slot.as_bytes());
    self
      .dir
      .join(format!("{}.json", hex::encode(hasher.finalize())))
  }
}

impl SnapshotStorage for FileStorage {
  fn read(&self, slot: &str) -> Result<Option<Vec<u8>>> {
    let path = self.slot_path(slot);
    match std::fs::read(&path) {
      Ok(data) => Ok(Some(data)),
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
      Err(e) => Err(eyre!("Failed to read snapshot {}: {}", path.display(), e)),
    }
  }

  fn write(&self, slot: &str, data: &[u8]) -> Result<()> {
    let path = self.slot_path(slot);
    let tmp = path.with_extension("json.tmp");

    // Write-then-rename so readers never see a torn snapshot
    std::fs::write(&tmp, data)
      .map_err(|e| eyre!("Failed to write snapshot {}: {}", tmp.display(), e))?;
    std::fs::rename(&tmp, &path)
      .map_err(|e| eyre!("Failed to replace snapshot {}: {}", path.display(), e))?;
    Ok(())
  }

  fn clear(&self) -> Result<()> {
    let entries = std::fs::read_dir(&self.dir)
      .map_err(|e| eyre!("Failed to list cache directory {}: {}", self.dir.display(), e))?;

    for entry in entries.flatten() {
      let path = entry.path();
      if path.extension().is_some_and(|ext| ext == "json") {
        std::fs::remove_file(&path)
          .map_err(|e| eyre!("Failed to remove snapshot {}: {}", path.display(), e))?;
      }
    }
    Ok(())
  }
}

/// SQLite-based snapshot storage.
pub struct SqliteStorage {
  conn: Mutex<Connection>,
}

impl SqliteStorage {
  /// Open (or create) the database at `path`.
  pub fn open(path: &Path) -> Result<Self> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create cache directory: {}", e))?;
    }

    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open cache database at {}: {}", path.display(), e))?;

    Self::with_connection(conn)
  }

  /// Open a private in-memory database.
  #[cfg(test)]
  pub fn open_in_memory() -> Result<Self> {
    let conn = Connection::open_in_memory()
      .map_err(|e| eyre!("Failed to open in-memory cache database: {}", e))?;
    Self::with_connection(conn)
  }

  fn with_connection(conn: Connection) -> Result<Self> {
    conn
      .execute_batch(CACHE_SCHEMA)
      .map_err(|e| eyre!("Failed to run cache migrations: {}", e))?;

    Ok(Self {
      conn: Mutex::new(conn),
    })
  }
}

/// Schema for the snapshot table.
const CACHE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS snapshots (
    slot TEXT PRIMARY KEY,
    data BLOB NOT NULL,
    written_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;

impl SnapshotStorage for SqliteStorage {
  fn read(&self, slot: &str) -> Result<Option<Vec<u8>>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .query_row(
        "SELECT data FROM snapshots WHERE slot = ?",
        params![slot],
        |row| row.get(0),
      )
      .optional()
      .map_err(|e| eyre!("Failed to read snapshot {}: {}", slot, e))
  }

  fn write(&self, slot: &str, data: &[u8]) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute(
        "INSERT OR REPLACE INTO snapshots (slot, data, written_at)
         VALUES (?, ?, datetime('now'))",
        params![slot, data],
      )
      .map_err(|e| eyre!("Failed to store snapshot {}: {}", slot, e))?;

    Ok(())
  }

  fn clear(&self) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute("DELETE FROM snapshots", [])
      .map_err(|e| eyre!("Failed to clear snapshots: {}", e))?;

    Ok(())
  }
}

/// Get the default cache directory.
pub fn default_dir() -> Result<PathBuf> {
  let data_dir = dirs::data_dir()
    .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
    .ok_or_else(|| eyre!("Could not determine data directory"))?;

  Ok(data_dir.join("pulse"))
}
