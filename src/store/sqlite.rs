//! SQLite-backed view-state store.

use chrono::{DateTime, Duration, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::{KeyValueStore, StoreKey};

/// SQLite stores timestamps as "YYYY-MM-DD HH:MM:SS"
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS kv_store (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    expires_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_kv_store_expires ON kv_store(expires_at);
"#;

pub struct SqliteStore {
  conn: Mutex<Connection>,
}

impl SqliteStore {
  /// Open or create the store at the default location
  pub fn open() -> Result<Self> {
    let path = Self::default_path()?;

    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create state directory: {}", e))?;
    }

    Self::open_at(&path)
  }

  /// Open or create the store at the given path
  pub fn open_at(path: &Path) -> Result<Self> {
    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open state database at {}: {}", path.display(), e))?;
    Self::from_connection(conn)
  }

  #[cfg(test)]
  fn in_memory() -> Result<Self> {
    let conn = Connection::open_in_memory()
      .map_err(|e| eyre!("Failed to open in-memory database: {}", e))?;
    Self::from_connection(conn)
  }

  fn from_connection(conn: Connection) -> Result<Self> {
    let store = Self {
      conn: Mutex::new(conn),
    };
    store.run_migrations()?;
    store.purge_expired()?;
    Ok(store)
  }

  fn default_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("skredview").join("state.db"))
  }

  fn run_migrations(&self) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute_batch(SCHEMA)
      .map_err(|e| eyre!("Failed to run state migrations: {}", e))?;

    Ok(())
  }

  /// Delete every expired row
  fn purge_expired(&self) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let removed = conn
      .execute(
        "DELETE FROM kv_store WHERE expires_at <= ?",
        params![format_timestamp(Utc::now())],
      )
      .map_err(|e| eyre!("Failed to purge expired values: {}", e))?;

    if removed > 0 {
      tracing::debug!(removed, "purged expired state values");
    }
    Ok(())
  }
}

impl KeyValueStore for SqliteStore {
  fn get(&self, key: StoreKey) -> Result<Option<String>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .query_row(
        "SELECT value FROM kv_store WHERE key = ? AND expires_at > ?",
        params![key.as_str(), format_timestamp(Utc::now())],
        |row| row.get(0),
      )
      .optional()
      .map_err(|e| eyre!("Failed to read {}: {}", key.as_str(), e))
  }

  fn set(&self, key: StoreKey, value: &str, ttl: Duration) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute(
        "INSERT OR REPLACE INTO kv_store (key, value, expires_at) VALUES (?, ?, ?)",
        params![key.as_str(), value, format_timestamp(Utc::now() + ttl)],
      )
      .map_err(|e| eyre!("Failed to write {}: {}", key.as_str(), e))?;

    Ok(())
  }
}

fn format_timestamp(at: DateTime<Utc>) -> String {
  at.format(TIMESTAMP_FORMAT).to_string()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_set_and_get() {
    let store = SqliteStore::in_memory().unwrap();
    store
      .set(StoreKey::DateStart, "2023-01-01", Duration::days(30))
      .unwrap();
    assert_eq!(
      store.get(StoreKey::DateStart).unwrap(),
      Some("2023-01-01".to_string())
    );
    assert_eq!(store.get(StoreKey::DateEnd).unwrap(), None);
  }

  #[test]
  fn test_overwrite() {
    let store = SqliteStore::in_memory().unwrap();
    store.persist(StoreKey::Eastings, "438700");
    store.persist(StoreKey::Eastings, "440000");
    assert_eq!(store.read(StoreKey::Eastings), Some("440000".to_string()));
  }

  #[test]
  fn test_expired_value_is_absent() {
    let store = SqliteStore::in_memory().unwrap();
    store
      .set(StoreKey::Region, "3011", Duration::seconds(-5))
      .unwrap();
    assert_eq!(store.get(StoreKey::Region).unwrap(), None);
  }

  #[test]
  fn test_open_at_file_persists() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.db");
    {
      let store = SqliteStore::open_at(&path).unwrap();
      store.persist(StoreKey::ZoomLevel, "12");
    }
    let store = SqliteStore::open_at(&path).unwrap();
    assert_eq!(store.read(StoreKey::ZoomLevel), Some("12".to_string()));
  }
}
