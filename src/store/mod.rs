//! Persistent key-value store for view state.
//!
//! Values are plain strings with a time-to-live, read back as absent once
//! expired. The application talks to the `KeyValueStore` trait so the SQLite
//! backend can be swapped for an in-memory one.

mod sqlite;

use chrono::{DateTime, Duration, Utc};
use color_eyre::{eyre::eyre, Result};
use std::collections::HashMap;
use std::sync::Mutex;

pub use sqlite::SqliteStore;

/// Lifetime of every stored value
pub const TTL_DAYS: i64 = 30;

pub fn default_ttl() -> Duration {
  Duration::days(TTL_DAYS)
}

/// Keys the dashboard persists between sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreKey {
  DateStart,
  DateEnd,
  Region,
  /// Percentage of the screen height given to the chart panel
  Size,
  /// Percentage of the chart panel given to the statistics column
  SizeDepth,
  ZoomLevel,
  Eastings,
  Northings,
}

impl StoreKey {
  pub fn as_str(&self) -> &'static str {
    match self {
      StoreKey::DateStart => "dateStart",
      StoreKey::DateEnd => "dateEnd",
      StoreKey::Region => "region",
      StoreKey::Size => "size",
      StoreKey::SizeDepth => "sizeDepth",
      StoreKey::ZoomLevel => "zoomLevel",
      StoreKey::Eastings => "eastings",
      StoreKey::Northings => "northings",
    }
  }
}

/// Trait for view-state storage backends.
pub trait KeyValueStore: Send + Sync {
  /// Get a value, `None` if missing or expired.
  fn get(&self, key: StoreKey) -> Result<Option<String>>;

  /// Store a value that expires after `ttl`.
  fn set(&self, key: StoreKey, value: &str, ttl: Duration) -> Result<()>;

  /// Store a value with the default lifetime, logging instead of failing.
  fn persist(&self, key: StoreKey, value: &str) {
    if let Err(e) = self.set(key, value, default_ttl()) {
      tracing::warn!(key = key.as_str(), error = %e, "failed to persist value");
    }
  }

  /// Read a value, logging read errors and treating them as missing.
  fn read(&self, key: StoreKey) -> Option<String> {
    self.get(key).unwrap_or_else(|e| {
      tracing::warn!(key = key.as_str(), error = %e, "failed to read value");
      None
    })
  }
}

/// In-memory store. Used when the database cannot be opened, and in tests.
#[derive(Default)]
pub struct MemoryStore {
  values: Mutex<HashMap<StoreKey, (String, DateTime<Utc>)>>,
  #[cfg(test)]
  writes: std::sync::atomic::AtomicUsize,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }

  /// Number of `set` calls so far
  #[cfg(test)]
  pub fn writes(&self) -> usize {
    self.writes.load(std::sync::atomic::Ordering::SeqCst)
  }
}

impl KeyValueStore for MemoryStore {
  fn get(&self, key: StoreKey) -> Result<Option<String>> {
    let values = self
      .values
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    Ok(
      values
        .get(&key)
        .filter(|(_, expires_at)| *expires_at > Utc::now())
        .map(|(value, _)| value.clone()),
    )
  }

  fn set(&self, key: StoreKey, value: &str, ttl: Duration) -> Result<()> {
    let mut values = self
      .values
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    values.insert(key, (value.to_string(), Utc::now() + ttl));
    #[cfg(test)]
    self
      .writes
      .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_memory_store_roundtrip() {
    let store = MemoryStore::new();
    assert_eq!(store.get(StoreKey::Region).unwrap(), None);

    store.persist(StoreKey::Region, "3011");
    assert_eq!(store.read(StoreKey::Region), Some("3011".to_string()));
    assert_eq!(store.writes(), 1);
  }

  #[test]
  fn test_memory_store_expiry() {
    let store = MemoryStore::new();
    store
      .set(StoreKey::ZoomLevel, "9", Duration::seconds(-1))
      .unwrap();
    assert_eq!(store.read(StoreKey::ZoomLevel), None);
  }

  #[test]
  fn test_key_names() {
    assert_eq!(StoreKey::DateStart.as_str(), "dateStart");
    assert_eq!(StoreKey::SizeDepth.as_str(), "sizeDepth");
    assert_eq!(StoreKey::Northings.as_str(), "northings");
  }
}
