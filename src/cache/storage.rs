//! Cache storage implementations.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::Utc;
use serde_json::Value;

use super::traits::{CacheEntry, CacheStore};
use crate::query::QueryKey;

/// Mutex-guarded in-memory store. Process-lifetime only, never persisted.
#[derive(Debug, Default)]
pub struct MemoryStore {
  entries: Mutex<HashMap<QueryKey, CacheEntry>>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }

  fn entries(&self) -> std::sync::MutexGuard<'_, HashMap<QueryKey, CacheEntry>> {
    // A poisoned lock only means another writer panicked; the map itself
    // is still usable.
    match self.entries.lock() {
      Ok(guard) => guard,
      Err(poisoned) => poisoned.into_inner(),
    }
  }
}

impl CacheStore for MemoryStore {
  fn get(&self, key: &QueryKey) -> Option<CacheEntry> {
    self.entries().get(key).cloned()
  }

  fn set(&self, key: &QueryKey, value: Value) {
    let mut entries = self.entries();
    let version = entries.get(key).map(|e| e.version + 1).unwrap_or(1);

    entries.insert(
      key.clone(),
      CacheEntry {
        value,
        version,
        cached_at: Utc::now(),
      },
    );
  }

  fn has(&self, key: &QueryKey) -> bool {
    self.entries().contains_key(key)
  }

  fn remove(&self, key: &QueryKey) {
    self.entries().remove(key);
  }
}

/// Storage implementation that doesn't cache anything.
/// Used when caching is disabled - all operations are no-ops.
pub struct NoopStore;

impl CacheStore for NoopStore {
  fn get(&self, _key: &QueryKey) -> Option<CacheEntry> {
    None // Always miss
  }

  fn set(&self, _key: &QueryKey, _value: Value) {
    // Discard
  }

  fn has(&self, _key: &QueryKey) -> bool {
    false
  }

  fn remove(&self, _key: &QueryKey) {}
}
