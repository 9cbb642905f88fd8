//! Core trait and entry type for the caching system.

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::query::QueryKey;

/// A single cached query result.
///
/// Owned exclusively by the store; mutated only through the client's write
/// path. The version is bumped on every overwrite, the timestamp feeds
/// staleness checks.
#[derive(Debug, Clone)]
pub struct CacheEntry {
  /// Last-known successful result value.
  pub value: Value,
  /// Monotonic per-key write counter, starting at 1.
  pub version: u64,
  /// When the value was written.
  pub cached_at: DateTime<Utc>,
}

/// Trait for cache storage backends.
///
/// Unbounded growth is acceptable at this scope; the trait boundary is where
/// an eviction policy would slot in.
pub trait CacheStore: Send + Sync {
  /// Pure lookup, no side effects.
  fn get(&self, key: &QueryKey) -> Option<CacheEntry>;

  /// Insert or overwrite the value for a key, bumping the entry version.
  fn set(&self, key: &QueryKey, value: Value);

  fn has(&self, key: &QueryKey) -> bool;

  /// Drop the entry for a key, if any.
  fn remove(&self, key: &QueryKey);
}
