//! Query descriptors, execution variables, and cache key derivation.
//!
//! A [`Query`] is an immutable named operation. [`Variables`] bind parameter
//! values for one execution. Together they derive a [`QueryKey`], the
//! deterministic identity used for cache lookups and in-flight request
//! deduplication.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

/// A named, parameterized request for data.
///
/// The operation body is opaque text (e.g., a GraphQL document). Formatting
/// differences in the body do not affect cache identity: the body is
/// whitespace-normalized before hashing.
///
/// # Example
///
/// ```ignore
/// let query = Query::new("GetDogs", "query GetDogs { dogs { id breed } }");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
  name: String,
  body: String,
}

impl Query {
  pub fn new(name: impl Into<String>, body: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      body: body.into(),
    }
  }

  /// Operation name, sent as `operationName` on the wire.
  pub fn name(&self) -> &str {
    &self.name
  }

  /// Operation body text.
  pub fn body(&self) -> &str {
    &self.body
  }
}

/// Parameter values bound to a [`Query`] for one execution.
///
/// Backed by a `BTreeMap` so serialization, and therefore cache identity,
/// never depends on insertion order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Variables {
  values: BTreeMap<String, Value>,
}

impl Variables {
  pub fn new() -> Self {
    Self::default()
  }

  /// Bind a variable, builder-style.
  pub fn set(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
    self.values.insert(name.into(), value.into());
    self
  }

  pub fn get(&self, name: &str) -> Option<&Value> {
    self.values.get(name)
  }

  pub fn is_empty(&self) -> bool {
    self.values.is_empty()
  }

  pub fn len(&self) -> usize {
    self.values.len()
  }

  /// Canonical JSON rendering used for cache key derivation.
  ///
  /// Keys are emitted in sorted order (BTreeMap), so structurally equal
  /// variable sets always render identically.
  fn canonical_json(&self) -> String {
    serde_json::to_string(&self.values).unwrap_or_default()
  }
}

/// Deterministic cache identity of a (Query, Variables) pair.
///
/// A SHA-256 hex digest over the operation name, the normalized body, and
/// the canonical variable rendering. Identical inputs always produce the
/// same key regardless of body formatting or variable insertion order.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryKey(String);

impl QueryKey {
  pub fn compute(query: &Query, variables: &Variables) -> Self {
    let mut hasher = Sha256::new();
    // Null byte separators keep the input prefix-free
    hasher.update(query.name().as_bytes());
    hasher.update([0u8]);
    hasher.update(normalize_body(query.body()).as_bytes());
    hasher.update([0u8]);
    hasher.update(variables.canonical_json().as_bytes());

    QueryKey(hex::encode(hasher.finalize()))
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl std::fmt::Display for QueryKey {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.0)
  }
}

/// Normalize an operation body for consistent hashing.
/// Collapses whitespace runs so reformatted documents hash identically.
fn normalize_body(body: &str) -> String {
  body.split_whitespace().collect::<Vec<_>>().join(" ")
}
