//! Transport seam between the client and the remote endpoint.
//!
//! A [`Transport`] sends one operation and returns the parsed response body
//! or a typed error, nothing more. No retries, no caching - both belong to
//! the layers above.

mod http;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::TransportError;
use crate::query::{Query, Variables};

pub use http::HttpTransport;

/// Response body as returned by a transport, before envelope parsing.
///
/// A generic tree of scalars, maps, and sequences; no compile-time schema
/// is assumed. Callers declare an expected shape explicitly when reading
/// result data.
#[derive(Debug, Clone)]
pub struct RawResponse {
  pub body: Value,
}

/// A one-shot request/response channel to the remote endpoint.
///
/// Implementations must not retry internally; retry policy belongs to the
/// caller. Each failure mode is distinguishable via [`TransportError`].
#[async_trait]
pub trait Transport: Send + Sync {
  async fn send(&self, query: &Query, variables: &Variables)
    -> Result<RawResponse, TransportError>;
}
