//! Query client orchestrating transport, cache, and subscriptions.
//!
//! # Caching policy
//!
//! The client is cache-first-only: a fresh cache entry is returned without
//! touching the network, and cached entries never expire unless a
//! `stale_time` is configured. There is no automatic background refresh and
//! no automatic retry; callers re-invoke [`QueryClient::execute`] (which
//! re-enters the deduplication logic) or force a network round trip with
//! [`QueryClient::refetch`].
//!
//! # Deduplication
//!
//! At most one outstanding transport call exists per cache key at any time.
//! Executions for a key that is already in flight attach to the existing
//! request instead of issuing a duplicate call, and every subscriber
//! observes the same settled result.
//!
//! # Example
//!
//! ```ignore
//! let client = QueryClient::new(ClientConfig::new("https://71z1g.sse.codesandbox.io/"))?;
//!
//! let query = Query::new("GetDogs", "query GetDogs { dogs { id breed } }");
//! let mut sub = client.execute(&query, Variables::new());
//!
//! let result = sub.settled().await;
//! match result.state() {
//!     QueryState::Succeeded(data) => println!("{}", data["dogs"][0]["breed"]),
//!     QueryState::Failed(err) => eprintln!("{err}"),
//!     QueryState::Pending => unreachable!(),
//! }
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::Utc;
use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::cache::{CacheEntry, CacheStore, MemoryStore};
use crate::config::ClientConfig;
use crate::error::{ClientError, ErrorInfo, TransportError};
use crate::query::{Query, QueryKey, Variables};
use crate::result::{QueryResult, Subscription};
use crate::transport::{HttpTransport, RawResponse, Transport};

/// Registry of in-flight requests, keyed by cache identity.
///
/// The watch receiver is the request's subscriber channel; attaching a new
/// subscriber is a receiver clone. An entry is removed when its transport
/// call settles.
type InFlightMap = HashMap<QueryKey, watch::Receiver<QueryResult>>;

/// Cache-aware query execution client.
///
/// Owns the result cache and the in-flight request registry; shared across
/// callers by cloning (all clones see the same cache and registry).
#[derive(Clone)]
pub struct QueryClient {
  transport: Arc<dyn Transport>,
  store: Arc<dyn CacheStore>,
  inflight: Arc<Mutex<InFlightMap>>,
  stale_time: Option<Duration>,
}

impl QueryClient {
  /// Create a client with an HTTP transport and in-memory cache.
  pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
    let transport = HttpTransport::new(&config)?;
    Ok(Self::with_parts(
      Arc::new(transport),
      Arc::new(MemoryStore::new()),
      config.stale_time(),
    ))
  }

  /// Assemble a client from explicit parts.
  ///
  /// This is the injection seam: tests and callers with custom transports
  /// or cache backends construct through here.
  pub fn with_parts(
    transport: Arc<dyn Transport>,
    store: Arc<dyn CacheStore>,
    stale_time: Option<Duration>,
  ) -> Self {
    Self {
      transport,
      store,
      inflight: Arc::new(Mutex::new(HashMap::new())),
      stale_time,
    }
  }

  /// Execute a query, cache-first.
  ///
  /// Returns a [`Subscription`] observing the execution. A fresh cache hit
  /// yields an already-settled subscription with no network call; otherwise
  /// the call joins the in-flight request for this key, or starts one.
  ///
  /// Must be called within a tokio runtime.
  pub fn execute(&self, query: &Query, variables: Variables) -> Subscription {
    let key = QueryKey::compute(query, &variables);

    if let Some(entry) = self.fresh_entry(&key) {
      debug!(key = %key, operation = query.name(), version = entry.version, "cache hit");
      let (tx, rx) = watch::channel(QueryResult::succeeded(entry.value));
      // Dropping the sender marks the result terminal
      drop(tx);
      return Subscription::new(rx);
    }

    debug!(key = %key, operation = query.name(), "cache miss");
    self.attach_or_spawn(key, query.clone(), variables)
  }

  /// Execute a query, bypassing the cache read.
  ///
  /// Still deduplicates against the in-flight registry, and still writes the
  /// cache on success. Use this to force a refresh of a cached result.
  pub fn refetch(&self, query: &Query, variables: Variables) -> Subscription {
    let key = QueryKey::compute(query, &variables);
    debug!(key = %key, operation = query.name(), "refetch");
    self.attach_or_spawn(key, query.clone(), variables)
  }

  /// Drop the cached result for a query, so the next execute refetches.
  pub fn invalidate(&self, query: &Query, variables: &Variables) {
    let key = QueryKey::compute(query, variables);
    debug!(key = %key, operation = query.name(), "invalidate");
    self.store.remove(&key);
  }

  /// Cached entry for a key, unless it has outlived the configured
  /// stale time.
  fn fresh_entry(&self, key: &QueryKey) -> Option<CacheEntry> {
    let entry = self.store.get(key)?;

    if let Some(stale_time) = self.stale_time {
      // to_std fails on negative age (clock skew); treat that as fresh
      let age = (Utc::now() - entry.cached_at).to_std().unwrap_or_default();
      if age > stale_time {
        debug!(key = %key, "cache entry stale");
        return None;
      }
    }

    Some(entry)
  }

  /// Join the in-flight request for `key`, or start one.
  fn attach_or_spawn(&self, key: QueryKey, query: Query, variables: Variables) -> Subscription {
    let mut inflight = lock(&self.inflight);

    if let Some(rx) = inflight.get(&key) {
      debug!(key = %key, "joining in-flight request");
      return Subscription::new(rx.clone());
    }

    let (tx, rx) = watch::channel(QueryResult::pending());
    inflight.insert(key.clone(), rx.clone());
    drop(inflight);

    let transport = Arc::clone(&self.transport);
    let store = Arc::clone(&self.store);
    let registry = Arc::clone(&self.inflight);

    tokio::spawn(async move {
      let result = match transport.send(&query, &variables).await {
        Ok(raw) => match parse_envelope(raw) {
          Ok(value) => {
            store.set(&key, value.clone());
            debug!(key = %key, operation = query.name(), "settled: success");
            QueryResult::succeeded(value)
          }
          Err(err) => {
            warn!(key = %key, operation = query.name(), error = %err, "settled: bad envelope");
            QueryResult::failed(ErrorInfo::from(&err))
          }
        },
        Err(err) => {
          warn!(key = %key, operation = query.name(), error = %err, "settled: transport failure");
          QueryResult::failed(ErrorInfo::from(&err))
        }
      };

      // Notify before releasing the slot: an execute landing in between
      // still sees the terminal state through the registry entry.
      let _ = tx.send(result);
      lock(&registry).remove(&key);
    });

    Subscription::new(rx)
  }
}

fn lock(registry: &Mutex<InFlightMap>) -> MutexGuard<'_, InFlightMap> {
  // A poisoned lock only means another writer panicked; the map itself is
  // still usable.
  match registry.lock() {
    Ok(guard) => guard,
    Err(poisoned) => poisoned.into_inner(),
  }
}

/// Extract the result value from a GraphQL response envelope.
///
/// The body must be a JSON object carrying a non-null `data` member. When
/// the server reports execution errors instead, the first error message is
/// surfaced as the malformed-response detail.
fn parse_envelope(raw: RawResponse) -> Result<Value, TransportError> {
  let Value::Object(mut envelope) = raw.body else {
    return Err(TransportError::MalformedResponse(
      "response body is not an object".to_string(),
    ));
  };

  match envelope.remove("data") {
    Some(data) if !data.is_null() => Ok(data),
    _ => {
      let detail = envelope
        .get("errors")
        .and_then(|errors| errors.as_array())
        .and_then(|errors| errors.first())
        .and_then(|error| error.get("message"))
        .and_then(|message| message.as_str())
        .unwrap_or("response has no data field")
        .to_string();

      Err(TransportError::MalformedResponse(detail))
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::error::ErrorKind;
  use async_trait::async_trait;
  use serde_json::json;
  use std::sync::atomic::{AtomicUsize, Ordering};
  use tokio::sync::Notify;

  type Responder = Box<dyn Fn() -> Result<Value, TransportError> + Send + Sync>;

  /// Programmable transport: counts calls, optionally holds each request
  /// open until released.
  struct MockTransport {
    responder: Responder,
    calls: AtomicUsize,
    gate: Option<Notify>,
  }

  impl MockTransport {
    fn returning(body: Value) -> Arc<Self> {
      Arc::new(Self {
        responder: Box::new(move || Ok(body.clone())),
        calls: AtomicUsize::new(0),
        gate: None,
      })
    }

    fn gated(body: Value) -> Arc<Self> {
      Arc::new(Self {
        responder: Box::new(move || Ok(body.clone())),
        calls: AtomicUsize::new(0),
        gate: Some(Notify::new()),
      })
    }

    fn failing(make_err: impl Fn() -> TransportError + Send + Sync + 'static) -> Arc<Self> {
      Arc::new(Self {
        responder: Box::new(move || Err(make_err())),
        calls: AtomicUsize::new(0),
        gate: None,
      })
    }

    fn calls(&self) -> usize {
      self.calls.load(Ordering::SeqCst)
    }

    fn release(&self) {
      if let Some(gate) = &self.gate {
        gate.notify_one();
      }
    }
  }

  #[async_trait]
  impl Transport for MockTransport {
    async fn send(
      &self,
      _query: &Query,
      _variables: &Variables,
    ) -> Result<RawResponse, TransportError> {
      self.calls.fetch_add(1, Ordering::SeqCst);
      if let Some(gate) = &self.gate {
        gate.notified().await;
      }
      (self.responder)().map(|body| RawResponse { body })
    }
  }

  fn init_tracing() {
    let _ = tracing_subscriber::fmt()
      .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
      .try_init();
  }

  fn dogs_envelope() -> Value {
    json!({
      "data": {
        "dogs": [{"__typename": "Dog", "id": "Z1fdFgU", "breed": "affenpinscher"}]
      }
    })
  }

  fn get_dogs() -> Query {
    Query::new("GetDogs", "query GetDogs { dogs { id breed } }")
  }

  fn sleep_ms(ms: u64) -> tokio::time::Sleep {
    tokio::time::sleep(Duration::from_millis(ms))
  }

  #[tokio::test]
  async fn test_get_dogs_scenario() {
    init_tracing();

    let transport = MockTransport::returning(dogs_envelope());
    let client = QueryClient::with_parts(transport.clone(), Arc::new(MemoryStore::new()), None);

    let mut sub = client.execute(&get_dogs(), Variables::new());
    let result = sub.settled().await;

    assert!(!result.loading());
    assert!(result.error().is_none());
    let data = result.data().expect("data present");
    assert_eq!(data["dogs"][0]["breed"], json!("affenpinscher"));
    assert_eq!(transport.calls(), 1);
  }

  #[tokio::test]
  async fn test_concurrent_executes_share_one_transport_call() {
    let transport = MockTransport::gated(dogs_envelope());
    let client = QueryClient::with_parts(transport.clone(), Arc::new(MemoryStore::new()), None);

    let mut a = client.execute(&get_dogs(), Variables::new());
    let mut b = client.execute(&get_dogs(), Variables::new());

    // Let the fetch task reach the gate
    sleep_ms(20).await;
    assert_eq!(transport.calls(), 1);

    transport.release();
    let ra = a.settled().await;
    let rb = b.settled().await;

    assert_eq!(ra, rb);
    assert_eq!(transport.calls(), 1);
  }

  #[tokio::test]
  async fn test_different_keys_fetch_independently() {
    let transport = MockTransport::returning(dogs_envelope());
    let client = QueryClient::with_parts(transport.clone(), Arc::new(MemoryStore::new()), None);

    let query = Query::new("GetDog", "query GetDog($id: ID!) { dog(id: $id) { breed } }");
    let mut a = client.execute(&query, Variables::new().set("id", "Z1fdFgU"));
    let mut b = client.execute(&query, Variables::new().set("id", "aBcDeFg"));

    a.settled().await;
    b.settled().await;

    assert_eq!(transport.calls(), 2);
  }

  #[tokio::test]
  async fn test_cache_round_trip_skips_transport() {
    let transport = MockTransport::returning(dogs_envelope());
    let client = QueryClient::with_parts(transport.clone(), Arc::new(MemoryStore::new()), None);

    let first = client.execute(&get_dogs(), Variables::new()).settled().await;

    let mut second = client.execute(&get_dogs(), Variables::new());
    // Served from cache: already settled, no new transport call
    assert!(!second.snapshot().loading());
    let second = second.settled().await;

    assert_eq!(first.data(), second.data());
    assert_eq!(transport.calls(), 1);
  }

  #[tokio::test]
  async fn test_connection_failure_surfaced_and_not_cached() {
    let transport =
      MockTransport::failing(|| TransportError::ConnectionFailure("connection refused".into()));
    let store = Arc::new(MemoryStore::new());
    let client = QueryClient::with_parts(transport.clone(), store.clone(), None);

    let result = client.execute(&get_dogs(), Variables::new()).settled().await;

    assert!(!result.loading());
    assert!(result.data().is_none());
    let error = result.error().expect("error present");
    assert_eq!(error.kind, ErrorKind::ConnectionFailure);

    let key = QueryKey::compute(&get_dogs(), &Variables::new());
    assert!(!store.has(&key));

    // No negative caching: the next execute retries the transport
    client.execute(&get_dogs(), Variables::new()).settled().await;
    assert_eq!(transport.calls(), 2);
  }

  #[tokio::test]
  async fn test_two_subscribers_observe_equal_settled_results() {
    let transport = MockTransport::gated(dogs_envelope());
    let client = QueryClient::with_parts(transport.clone(), Arc::new(MemoryStore::new()), None);

    let mut a = client.execute(&get_dogs(), Variables::new());
    let mut b = a.resubscribe();
    let mut c = client.execute(&get_dogs(), Variables::new());

    sleep_ms(20).await;
    transport.release();

    let ra = a.settled().await;
    let rb = b.settled().await;
    let rc = c.settled().await;

    assert_eq!(ra, rb);
    assert_eq!(rb, rc);
    assert!(ra.is_success());
  }

  #[tokio::test]
  async fn test_pending_snapshot_while_in_flight() {
    let transport = MockTransport::gated(dogs_envelope());
    let client = QueryClient::with_parts(transport.clone(), Arc::new(MemoryStore::new()), None);

    let mut sub = client.execute(&get_dogs(), Variables::new());
    sleep_ms(10).await;

    let snapshot = sub.snapshot();
    assert!(snapshot.loading());
    assert!(snapshot.data().is_none());
    assert!(snapshot.error().is_none());

    transport.release();
    assert!(sub.settled().await.is_success());
  }

  #[tokio::test]
  async fn test_dropping_subscribers_does_not_cancel_fetch() {
    let transport = MockTransport::gated(dogs_envelope());
    let client = QueryClient::with_parts(transport.clone(), Arc::new(MemoryStore::new()), None);

    let sub = client.execute(&get_dogs(), Variables::new());
    sleep_ms(10).await;
    drop(sub);

    transport.release();
    sleep_ms(20).await;

    // The orphaned fetch still settled and wrote the cache
    let mut sub = client.execute(&get_dogs(), Variables::new());
    assert!(!sub.snapshot().loading());
    assert!(sub.settled().await.is_success());
    assert_eq!(transport.calls(), 1);
  }

  #[tokio::test]
  async fn test_invalidate_forces_refetch() {
    let transport = MockTransport::returning(dogs_envelope());
    let client = QueryClient::with_parts(transport.clone(), Arc::new(MemoryStore::new()), None);

    client.execute(&get_dogs(), Variables::new()).settled().await;
    client.invalidate(&get_dogs(), &Variables::new());
    client.execute(&get_dogs(), Variables::new()).settled().await;

    assert_eq!(transport.calls(), 2);
  }

  #[tokio::test]
  async fn test_refetch_bypasses_cache_and_rewrites_it() {
    let transport = MockTransport::returning(dogs_envelope());
    let store = Arc::new(MemoryStore::new());
    let client = QueryClient::with_parts(transport.clone(), store.clone(), None);

    client.execute(&get_dogs(), Variables::new()).settled().await;
    client.refetch(&get_dogs(), Variables::new()).settled().await;
    assert_eq!(transport.calls(), 2);

    let key = QueryKey::compute(&get_dogs(), &Variables::new());
    assert_eq!(store.get(&key).expect("entry present").version, 2);

    // The refreshed entry serves the next execute
    client.execute(&get_dogs(), Variables::new()).settled().await;
    assert_eq!(transport.calls(), 2);
  }

  #[tokio::test]
  async fn test_concurrent_refetches_deduplicate() {
    let transport = MockTransport::gated(dogs_envelope());
    let client = QueryClient::with_parts(transport.clone(), Arc::new(MemoryStore::new()), None);

    let mut a = client.refetch(&get_dogs(), Variables::new());
    let mut b = client.refetch(&get_dogs(), Variables::new());

    sleep_ms(20).await;
    assert_eq!(transport.calls(), 1);

    transport.release();
    a.settled().await;
    b.settled().await;
    assert_eq!(transport.calls(), 1);
  }

  #[tokio::test]
  async fn test_stale_entry_triggers_refetch() {
    let transport = MockTransport::returning(dogs_envelope());
    let client = QueryClient::with_parts(
      transport.clone(),
      Arc::new(MemoryStore::new()),
      Some(Duration::from_millis(5)),
    );

    client.execute(&get_dogs(), Variables::new()).settled().await;
    sleep_ms(20).await;
    client.execute(&get_dogs(), Variables::new()).settled().await;

    assert_eq!(transport.calls(), 2);
  }

  #[tokio::test]
  async fn test_fresh_entry_within_stale_time() {
    let transport = MockTransport::returning(dogs_envelope());
    let client = QueryClient::with_parts(
      transport.clone(),
      Arc::new(MemoryStore::new()),
      Some(Duration::from_secs(60)),
    );

    client.execute(&get_dogs(), Variables::new()).settled().await;
    client.execute(&get_dogs(), Variables::new()).settled().await;

    assert_eq!(transport.calls(), 1);
  }

  #[tokio::test]
  async fn test_graphql_errors_surfaced_and_not_cached() {
    let transport = MockTransport::returning(json!({
      "data": null,
      "errors": [{"message": "Cannot query field \"dogz\" on type \"Query\"."}]
    }));
    let store = Arc::new(MemoryStore::new());
    let client = QueryClient::with_parts(transport.clone(), store.clone(), None);

    let result = client.execute(&get_dogs(), Variables::new()).settled().await;

    let error = result.error().expect("error present");
    assert_eq!(error.kind, ErrorKind::MalformedResponse);
    assert!(error.message.contains("Cannot query field"));

    let key = QueryKey::compute(&get_dogs(), &Variables::new());
    assert!(!store.has(&key));
  }

  #[tokio::test]
  async fn test_server_error_surfaced() {
    let transport = MockTransport::failing(|| TransportError::ServerError(503));
    let client = QueryClient::with_parts(transport.clone(), Arc::new(MemoryStore::new()), None);

    let result = client.execute(&get_dogs(), Variables::new()).settled().await;

    assert_eq!(
      result.error().expect("error present").kind,
      ErrorKind::ServerError(503)
    );
  }

  #[tokio::test]
  async fn test_many_concurrent_executes_one_call() {
    use futures::future::join_all;

    let transport = MockTransport::gated(dogs_envelope());
    let client = QueryClient::with_parts(transport.clone(), Arc::new(MemoryStore::new()), None);

    let subs: Vec<_> = (0..8)
      .map(|_| client.execute(&get_dogs(), Variables::new()))
      .collect();

    sleep_ms(20).await;
    assert_eq!(transport.calls(), 1);
    transport.release();

    let results = join_all(subs.into_iter().map(|mut sub| async move {
      sub.settled().await
    }))
    .await;

    assert!(results.iter().all(|r| r.is_success()));
    assert_eq!(transport.calls(), 1);
  }

  #[test]
  fn test_parse_envelope_extracts_data() {
    let value = parse_envelope(RawResponse {
      body: dogs_envelope(),
    })
    .expect("envelope parses");

    assert_eq!(value["dogs"][0]["id"], json!("Z1fdFgU"));
  }

  #[test]
  fn test_parse_envelope_rejects_non_object() {
    let err = parse_envelope(RawResponse { body: json!([1, 2]) }).expect_err("not an object");
    assert!(matches!(err, TransportError::MalformedResponse(_)));
  }

  #[test]
  fn test_parse_envelope_rejects_missing_data() {
    let err = parse_envelope(RawResponse { body: json!({}) }).expect_err("no data member");
    assert!(matches!(err, TransportError::MalformedResponse(_)));
  }
}
