//! Observable query results and the subscription handle.
//!
//! Every execution exposes a [`QueryResult`] that moves through exactly one
//! lifecycle: `Pending -> Succeeded` or `Pending -> Failed`, terminal on
//! either. Subscribers observe transitions through a [`Subscription`].

use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::watch;

use crate::error::{ClientError, ErrorInfo};

/// The state of a query execution.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryState {
  /// Waiting for the transport call to settle.
  Pending,
  /// Settled successfully with result data.
  Succeeded(Value),
  /// Settled with an error.
  Failed(ErrorInfo),
}

/// Snapshot of one query execution, exposed to subscribers.
///
/// By construction a result never carries both data and an error.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResult {
  state: QueryState,
}

impl QueryResult {
  pub(crate) fn pending() -> Self {
    Self {
      state: QueryState::Pending,
    }
  }

  pub(crate) fn succeeded(value: Value) -> Self {
    Self {
      state: QueryState::Succeeded(value),
    }
  }

  pub(crate) fn failed(error: ErrorInfo) -> Self {
    Self {
      state: QueryState::Failed(error),
    }
  }

  pub fn state(&self) -> &QueryState {
    &self.state
  }

  /// Whether the execution is still waiting on the transport.
  pub fn loading(&self) -> bool {
    matches!(self.state, QueryState::Pending)
  }

  pub fn is_success(&self) -> bool {
    matches!(self.state, QueryState::Succeeded(_))
  }

  pub fn is_error(&self) -> bool {
    matches!(self.state, QueryState::Failed(_))
  }

  /// Result data, if the execution succeeded.
  pub fn data(&self) -> Option<&Value> {
    match &self.state {
      QueryState::Succeeded(value) => Some(value),
      _ => None,
    }
  }

  /// Error info, if the execution failed.
  pub fn error(&self) -> Option<&ErrorInfo> {
    match &self.state {
      QueryState::Failed(error) => Some(error),
      _ => None,
    }
  }

  /// Deserialize the result data into a caller-declared shape.
  ///
  /// The response tree is schema-agnostic; this is the checked way to read
  /// it. A result that has no data, or whose data does not match `T`, fails
  /// with [`ClientError::ShapeMismatch`] rather than an unchecked access.
  pub fn data_as<T: DeserializeOwned>(&self) -> Result<T, ClientError> {
    match &self.state {
      QueryState::Succeeded(value) => serde_json::from_value(value.clone())
        .map_err(|e| ClientError::ShapeMismatch(e.to_string())),
      _ => Err(ClientError::ShapeMismatch(
        "result has no data to deserialize".to_string(),
      )),
    }
  }
}

/// A live, caller-held view of one query execution.
///
/// `snapshot()` reads the current state; `changed().await` wakes on the next
/// transition. Dropping the subscription unsubscribes; the underlying
/// transport call is NOT cancelled when the last subscriber drops, so a
/// caller attaching shortly after still benefits from the settled result.
///
/// # Example
///
/// ```ignore
/// let mut sub = client.execute(&query, Variables::new());
/// let result = sub.settled().await;
/// if let Some(data) = result.data() {
///     // ...
/// }
/// ```
#[derive(Debug)]
pub struct Subscription {
  rx: watch::Receiver<QueryResult>,
}

impl Subscription {
  pub(crate) fn new(rx: watch::Receiver<QueryResult>) -> Self {
    Self { rx }
  }

  /// Current state of the execution.
  pub fn snapshot(&self) -> QueryResult {
    self.rx.borrow().clone()
  }

  /// Wait for the next state transition.
  ///
  /// Returns `false` once the result is terminal and no further transitions
  /// can occur.
  pub async fn changed(&mut self) -> bool {
    self.rx.changed().await.is_ok()
  }

  /// Wait until the execution settles and return the terminal result.
  pub async fn settled(&mut self) -> QueryResult {
    loop {
      let current = self.snapshot();
      if !current.loading() {
        return current;
      }
      if !self.changed().await {
        return self.snapshot();
      }
    }
  }

  /// Attach another subscriber to the same execution.
  pub fn resubscribe(&self) -> Subscription {
    Subscription {
      rx: self.rx.clone(),
    }
  }
}

impl Clone for Subscription {
  fn clone(&self) -> Self {
    self.resubscribe()
  }
}
