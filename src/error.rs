//! Error types for transport failures and client-level faults.

use thiserror::Error;

/// Failure modes of a single transport call.
///
/// Transports never retry internally, so each variant describes exactly one
/// failed attempt. Retry policy belongs to the caller, which re-invokes
/// `execute` and re-enters the deduplication logic.
#[derive(Debug, Error)]
pub enum TransportError {
  /// The endpoint could not be reached (DNS, TCP, TLS).
  #[error("connection failure: {0}")]
  ConnectionFailure(String),

  /// The request did not settle within the configured timeout.
  #[error("request timed out")]
  Timeout,

  /// The response body could not be parsed, or the GraphQL envelope
  /// carried no usable data.
  #[error("malformed response: {0}")]
  MalformedResponse(String),

  /// The endpoint answered with a non-success HTTP status.
  #[error("server returned status {0}")]
  ServerError(u16),
}

/// Errors surfaced by [`QueryClient`](crate::QueryClient) itself.
///
/// The client introduces no failure modes of its own beyond wrapping: every
/// transport error passes through verbatim, and `ShapeMismatch` only occurs
/// when a caller asks for a typed view of the result data.
#[derive(Debug, Error)]
pub enum ClientError {
  #[error(transparent)]
  Transport(#[from] TransportError),

  /// The result data did not match the shape the caller declared.
  #[error("response shape mismatch: {0}")]
  ShapeMismatch(String),

  #[error("configuration error: {0}")]
  Config(String),
}

/// Discriminant of an [`ErrorInfo`], matching the transport taxonomy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorKind {
  ConnectionFailure,
  Timeout,
  MalformedResponse,
  ServerError(u16),
}

/// Cloneable error snapshot delivered to every subscriber of a failed query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorInfo {
  pub kind: ErrorKind,
  pub message: String,
}

impl From<&TransportError> for ErrorInfo {
  fn from(err: &TransportError) -> Self {
    let kind = match err {
      TransportError::ConnectionFailure(_) => ErrorKind::ConnectionFailure,
      TransportError::Timeout => ErrorKind::Timeout,
      TransportError::MalformedResponse(_) => ErrorKind::MalformedResponse,
      TransportError::ServerError(status) => ErrorKind::ServerError(*status),
    };

    Self {
      kind,
      message: err.to_string(),
    }
  }
}

impl std::fmt::Display for ErrorInfo {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.message)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_error_info_from_transport() {
    let info = ErrorInfo::from(&TransportError::ConnectionFailure(
      "connection refused".to_string(),
    ));
    assert_eq!(info.kind, ErrorKind::ConnectionFailure);
    assert_eq!(info.message, "connection failure: connection refused");

    let info = ErrorInfo::from(&TransportError::ServerError(502));
    assert_eq!(info.kind, ErrorKind::ServerError(502));
    assert_eq!(info.message, "server returned status 502");
  }

  #[test]
  fn test_timeout_display() {
    let info = ErrorInfo::from(&TransportError::Timeout);
    assert_eq!(info.kind, ErrorKind::Timeout);
    assert_eq!(info.to_string(), "request timed out");
  }
}
