//! HTTP transport speaking the standard GraphQL POST envelope.

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;
use url::Url;

use super::{RawResponse, Transport};
use crate::config::ClientConfig;
use crate::error::{ClientError, TransportError};
use crate::query::{Query, Variables};

/// Transport that POSTs operations to a GraphQL endpoint as JSON.
#[derive(Debug, Clone)]
pub struct HttpTransport {
  client: reqwest::Client,
  endpoint: Url,
  token: Option<String>,
}

impl HttpTransport {
  /// Build a transport from configuration.
  ///
  /// The bearer token is taken from the environment when present; requests
  /// go out anonymously otherwise.
  pub fn new(config: &ClientConfig) -> Result<Self, ClientError> {
    let endpoint = Url::parse(&config.endpoint)
      .map_err(|e| ClientError::Config(format!("invalid endpoint URL {}: {}", config.endpoint, e)))?;

    let mut builder = reqwest::Client::builder();
    if let Some(timeout) = config.timeout() {
      builder = builder.timeout(timeout);
    }

    let client = builder
      .build()
      .map_err(|e| ClientError::Config(format!("failed to build HTTP client: {}", e)))?;

    Ok(Self {
      client,
      endpoint,
      token: ClientConfig::get_api_token().ok(),
    })
  }
}

#[async_trait]
impl Transport for HttpTransport {
  async fn send(
    &self,
    query: &Query,
    variables: &Variables,
  ) -> Result<RawResponse, TransportError> {
    debug!(operation = query.name(), endpoint = %self.endpoint, "sending request");

    let mut request = self
      .client
      .post(self.endpoint.clone())
      .json(&request_payload(query, variables));

    if let Some(token) = &self.token {
      request = request.bearer_auth(token);
    }

    let response = request.send().await.map_err(classify_send_error)?;

    let status = response.status();
    if !status.is_success() {
      return Err(TransportError::ServerError(status.as_u16()));
    }

    let body: Value = response
      .json()
      .await
      .map_err(|e| TransportError::MalformedResponse(e.to_string()))?;

    Ok(RawResponse { body })
  }
}

/// The GraphQL POST body: `{operationName, query, variables}`.
fn request_payload(query: &Query, variables: &Variables) -> Value {
  json!({
    "operationName": query.name(),
    "query": query.body(),
    "variables": variables,
  })
}

/// Map a reqwest send failure onto the transport taxonomy.
fn classify_send_error(err: reqwest::Error) -> TransportError {
  if err.is_timeout() {
    TransportError::Timeout
  } else {
    TransportError::ConnectionFailure(err.to_string())
  }
}
