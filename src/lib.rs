//! A cache-first GraphQL query client with in-flight request deduplication.
//!
//! quell executes named, parameterized operations against a remote GraphQL
//! endpoint, caches successful results in memory, collapses concurrent
//! identical requests into a single network call, and exposes each execution
//! as a subscribable result that moves through loading/success/error states.
//!
//! # Example
//!
//! ```ignore
//! use quell::{ClientConfig, Query, QueryClient, Variables};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), quell::ClientError> {
//!     let client = QueryClient::new(ClientConfig::new("https://71z1g.sse.codesandbox.io/"))?;
//!
//!     let query = Query::new("GetDogs", "query GetDogs { dogs { id breed } }");
//!     let mut sub = client.execute(&query, Variables::new());
//!
//!     let result = sub.settled().await;
//!     if let Some(data) = result.data() {
//!         println!("{}", data["dogs"][0]["breed"]);
//!     }
//!     Ok(())
//! }
//! ```

mod cache;
mod client;
mod config;
mod error;
pub mod global;
mod query;
mod result;
mod transport;

pub use cache::{CacheEntry, CacheStore, MemoryStore, NoopStore};
pub use client::QueryClient;
pub use config::ClientConfig;
pub use error::{ClientError, ErrorInfo, ErrorKind, TransportError};
pub use query::{Query, QueryKey, Variables};
pub use result::{QueryResult, QueryState, Subscription};
pub use transport::{HttpTransport, RawResponse, Transport};
