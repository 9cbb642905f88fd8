//! Optional process-wide default client.
//!
//! Explicit construction and injection of a [`QueryClient`] is the primary
//! API. This module exists for callers that want one shared client per
//! process, with an explicit lifecycle: [`init`] installs the default,
//! [`get`] hands it out, [`shutdown`] clears it again.

use std::sync::{Arc, RwLock};

use crate::client::QueryClient;

static DEFAULT: RwLock<Option<Arc<QueryClient>>> = RwLock::new(None);

/// Install `client` as the process-wide default, replacing any previous one.
pub fn init(client: QueryClient) {
  let mut slot = match DEFAULT.write() {
    Ok(guard) => guard,
    Err(poisoned) => poisoned.into_inner(),
  };
  *slot = Some(Arc::new(client));
}

/// The current default client, if one has been installed.
pub fn get() -> Option<Arc<QueryClient>> {
  let slot = match DEFAULT.read() {
    Ok(guard) => guard,
    Err(poisoned) => poisoned.into_inner(),
  };
  slot.clone()
}

/// Clear the process-wide default.
///
/// Outstanding handles returned by [`get`] stay valid; only the shared slot
/// is emptied.
pub fn shutdown() {
  let mut slot = match DEFAULT.write() {
    Ok(guard) => guard,
    Err(poisoned) => poisoned.into_inner(),
  };
  *slot = None;
}
