use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ClientError;

/// Client configuration: the remote endpoint plus cache and transport knobs.
///
/// Construct in code with [`ClientConfig::new`] and the `with_*` builders,
/// or deserialize from a YAML file via [`ClientConfig::load`].
#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
  /// GraphQL endpoint URL, fixed at client construction.
  pub endpoint: String,

  /// Seconds before a cached result stops being served.
  /// Absent means cached results never expire (cache-first-only).
  #[serde(default)]
  pub stale_secs: Option<u64>,

  /// Transport timeout in seconds. Absent means no timeout.
  #[serde(default)]
  pub timeout_secs: Option<u64>,
}

impl ClientConfig {
  pub fn new(endpoint: impl Into<String>) -> Self {
    Self {
      endpoint: endpoint.into(),
      stale_secs: None,
      timeout_secs: None,
    }
  }

  /// Treat cached results older than `secs` as absent on read.
  pub fn with_stale_time(mut self, secs: u64) -> Self {
    self.stale_secs = Some(secs);
    self
  }

  /// Fail pending requests that take longer than `secs`.
  pub fn with_timeout(mut self, secs: u64) -> Self {
    self.timeout_secs = Some(secs);
    self
  }

  pub fn stale_time(&self) -> Option<Duration> {
    self.stale_secs.map(Duration::from_secs)
  }

  pub fn timeout(&self) -> Option<Duration> {
    self.timeout_secs.map(Duration::from_secs)
  }

  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./quell.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/quell/config.yaml
  pub fn load(explicit_path: Option<&Path>) -> Result<Self, ClientError> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(ClientError::Config(format!(
          "config file not found: {}",
          p.display()
        )));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Err(ClientError::Config(
        "no configuration file found; create one at ~/.config/quell/config.yaml".to_string(),
      )),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("quell.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("quell").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self, ClientError> {
    let contents = std::fs::read_to_string(path).map_err(|e| {
      ClientError::Config(format!("failed to read config file {}: {}", path.display(), e))
    })?;

    serde_yaml::from_str(&contents).map_err(|e| {
      ClientError::Config(format!(
        "failed to parse config file {}: {}",
        path.display(),
        e
      ))
    })
  }

  /// Get the endpoint API token from environment variables.
  ///
  /// Checks QUELL_API_TOKEN first, then GRAPHQL_API_TOKEN as fallback.
  pub fn get_api_token() -> Result<String, ClientError> {
    std::env::var("QUELL_API_TOKEN")
      .or_else(|_| std::env::var("GRAPHQL_API_TOKEN"))
      .map_err(|_| {
        ClientError::Config(
          "API token not found; set QUELL_API_TOKEN or GRAPHQL_API_TOKEN".to_string(),
        )
      })
  }
}
