//! Storage configuration.
//!
//! Every section has defaults, so `{}` is a valid configuration file:
//!
//! ```json
//! {
//!   "backend": { "kind": "json_file", "dir": "./graph-data" },
//!   "connection": { "max_retries": 5, "initial_backoff_ms": 50 },
//!   "summary": { "queue_capacity": 1024 },
//!   "traversal": { "timeout_ms": 10000 }
//! }
//! ```

use std::path::Path;
use std::time::Duration;

use docgraph_store::{BackendConfig, RetryPolicy};
use serde::{Deserialize, Serialize};

use crate::error::{GraphError, Result};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphStoreConfig {
    pub backend: BackendConfig,
    pub connection: ConnectionConfig,
    pub summary: SummaryConfig,
    pub search: SearchConfig,
    pub traversal: TraversalConfig,
}

impl GraphStoreConfig {
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| GraphError::Config(format!("{}: {e}", path.display())))?;
        serde_json::from_str(&contents)
            .map_err(|e| GraphError::Config(format!("{}: {e}", path.display())))
    }

    pub fn with_backend(mut self, backend: BackendConfig) -> Self {
        self.backend = backend;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff_ms: 100,
            max_backoff_ms: 5_000,
        }
    }
}

impl ConnectionConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            initial_backoff: Duration::from_millis(self.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SummaryConfig {
    /// Bound on queued refresh requests.
    pub queue_capacity: usize,
    pub recent_limit: usize,
    pub frequent_terms_limit: usize,
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 256,
            recent_limit: 10,
            frequent_terms_limit: 20,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub default_limit: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self { default_limit: 20 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TraversalConfig {
    /// Wall-clock budget per traversal; 0 disables the timeout.
    pub timeout_ms: u64,
    /// Maximum ids per frontier fetch.
    pub batch_size: usize,
}

impl Default for TraversalConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 30_000,
            batch_size: 256,
        }
    }
}

impl TraversalConfig {
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_ms > 0).then(|| Duration::from_millis(self.timeout_ms))
    }
}
