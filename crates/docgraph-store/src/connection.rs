//! Connect-once gate for the shared store handle.
//!
//! ```text
//!   caller ─┐
//!   caller ─┼──► ConnectionGate ──(first call only)──► Connector::connect
//!   caller ─┘         │                                 retry + backoff
//!                     ▼
//!           OnceCell<Arc<dyn DocumentStore>>
//! ```
//!
//! Concurrent first callers wait on the same initialization. When every retry
//! fails the error goes to the caller that ran the attempt and the cell stays
//! empty, so the next caller starts a fresh attempt.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;

use crate::error::{Result, StoreError};
use crate::{DocumentStore, JsonFileDocumentStore, MemoryDocumentStore};

// ============================================================================
// Connectors
// ============================================================================

/// Establishes a handle to a concrete engine.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> Result<Arc<dyn DocumentStore>>;

    /// Human-readable target, used in logs.
    fn describe(&self) -> String;
}

/// Hands out an already constructed store.
pub struct StaticConnector {
    store: Arc<dyn DocumentStore>,
    label: String,
}

impl StaticConnector {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            label: "static".to_string(),
        }
    }

    pub fn memory() -> Self {
        Self {
            store: Arc::new(MemoryDocumentStore::new()),
            label: "memory".to_string(),
        }
    }
}

#[async_trait]
impl Connector for StaticConnector {
    async fn connect(&self) -> Result<Arc<dyn DocumentStore>> {
        Ok(Arc::clone(&self.store))
    }

    fn describe(&self) -> String {
        self.label.clone()
    }
}

/// Opens a [`JsonFileDocumentStore`] directory.
pub struct JsonFileConnector {
    dir: PathBuf,
}

impl JsonFileConnector {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl Connector for JsonFileConnector {
    async fn connect(&self) -> Result<Arc<dyn DocumentStore>> {
        let dir = self.dir.clone();
        let store = tokio::task::spawn_blocking(move || JsonFileDocumentStore::open(dir))
            .await
            .map_err(|e| StoreError::Unreachable(format!("loader task failed: {e}")))??;
        Ok(Arc::new(store))
    }

    fn describe(&self) -> String {
        format!("json-file:{}", self.dir.display())
    }
}

/// Engine selection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackendConfig {
    #[default]
    Memory,
    JsonFile {
        dir: PathBuf,
    },
}

impl BackendConfig {
    pub fn connector(&self) -> Box<dyn Connector> {
        match self {
            BackendConfig::Memory => Box::new(StaticConnector::memory()),
            BackendConfig::JsonFile { dir } => Box::new(JsonFileConnector::new(dir.clone())),
        }
    }
}

// ============================================================================
// Retry policy
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (1-based): doubles each time, capped.
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

// ============================================================================
// Gate
// ============================================================================

pub struct ConnectionGate {
    connector: Box<dyn Connector>,
    policy: RetryPolicy,
    cell: OnceCell<Arc<dyn DocumentStore>>,
}

impl ConnectionGate {
    pub fn new(connector: Box<dyn Connector>, policy: RetryPolicy) -> Self {
        Self {
            connector,
            policy,
            cell: OnceCell::new(),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.cell.initialized()
    }

    /// The shared store handle, connecting on first use.
    pub async fn store(&self) -> Result<Arc<dyn DocumentStore>> {
        let store = self
            .cell
            .get_or_try_init(|| self.connect_with_retry())
            .await?;
        Ok(Arc::clone(store))
    }

    async fn connect_with_retry(&self) -> Result<Arc<dyn DocumentStore>> {
        let target = self.connector.describe();
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match self.connector.connect().await {
                Ok(store) => {
                    tracing::info!(backend = %target, attempt, "document store connected");
                    return Ok(store);
                }
                Err(err) if attempt <= self.policy.max_retries => {
                    let delay = self.policy.backoff(attempt);
                    tracing::warn!(
                        backend = %target,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "document store connection failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => {
                    tracing::error!(
                        backend = %target,
                        attempt,
                        error = %err,
                        "giving up on document store"
                    );
                    return Err(StoreError::ConnectionError {
                        attempts: attempt,
                        last: err.to_string(),
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FlakyConnector {
        failures_left: AtomicU32,
        calls: Arc<AtomicU32>,
    }

    impl FlakyConnector {
        fn new(failures: u32) -> (Self, Arc<AtomicU32>) {
            let calls = Arc::new(AtomicU32::new(0));
            (
                Self {
                    failures_left: AtomicU32::new(failures),
                    calls: Arc::clone(&calls),
                },
                calls,
            )
        }
    }

    #[async_trait]
    impl Connector for FlakyConnector {
        async fn connect(&self) -> Result<Arc<dyn DocumentStore>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            // Yield so concurrent callers pile up behind the gate.
            tokio::task::yield_now().await;
            let left = self.failures_left.load(Ordering::SeqCst);
            if left > 0 {
                self.failures_left.store(left - 1, Ordering::SeqCst);
                return Err(StoreError::Unreachable("connection refused".to_string()));
            }
            Ok(Arc::new(MemoryDocumentStore::new()))
        }

        fn describe(&self) -> String {
            "flaky".to_string()
        }
    }

    fn fast_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(4),
        }
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_retries: 10,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(500),
        };
        assert_eq!(policy.backoff(1), Duration::from_millis(100));
        assert_eq!(policy.backoff(2), Duration::from_millis(200));
        assert_eq!(policy.backoff(3), Duration::from_millis(400));
        assert_eq!(policy.backoff(4), Duration::from_millis(500));
        assert_eq!(policy.backoff(40), Duration::from_millis(500));
    }

    #[tokio::test]
    async fn test_concurrent_first_callers_connect_once() {
        let (connector, calls) = FlakyConnector::new(0);
        let gate = Arc::new(ConnectionGate::new(Box::new(connector), fast_policy(0)));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let gate = Arc::clone(&gate);
            handles.push(tokio::spawn(async move { gate.store().await.is_ok() }));
        }
        for h in handles {
            assert!(h.await.unwrap());
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(gate.is_connected());
    }

    #[tokio::test]
    async fn test_retries_until_success() {
        let (connector, calls) = FlakyConnector::new(2);
        let gate = ConnectionGate::new(Box::new(connector), fast_policy(3));
        assert!(gate.store().await.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhausted_retries_fail_only_that_call() {
        let (connector, calls) = FlakyConnector::new(3);
        let gate = ConnectionGate::new(Box::new(connector), fast_policy(1));

        let err = gate.store().await.err().unwrap();
        assert!(matches!(err, StoreError::ConnectionError { attempts: 2, .. }));
        assert!(!gate.is_connected());

        // One failure left, then success within the next call's budget.
        assert!(gate.store().await.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }
}
