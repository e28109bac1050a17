use std::time::Duration;

use docgraph_store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    /// The store stayed unreachable through every retry.
    #[error("document store unreachable after {attempts} attempt(s): {message}")]
    Connection { attempts: u32, message: String },
    #[error("invalid {field}: {reason}")]
    Validation { field: &'static str, reason: String },
    /// The entity is gone but its relations could not be removed.
    #[error("entity '{entity_id}' deleted but relation cleanup failed: {source}")]
    Cascade {
        entity_id: String,
        #[source]
        source: Box<GraphError>,
    },
    #[error("summary index maintenance failed for user '{user_id}': {source}")]
    IndexMaintenance {
        user_id: String,
        #[source]
        source: Box<GraphError>,
    },
    #[error(transparent)]
    Store(StoreError),
    #[error("malformed {kind} document: {source}")]
    Decode {
        kind: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("traversal cancelled")]
    Cancelled,
    #[error("traversal timed out after {0:?}")]
    Timeout(Duration),
    #[error("configuration error: {0}")]
    Config(String),
}

impl From<StoreError> for GraphError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::ConnectionError { attempts, last } => GraphError::Connection {
                attempts,
                message: last,
            },
            other => GraphError::Store(other),
        }
    }
}

impl GraphError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        GraphError::Validation {
            field,
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, GraphError>;
