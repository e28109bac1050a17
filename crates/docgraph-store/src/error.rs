use std::path::PathBuf;

/// Errors raised by a [`crate::DocumentStore`] engine or the connection gate.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store unreachable: {0}")]
    Unreachable(String),
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("invalid document in '{collection}': {reason}")]
    InvalidDocument { collection: String, reason: String },
    #[error("connection failed after {attempts} attempt(s): {last}")]
    ConnectionError { attempts: u32, last: String },
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
