//! Error types for the dockgrid state store.

use std::fmt;

use thiserror::Error;

/// Result type alias for state store operations.
pub type StateResult<T> = Result<T, StateError>;

/// The redb step that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageOp {
    Transaction,
    Table,
    Read,
    Write,
}

impl fmt::Display for StorageOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let step = match self {
            Self::Transaction => "transaction",
            Self::Table => "table open",
            Self::Read => "read",
            Self::Write => "write",
        };
        f.write_str(step)
    }
}

#[derive(Debug, Error)]
pub enum StateError {
    #[error("failed to open state database: {0}")]
    Open(String),

    #[error("state store {op} failed: {message}")]
    Storage { op: StorageOp, message: String },

    /// A record could not be encoded, or a stored one no longer decodes.
    #[error("malformed state record: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("no such record: {0}")]
    NotFound(String),

    #[error("service id {id} does not match its key {key}")]
    KeyMismatch { id: String, key: String },
}
