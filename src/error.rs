//! Error types for the changeset engine
//!
//! Errors fall into two groups. [`SyncError::ProtocolViolation`] is a caller
//! bug (an operation invoked out of protocol order). Everything else means the
//! local session no longer agrees with its peers: the operation was aborted
//! without touching any state, and the session layer should drop its baseline
//! and fetch a fresh one from the server.

use crate::AttribCode;
use thiserror::Error;

/// Errors produced by the pool, the changeset algebra and its consumers
#[derive(Debug, Error)]
pub enum SyncError {
    /// An operation was called in an order the protocol does not allow
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// A changeset (or op string) is not well formed
    #[error("malformed changeset: {0}")]
    MalformedChangeset(String),

    /// Two lengths that must agree do not
    #[error("length mismatch: expected {expected}, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },

    /// An attribute code is not present in the pool
    #[error("unknown attribute code {0}")]
    UnknownCode(AttribCode),

    /// A serialized attribute pool is inconsistent
    #[error("malformed attribute pool: {0}")]
    MalformedPool(String),

    /// JSON encoding or decoding failed
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SyncError {
    /// Whether the error means the session is out of sync and needs a new baseline
    pub fn is_desync(&self) -> bool {
        !matches!(self, SyncError::ProtocolViolation(_))
    }

    pub(crate) fn malformed(msg: impl Into<String>) -> Self {
        SyncError::MalformedChangeset(msg.into())
    }
}

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, SyncError>;
