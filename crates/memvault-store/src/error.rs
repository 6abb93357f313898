//! Error types for memvault-store

use thiserror::Error;

use crate::schema::Etag;

/// Errors that can occur in the storage layer
#[derive(Error, Debug)]
pub enum StorageError {
    /// No document persisted under the requested key
    #[error("document not found: {key}")]
    NotFound { key: String },

    /// Conditional write failed; `latest` is the currently persisted ETag
    /// (None when the record does not exist at all)
    #[error("etag mismatch: latest is {latest:?}")]
    EtagMismatch { latest: Option<Etag> },

    /// Key failed path validation (empty, or contains `..` segments)
    #[error("invalid document path: {path}")]
    InvalidPath { path: String },

    /// Serialization error
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Filesystem error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Scan aborted by the caller's cancellation token
    #[error("operation cancelled")]
    Cancelled,

    /// Backend-specific failure
    #[error("backend error: {0}")]
    Backend(String),
}
