//! Error taxonomy for the coordinator and patch engine.
//!
//! Every error maps to a stable `(status, code)` pair so the transport
//! layer can translate mechanically. Coordinator failures are deterministic
//! given the same inputs and store state; a failed guard never reaches the
//! store's write path.

use memvault_store::{Etag, StorageError};

/// Errors produced by the coordinator, patch engine, and lifecycle service.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("if-match precondition is required")]
    MissingIfMatch,

    #[error("invalid patch: {0}")]
    InvalidPatch(String),

    #[error("assembly requires at least one file ref")]
    MissingAssemblyTargets,

    #[error("invalid event: {0}")]
    InvalidEvent(String),

    #[error("invalid retention rules: {0}")]
    InvalidRetentionRules(String),

    #[error("invalid document path: {path}")]
    InvalidPath { path: String },

    #[error("document not found: {key}")]
    DocumentNotFound { key: String },

    #[error("etag mismatch; latest is {latest:?}")]
    EtagMismatch { latest: Option<Etag> },

    #[error("patch exceeds the operation limit: {count} > {limit}")]
    PatchTooLarge { count: usize, limit: usize },

    #[error("patched envelope is invalid: {0}")]
    InvalidDocument(String),

    #[error("document size {size} exceeds limit {limit}")]
    DocumentSizeExceeded { size: usize, limit: usize },

    #[error("document has no text content to edit")]
    PatchTextNotFound,

    #[error("no match for edit text {old_text:?}")]
    PatchMatchNotFound { old_text: String },

    #[error("edit text {old_text:?} matched {matches} times; occurrence required")]
    PatchMatchAmbiguous { old_text: String, matches: usize },

    #[error("occurrence {occurrence} outside [1, {matches}]")]
    PatchOccurrenceOutOfRange { occurrence: usize, matches: usize },

    #[error("operation cancelled")]
    Cancelled,

    #[error("storage failure: {0}")]
    Storage(StorageError),
}

impl CoreError {
    /// Stable machine-readable code for transport mapping.
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingIfMatch => "MISSING_IF_MATCH",
            Self::InvalidPatch(_) => "INVALID_PATCH",
            Self::MissingAssemblyTargets => "MISSING_ASSEMBLY_TARGETS",
            Self::InvalidEvent(_) => "INVALID_EVENT",
            Self::InvalidRetentionRules(_) => "INVALID_RETENTION_RULES",
            Self::InvalidPath { .. } => "INVALID_PATH",
            Self::DocumentNotFound { .. } => "DOCUMENT_NOT_FOUND",
            Self::EtagMismatch { .. } => "ETAG_MISMATCH",
            Self::PatchTooLarge { .. } => "PATCH_TOO_LARGE",
            Self::InvalidDocument(_) => "INVALID_DOCUMENT",
            Self::DocumentSizeExceeded { .. } => "DOCUMENT_SIZE_EXCEEDED",
            Self::PatchTextNotFound => "PATCH_TEXT_NOT_FOUND",
            Self::PatchMatchNotFound { .. } => "PATCH_MATCH_NOT_FOUND",
            Self::PatchMatchAmbiguous { .. } => "PATCH_MATCH_AMBIGUOUS",
            Self::PatchOccurrenceOutOfRange { .. } => "PATCH_OCCURRENCE_OUT_OF_RANGE",
            Self::Cancelled => "CANCELLED",
            Self::Storage(_) => "STORAGE",
        }
    }

    /// HTTP status the transport layer should answer with.
    pub fn status(&self) -> u16 {
        match self {
            Self::MissingIfMatch
            | Self::InvalidPatch(_)
            | Self::MissingAssemblyTargets
            | Self::InvalidEvent(_)
            | Self::InvalidRetentionRules(_)
            | Self::InvalidPath { .. } => 400,
            Self::DocumentNotFound { .. } => 404,
            Self::EtagMismatch { .. } => 412,
            Self::PatchTooLarge { .. }
            | Self::InvalidDocument(_)
            | Self::DocumentSizeExceeded { .. }
            | Self::PatchTextNotFound
            | Self::PatchMatchNotFound { .. }
            | Self::PatchMatchAmbiguous { .. }
            | Self::PatchOccurrenceOutOfRange { .. } => 422,
            Self::Cancelled => 499,
            Self::Storage(_) => 500,
        }
    }

    /// The latest ETag attached to a conflict, for retry without re-read.
    pub fn latest_etag(&self) -> Option<&Etag> {
        match self {
            Self::EtagMismatch { latest } => latest.as_ref(),
            _ => None,
        }
    }
}

impl From<StorageError> for CoreError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound { key } => Self::DocumentNotFound { key },
            StorageError::EtagMismatch { latest } => Self::EtagMismatch { latest },
            StorageError::InvalidPath { path } => Self::InvalidPath { path },
            StorageError::Cancelled => Self::Cancelled,
            other => Self::Storage(other),
        }
    }
}

/// Result type for coordinator operations.
pub type CoreResult<T> = std::result::Result<T, CoreError>;
