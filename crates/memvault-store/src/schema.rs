//! Persistent record types for the MemVault storage layer.
//!
//! Everything here is scoped by `(tenant_id, user_id)`: documents, event
//! digests, and audit records never cross that boundary. The envelope is the
//! unit of optimistic concurrency; its ETag is a content hash of the
//! canonical serialized bytes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest as Sha2Digest, Sha256};

use crate::error::StorageError;

/// Maximum serialized envelope size in characters.
pub const MAX_ENVELOPE_CHARS: usize = 256_000;

// ---------------------------------------------------------------------------
// Scope and keys
// ---------------------------------------------------------------------------

/// The `(tenant_id, user_id)` pair isolating all storage and queries.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Scope {
    pub tenant_id: String,
    pub user_id: String,
}

impl Scope {
    pub fn new(tenant_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            user_id: user_id.into(),
        }
    }
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.tenant_id, self.user_id)
    }
}

/// Identifies one document envelope within a scope.
///
/// `path` is an opaque slash-delimited string. It must be non-empty and
/// must not contain `..` segments; `validate_path` is the single source of
/// truth for that rule.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentKey {
    pub scope: Scope,
    pub path: String,
}

impl DocumentKey {
    pub fn new(scope: Scope, path: impl Into<String>) -> Self {
        Self {
            scope,
            path: path.into(),
        }
    }
}

impl std::fmt::Display for DocumentKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.scope, self.path)
    }
}

/// Validate a document path: non-empty, no empty segments, no `.` or `..`
/// segments (a `.` segment would alias distinct keys onto one file in the
/// filesystem backend).
pub fn validate_path(path: &str) -> Result<(), StorageError> {
    if path.is_empty() {
        return Err(StorageError::InvalidPath {
            path: path.to_string(),
        });
    }
    if path
        .split('/')
        .any(|seg| seg.is_empty() || seg == "." || seg == "..")
    {
        return Err(StorageError::InvalidPath {
            path: path.to_string(),
        });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// ETag — content-hash version token
// ---------------------------------------------------------------------------

/// Opaque version token for one persisted envelope (SHA-256 hex of the
/// canonical serialized bytes).
///
/// The inner field is private to guarantee the string is always valid
/// lowercase hex produced by `from_bytes` or deserialized from storage.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Etag(String);

impl Etag {
    /// Compute the ETag of the given serialized envelope bytes.
    pub fn from_bytes(data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(data);
        Etag(hex::encode(hasher.finalize()))
    }

    /// Return the full hex string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Etag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Write precondition for `DocumentStore::upsert`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IfMatch {
    /// `"*"`: create-if-absent; fails if a record already exists.
    Any,
    /// Succeeds only when the persisted ETag equals this value.
    Etag(Etag),
}

impl IfMatch {
    /// Parse a raw `If-Match` header value. Returns `None` for an empty
    /// string (a missing precondition, rejected upstream).
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "" => None,
            "*" => Some(IfMatch::Any),
            etag => Some(IfMatch::Etag(Etag(etag.to_string()))),
        }
    }
}

// ---------------------------------------------------------------------------
// Document envelope
// ---------------------------------------------------------------------------

/// The versioned wrapper around one document's payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentEnvelope {
    /// Immutable, assigned at creation.
    pub doc_id: String,
    /// Caller-opaque schema identifier, required non-empty.
    pub schema_id: String,
    /// Caller-opaque schema version, required non-empty.
    pub schema_version: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub updated_by: String,
    /// Arbitrary JSON object payload.
    pub content: serde_json::Value,
}

impl DocumentEnvelope {
    /// Canonical serialized bytes. serde_json's default map is ordered, so
    /// the same envelope always produces the same bytes (and the same ETag).
    pub fn canonical_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Serialized size in characters (the budget unit for size limits and
    /// context assembly).
    pub fn serialized_len(&self) -> Result<usize, serde_json::Error> {
        Ok(self.canonical_bytes()?.len())
    }

    /// ETag of the canonical serialized bytes.
    pub fn etag(&self) -> Result<Etag, serde_json::Error> {
        Ok(Etag::from_bytes(&self.canonical_bytes()?))
    }
}

/// One persisted envelope together with its current version token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub envelope: DocumentEnvelope,
    pub etag: Etag,
}

// ---------------------------------------------------------------------------
// Patch request records (persisted inside audit entries)
// ---------------------------------------------------------------------------

/// Structural patch operation kind (JSON-Pointer semantics).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatchOpKind {
    Add,
    Replace,
    Remove,
}

impl std::fmt::Display for PatchOpKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Add => write!(f, "add"),
            Self::Replace => write!(f, "replace"),
            Self::Remove => write!(f, "remove"),
        }
    }
}

/// One structural patch operation, JSON-Pointer addressed against the full
/// envelope tree (including `/content/...`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatchOperation {
    pub op: PatchOpKind,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,
}

/// One deterministic text edit against the string at `content.text`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextPatchEdit {
    pub old_text: String,
    pub new_text: String,
    /// 1-based index selecting among multiple matches.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub occurrence: Option<usize>,
}

// ---------------------------------------------------------------------------
// Event digests
// ---------------------------------------------------------------------------

/// Append-only searchable summary of one event. `evidence` is opaque JSON,
/// stored but never interpreted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventDigest {
    pub event_id: String,
    pub tenant_id: String,
    pub user_id: String,
    pub service_id: String,
    pub timestamp: DateTime<Utc>,
    pub source_type: String,
    pub digest: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub project_ids: Vec<String>,
    #[serde(default)]
    pub evidence: serde_json::Value,
}

impl EventDigest {
    pub fn scope(&self) -> Scope {
        Scope::new(self.tenant_id.clone(), self.user_id.clone())
    }
}

/// An event digest paired with its recall relevance score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredEvent {
    pub event: EventDigest,
    pub score: f64,
}

// ---------------------------------------------------------------------------
// Audit records
// ---------------------------------------------------------------------------

/// Immutable record of one successful document mutation.
///
/// Structural patches carry the literal ops applied; text-edit and replace
/// audits omit literal content and rely on `reason`/evidence pointers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub change_id: String,
    pub actor: String,
    pub tenant_id: String,
    pub user_id: String,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_etag: Option<Etag>,
    pub new_etag: Etag,
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ops: Option<Vec<PatchOperation>>,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence_message_ids: Option<Vec<String>>,
}

impl AuditRecord {
    pub fn scope(&self) -> Scope {
        Scope::new(self.tenant_id.clone(), self.user_id.clone())
    }
}
