//! Storage trait definitions for MemVault
//!
//! These traits define the core storage abstractions:
//! - `DocumentStore`: envelope persistence with compare-and-swap writes
//! - `EventStore`: append-only event digests plus scored recall
//! - `AuditStore`: write-only mutation log
//!
//! All traits are async and backend-agnostic. In-memory fakes are provided
//! for testing via the `fakes` module; `fs` provides filesystem backends.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use crate::error::StorageError;
use crate::recall::{self, EventQuery};
use crate::schema::{
    AuditRecord, DocumentEnvelope, DocumentKey, DocumentRecord, EventDigest, IfMatch, Scope,
    ScoredEvent,
};

/// Result type for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Scoped document persistence with optimistic concurrency.
///
/// Guarantees:
/// - `upsert` with `IfMatch::Etag` succeeds only against the currently
///   persisted ETag; `IfMatch::Any` succeeds only when no record exists.
/// - A failed precondition returns `StorageError::EtagMismatch` carrying
///   the latest ETag so callers can retry without a second read.
/// - Writes to the same key are serialized; a successful write always
///   produces a new ETag. Reads never block on in-flight writes.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Load the current record for `key`. `StorageError::NotFound` if absent.
    async fn get(&self, key: &DocumentKey) -> StorageResult<DocumentRecord>;

    /// Conditionally persist `envelope` under `key`.
    async fn upsert(
        &self,
        key: &DocumentKey,
        envelope: DocumentEnvelope,
        if_match: &IfMatch,
    ) -> StorageResult<DocumentRecord>;

    /// Check whether a record exists without reading it.
    async fn exists(&self, key: &DocumentKey) -> StorageResult<bool>;

    /// All document keys in `scope` (used by forget-user).
    async fn list_keys(&self, scope: &Scope) -> StorageResult<Vec<DocumentKey>>;

    /// Delete the record for `key`. Returns whether a record existed.
    async fn delete(&self, key: &DocumentKey) -> StorageResult<bool>;
}

/// Append-only event digest store.
///
/// There is no update path: digests are created once and removed only by
/// retention sweeps or forget-user. `query` is a full scan over the scope;
/// retention bounds that set's growth, it is not an index.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Append one digest.
    async fn append(&self, digest: EventDigest) -> StorageResult<()>;

    /// All digests in `scope`, unordered.
    async fn list(&self, scope: &Scope) -> StorageResult<Vec<EventDigest>>;

    /// Delete all digests in `scope`. Returns the number removed.
    async fn delete_scope(&self, scope: &Scope) -> StorageResult<usize>;

    /// Delete digests (across all scopes) strictly older than `cutoff`.
    /// Returns the number removed. The token is checked between records.
    async fn delete_before(
        &self,
        cutoff: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> StorageResult<usize>;

    /// Scored recall over `scope`. The default implementation scans `list`
    /// and ranks with the shared scoring rules, so every backend observes
    /// identical recall semantics. The token is checked between events.
    async fn query(
        &self,
        scope: &Scope,
        query: &EventQuery,
        cancel: &CancellationToken,
    ) -> StorageResult<Vec<ScoredEvent>> {
        let events = self.list(scope).await?;
        recall::rank(events, query, cancel)
    }
}

/// Write-only audit log of document mutations.
#[async_trait]
pub trait AuditStore: Send + Sync {
    /// Append one record. Records are immutable once written.
    async fn append(&self, record: AuditRecord) -> StorageResult<()>;

    /// All records in `scope`, unordered.
    async fn list(&self, scope: &Scope) -> StorageResult<Vec<AuditRecord>>;

    /// Delete all records in `scope`. Returns the number removed.
    async fn delete_scope(&self, scope: &Scope) -> StorageResult<usize>;

    /// Delete records (across all scopes) strictly older than `cutoff`.
    /// Returns the number removed. The token is checked between records.
    async fn delete_before(
        &self,
        cutoff: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> StorageResult<usize>;
}
