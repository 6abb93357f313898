//! In-memory implementations of the storage traits.
//!
//! Used as test doubles and as the stand-in for a backend with native
//! conditional writes: every check-and-set happens under one map lock, so
//! no per-key gate is needed. Observable semantics are identical to the
//! filesystem backends.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use crate::error::StorageError;
use crate::schema::{
    validate_path, AuditRecord, DocumentEnvelope, DocumentKey, DocumentRecord, Etag, EventDigest,
    IfMatch, Scope,
};
use crate::storage_traits::{AuditStore, DocumentStore, EventStore, StorageResult};

// ---------------------------------------------------------------------------
// MemoryDocumentStore
// ---------------------------------------------------------------------------

/// In-memory document store backed by a `HashMap<DocumentKey, bytes>`.
///
/// Stored values are the canonical serialized bytes, so ETags are computed
/// exactly as the filesystem backend computes them.
#[derive(Debug, Default)]
pub struct MemoryDocumentStore {
    docs: Mutex<HashMap<DocumentKey, Vec<u8>>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn get(&self, key: &DocumentKey) -> StorageResult<DocumentRecord> {
        validate_path(&key.path)?;
        let docs = self.docs.lock().unwrap();
        let bytes = docs.get(key).ok_or_else(|| StorageError::NotFound {
            key: key.to_string(),
        })?;
        let envelope: DocumentEnvelope = serde_json::from_slice(bytes)?;
        Ok(DocumentRecord {
            envelope,
            etag: Etag::from_bytes(bytes),
        })
    }

    async fn upsert(
        &self,
        key: &DocumentKey,
        envelope: DocumentEnvelope,
        if_match: &IfMatch,
    ) -> StorageResult<DocumentRecord> {
        validate_path(&key.path)?;
        let bytes = envelope.canonical_bytes()?;
        let mut docs = self.docs.lock().unwrap();

        let current = docs.get(key).map(|b| Etag::from_bytes(b));
        match if_match {
            IfMatch::Any => {
                if current.is_some() {
                    return Err(StorageError::EtagMismatch { latest: current });
                }
            }
            IfMatch::Etag(expected) => {
                if current.as_ref() != Some(expected) {
                    return Err(StorageError::EtagMismatch { latest: current });
                }
            }
        }

        let etag = Etag::from_bytes(&bytes);
        docs.insert(key.clone(), bytes);
        Ok(DocumentRecord { envelope, etag })
    }

    async fn exists(&self, key: &DocumentKey) -> StorageResult<bool> {
        validate_path(&key.path)?;
        Ok(self.docs.lock().unwrap().contains_key(key))
    }

    async fn list_keys(&self, scope: &Scope) -> StorageResult<Vec<DocumentKey>> {
        let docs = self.docs.lock().unwrap();
        let mut keys: Vec<DocumentKey> = docs
            .keys()
            .filter(|k| &k.scope == scope)
            .cloned()
            .collect();
        keys.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(keys)
    }

    async fn delete(&self, key: &DocumentKey) -> StorageResult<bool> {
        validate_path(&key.path)?;
        Ok(self.docs.lock().unwrap().remove(key).is_some())
    }
}

// ---------------------------------------------------------------------------
// MemoryEventStore
// ---------------------------------------------------------------------------

/// In-memory event store backed by a `HashMap<Scope, Vec<EventDigest>>`.
#[derive(Debug, Default)]
pub struct MemoryEventStore {
    events: Mutex<HashMap<Scope, Vec<EventDigest>>>,
}

impl MemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EventStore for MemoryEventStore {
    async fn append(&self, digest: EventDigest) -> StorageResult<()> {
        let mut events = self.events.lock().unwrap();
        events.entry(digest.scope()).or_default().push(digest);
        Ok(())
    }

    async fn list(&self, scope: &Scope) -> StorageResult<Vec<EventDigest>> {
        let events = self.events.lock().unwrap();
        Ok(events.get(scope).cloned().unwrap_or_default())
    }

    async fn delete_scope(&self, scope: &Scope) -> StorageResult<usize> {
        let mut events = self.events.lock().unwrap();
        Ok(events.remove(scope).map(|v| v.len()).unwrap_or(0))
    }

    async fn delete_before(
        &self,
        cutoff: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> StorageResult<usize> {
        let mut events = self.events.lock().unwrap();
        let mut removed = 0;
        for digests in events.values_mut() {
            if cancel.is_cancelled() {
                return Err(StorageError::Cancelled);
            }
            let before = digests.len();
            digests.retain(|d| d.timestamp >= cutoff);
            removed += before - digests.len();
        }
        Ok(removed)
    }
}

// ---------------------------------------------------------------------------
// MemoryAuditStore
// ---------------------------------------------------------------------------

/// In-memory audit store backed by a `HashMap<Scope, Vec<AuditRecord>>`.
#[derive(Debug, Default)]
pub struct MemoryAuditStore {
    records: Mutex<HashMap<Scope, Vec<AuditRecord>>>,
}

impl MemoryAuditStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AuditStore for MemoryAuditStore {
    async fn append(&self, record: AuditRecord) -> StorageResult<()> {
        let mut records = self.records.lock().unwrap();
        records.entry(record.scope()).or_default().push(record);
        Ok(())
    }

    async fn list(&self, scope: &Scope) -> StorageResult<Vec<AuditRecord>> {
        let records = self.records.lock().unwrap();
        Ok(records.get(scope).cloned().unwrap_or_default())
    }

    async fn delete_scope(&self, scope: &Scope) -> StorageResult<usize> {
        let mut records = self.records.lock().unwrap();
        Ok(records.remove(scope).map(|v| v.len()).unwrap_or(0))
    }

    async fn delete_before(
        &self,
        cutoff: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> StorageResult<usize> {
        let mut records = self.records.lock().unwrap();
        let mut removed = 0;
        for entries in records.values_mut() {
            if cancel.is_cancelled() {
                return Err(StorageError::Cancelled);
            }
            let before = entries.len();
            entries.retain(|r| r.timestamp >= cutoff);
            removed += before - entries.len();
        }
        Ok(removed)
    }
}
