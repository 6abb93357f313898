//! Filesystem-backed storage for documents, events, and audit records.
//!
//! Layout under a common root:
//! - `<root>/documents/<tenant>/<user>/<path>.json`
//! - `<root>/events/<tenant>/<user>/<event_id>.json`
//! - `<root>/audit/<tenant>/<user>/<change_id>.json`
//!
//! The document store emulates compare-and-swap: plain files offer no
//! native conditional write, so all writers to the same key serialize
//! through an in-process per-key gate, re-read the persisted hash under the
//! gate, and only then persist via tempfile-then-rename. This guarantee
//! holds only within a single process instance; multi-instance deployments
//! need a backend with native conditional writes.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::Mutex as KeyGate;
use tokio_util::sync::CancellationToken;

use crate::error::StorageError;
use crate::schema::{
    validate_path, AuditRecord, DocumentEnvelope, DocumentKey, DocumentRecord, Etag, EventDigest,
    IfMatch, Scope,
};
use crate::storage_traits::{AuditStore, DocumentStore, EventStore, StorageResult};

/// Reject scope/id components that would escape the storage root.
fn check_component(component: &str) -> StorageResult<&str> {
    if component.is_empty() || component == "." || component == ".." || component.contains('/') {
        return Err(StorageError::InvalidPath {
            path: component.to_string(),
        });
    }
    Ok(component)
}

fn scope_dir(root: &Path, scope: &Scope) -> StorageResult<PathBuf> {
    Ok(root
        .join(check_component(&scope.tenant_id)?)
        .join(check_component(&scope.user_id)?))
}

async fn read_json<T: DeserializeOwned>(file: &Path) -> StorageResult<Option<(Vec<u8>, T)>> {
    match tokio::fs::read(file).await {
        Ok(bytes) => {
            let value = serde_json::from_slice(&bytes)?;
            Ok(Some((bytes, value)))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(StorageError::Io(e)),
    }
}

/// Atomic persist: write to a sibling temp file, then rename into place.
/// Readers observe either the old bytes or the new bytes, never a partial
/// write.
async fn write_json_atomic<T: Serialize>(file: &Path, value: &T) -> StorageResult<Vec<u8>> {
    let bytes = serde_json::to_vec(value)?;
    let parent = file.parent().ok_or_else(|| {
        StorageError::Backend(format!("storage path has no parent: {}", file.display()))
    })?;
    tokio::fs::create_dir_all(parent).await?;
    let tmp = parent.join(format!(
        ".tmp-{}-{}",
        std::process::id(),
        uuid::Uuid::new_v4()
    ));
    tokio::fs::write(&tmp, &bytes).await?;
    tokio::fs::rename(&tmp, file).await?;
    Ok(bytes)
}

/// List `<dir>/*.json` files (flat). Missing dir is an empty list.
async fn json_files(dir: &Path) -> StorageResult<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(files),
        Err(e) => return Err(StorageError::Io(e)),
    };
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().map(|ext| ext == "json").unwrap_or(false) {
            files.push(path);
        }
    }
    Ok(files)
}

/// List the `(tenant, user)` scope directories under `root`.
async fn scope_dirs(root: &Path) -> StorageResult<Vec<PathBuf>> {
    let mut scopes = Vec::new();
    let mut tenants = match tokio::fs::read_dir(root).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(scopes),
        Err(e) => return Err(StorageError::Io(e)),
    };
    while let Some(tenant) = tenants.next_entry().await? {
        if !tenant.file_type().await?.is_dir() {
            continue;
        }
        let mut users = tokio::fs::read_dir(tenant.path()).await?;
        while let Some(user) = users.next_entry().await? {
            if user.file_type().await?.is_dir() {
                scopes.push(user.path());
            }
        }
    }
    Ok(scopes)
}

// ---------------------------------------------------------------------------
// FsDocumentStore
// ---------------------------------------------------------------------------

/// Filesystem document store with emulated compare-and-swap.
pub struct FsDocumentStore {
    root: PathBuf,
    /// Per-key write gates. Entries live for the process lifetime; the set
    /// of hot keys is small relative to the document population.
    gates: Mutex<HashMap<DocumentKey, Arc<KeyGate<()>>>>,
}

impl FsDocumentStore {
    /// Create a store rooted at `<root>/documents`, creating it if needed.
    pub async fn new(root: impl AsRef<Path>) -> StorageResult<Self> {
        let root = root.as_ref().join("documents");
        tokio::fs::create_dir_all(&root).await?;
        Ok(Self {
            root,
            gates: Mutex::new(HashMap::new()),
        })
    }

    fn doc_file(&self, key: &DocumentKey) -> StorageResult<PathBuf> {
        validate_path(&key.path)?;
        let mut file = scope_dir(&self.root, &key.scope)?;
        let mut segments = key.path.split('/').peekable();
        while let Some(segment) = segments.next() {
            let segment = check_component(segment)?;
            if segments.peek().is_some() {
                file.push(segment);
            } else {
                file.push(format!("{segment}.json"));
            }
        }
        Ok(file)
    }

    fn gate(&self, key: &DocumentKey) -> Arc<KeyGate<()>> {
        let mut gates = self.gates.lock().expect("gate registry poisoned");
        gates.entry(key.clone()).or_default().clone()
    }

    /// Walk the scope directory collecting document paths, rebuilding the
    /// slash-delimited key path from the directory structure.
    async fn collect_paths(dir: PathBuf) -> StorageResult<Vec<String>> {
        let mut paths = Vec::new();
        let mut pending = vec![(dir, String::new())];
        while let Some((dir, prefix)) = pending.pop() {
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(StorageError::Io(e)),
            };
            while let Some(entry) = entries.next_entry().await? {
                let name = entry.file_name().to_string_lossy().into_owned();
                if entry.file_type().await?.is_dir() {
                    let nested = if prefix.is_empty() {
                        name
                    } else {
                        format!("{prefix}/{name}")
                    };
                    pending.push((entry.path(), nested));
                } else if let Some(stem) = name.strip_suffix(".json") {
                    let path = if prefix.is_empty() {
                        stem.to_string()
                    } else {
                        format!("{prefix}/{stem}")
                    };
                    paths.push(path);
                }
            }
        }
        Ok(paths)
    }
}

#[async_trait]
impl DocumentStore for FsDocumentStore {
    async fn get(&self, key: &DocumentKey) -> StorageResult<DocumentRecord> {
        let file = self.doc_file(key)?;
        let (bytes, envelope): (_, DocumentEnvelope) =
            read_json(&file)
                .await?
                .ok_or_else(|| StorageError::NotFound {
                    key: key.to_string(),
                })?;
        Ok(DocumentRecord {
            envelope,
            etag: Etag::from_bytes(&bytes),
        })
    }

    async fn upsert(
        &self,
        key: &DocumentKey,
        envelope: DocumentEnvelope,
        if_match: &IfMatch,
    ) -> StorageResult<DocumentRecord> {
        let file = self.doc_file(key)?;
        let gate = self.gate(key);
        let _write_guard = gate.lock().await;

        // Re-read the persisted hash under the gate; the check and the
        // write below form one critical section per key.
        let current = match tokio::fs::read(&file).await {
            Ok(bytes) => Some(Etag::from_bytes(&bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => return Err(StorageError::Io(e)),
        };

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

        let bytes = write_json_atomic(&file, &envelope).await?;
        tracing::debug!(event = "document.persisted", key = %key, bytes = bytes.len());
        Ok(DocumentRecord {
            envelope,
            etag: Etag::from_bytes(&bytes),
        })
    }

    async fn exists(&self, key: &DocumentKey) -> StorageResult<bool> {
        let file = self.doc_file(key)?;
        Ok(tokio::fs::try_exists(&file).await?)
    }

    async fn list_keys(&self, scope: &Scope) -> StorageResult<Vec<DocumentKey>> {
        let dir = scope_dir(&self.root, scope)?;
        let mut paths = Self::collect_paths(dir).await?;
        paths.sort();
        Ok(paths
            .into_iter()
            .map(|path| DocumentKey::new(scope.clone(), path))
            .collect())
    }

    async fn delete(&self, key: &DocumentKey) -> StorageResult<bool> {
        let file = self.doc_file(key)?;
        let gate = self.gate(key);
        let _write_guard = gate.lock().await;
        match tokio::fs::remove_file(&file).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StorageError::Io(e)),
        }
    }
}

// ---------------------------------------------------------------------------
// FsEventStore
// ---------------------------------------------------------------------------

/// Filesystem event store, one JSON file per digest.
pub struct FsEventStore {
    root: PathBuf,
}

impl FsEventStore {
    /// Create a store rooted at `<root>/events`, creating it if needed.
    pub async fn new(root: impl AsRef<Path>) -> StorageResult<Self> {
        let root = root.as_ref().join("events");
        tokio::fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    fn event_file(&self, digest: &EventDigest) -> StorageResult<PathBuf> {
        let dir = scope_dir(&self.root, &digest.scope())?;
        Ok(dir.join(format!("{}.json", check_component(&digest.event_id)?)))
    }
}

#[async_trait]
impl EventStore for FsEventStore {
    async fn append(&self, digest: EventDigest) -> StorageResult<()> {
        let file = self.event_file(&digest)?;
        write_json_atomic(&file, &digest).await?;
        Ok(())
    }

    async fn list(&self, scope: &Scope) -> StorageResult<Vec<EventDigest>> {
        let dir = scope_dir(&self.root, scope)?;
        let mut events = Vec::new();
        for file in json_files(&dir).await? {
            if let Some((_, digest)) = read_json::<EventDigest>(&file).await? {
                events.push(digest);
            }
        }
        Ok(events)
    }

    async fn delete_scope(&self, scope: &Scope) -> StorageResult<usize> {
        let dir = scope_dir(&self.root, scope)?;
        let files = json_files(&dir).await?;
        let count = files.len();
        for file in files {
            tokio::fs::remove_file(&file).await?;
        }
        Ok(count)
    }

    async fn delete_before(
        &self,
        cutoff: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> StorageResult<usize> {
        let mut removed = 0;
        for dir in scope_dirs(&self.root).await? {
            for file in json_files(&dir).await? {
                if cancel.is_cancelled() {
                    return Err(StorageError::Cancelled);
                }
                if let Some((_, digest)) = read_json::<EventDigest>(&file).await? {
                    if digest.timestamp < cutoff {
                        tokio::fs::remove_file(&file).await?;
                        removed += 1;
                    }
                }
            }
        }
        Ok(removed)
    }
}

// ---------------------------------------------------------------------------
// FsAuditStore
// ---------------------------------------------------------------------------

/// Filesystem audit store, one JSON file per mutation record.
pub struct FsAuditStore {
    root: PathBuf,
}

impl FsAuditStore {
    /// Create a store rooted at `<root>/audit`, creating it if needed.
    pub async fn new(root: impl AsRef<Path>) -> StorageResult<Self> {
        let root = root.as_ref().join("audit");
        tokio::fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    fn record_file(&self, record: &AuditRecord) -> StorageResult<PathBuf> {
        let dir = scope_dir(&self.root, &record.scope())?;
        Ok(dir.join(format!("{}.json", check_component(&record.change_id)?)))
    }
}

#[async_trait]
impl AuditStore for FsAuditStore {
    async fn append(&self, record: AuditRecord) -> StorageResult<()> {
        let file = self.record_file(&record)?;
        write_json_atomic(&file, &record).await?;
        Ok(())
    }

    async fn list(&self, scope: &Scope) -> StorageResult<Vec<AuditRecord>> {
        let dir = scope_dir(&self.root, scope)?;
        let mut records = Vec::new();
        for file in json_files(&dir).await? {
            if let Some((_, record)) = read_json::<AuditRecord>(&file).await? {
                records.push(record);
            }
        }
        Ok(records)
    }

    async fn delete_scope(&self, scope: &Scope) -> StorageResult<usize> {
        let dir = scope_dir(&self.root, scope)?;
        let files = json_files(&dir).await?;
        let count = files.len();
        for file in files {
            tokio::fs::remove_file(&file).await?;
        }
        Ok(count)
    }

    async fn delete_before(
        &self,
        cutoff: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> StorageResult<usize> {
        let mut removed = 0;
        for dir in scope_dirs(&self.root).await? {
            for file in json_files(&dir).await? {
                if cancel.is_cancelled() {
                    return Err(StorageError::Cancelled);
                }
                if let Some((_, record)) = read_json::<AuditRecord>(&file).await? {
                    if record.timestamp < cutoff {
                        tokio::fs::remove_file(&file).await?;
                        removed += 1;
                    }
                }
            }
        }
        Ok(removed)
    }
}
