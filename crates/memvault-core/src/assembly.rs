//! Budget-bounded context assembly.
//!
//! A single pass over the requested refs in request order: no re-ordering,
//! no best-fit packing. Given a fixed store state and input order the
//! result is fully deterministic.

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use memvault_store::{DocumentEnvelope, DocumentKey, DocumentStore, Scope, StorageError};

use crate::error::{CoreError, CoreResult};

/// Default cap on accepted documents.
pub const DEFAULT_MAX_DOCS: usize = 4;
/// Default cap on total serialized characters.
pub const DEFAULT_MAX_CHARS_TOTAL: usize = 30_000;

/// Budget dimensions for one assembly request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssemblyBudget {
    pub max_docs: usize,
    pub max_chars_total: usize,
}

impl Default for AssemblyBudget {
    fn default() -> Self {
        Self {
            max_docs: DEFAULT_MAX_DOCS,
            max_chars_total: DEFAULT_MAX_CHARS_TOTAL,
        }
    }
}

/// Why a requested file was excluded from the assembled context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    MaxDocs,
    MaxCharsTotal,
}

/// One accepted file, in request order. Response-only, never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssembledFile {
    pub path: String,
    pub etag: memvault_store::Etag,
    pub envelope: DocumentEnvelope,
    /// Serialized size counted against the character budget.
    pub chars: usize,
}

/// One excluded file with the budget dimension that rejected it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DroppedFile {
    pub path: String,
    pub reason: DropReason,
}

/// The assembled context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssembledContext {
    pub files: Vec<AssembledFile>,
    pub dropped_files: Vec<DroppedFile>,
    pub total_chars: usize,
}

/// Assemble context from `refs` (document paths) in request order.
///
/// Per ref: once the accepted count reaches `max_docs` the ref is dropped
/// with reason `max_docs`; a missing document is silently skipped; a
/// document that would push the running total past `max_chars_total` is
/// dropped with that reason and does not consume budget; otherwise it is
/// accepted.
pub async fn assemble_context(
    documents: &dyn DocumentStore,
    scope: &Scope,
    refs: &[String],
    budget: &AssemblyBudget,
    cancel: &CancellationToken,
) -> CoreResult<AssembledContext> {
    if refs.is_empty() {
        return Err(CoreError::MissingAssemblyTargets);
    }

    let mut files = Vec::new();
    let mut dropped_files = Vec::new();
    let mut total_chars = 0usize;

    for path in refs {
        if cancel.is_cancelled() {
            return Err(CoreError::Cancelled);
        }

        if files.len() >= budget.max_docs {
            dropped_files.push(DroppedFile {
                path: path.clone(),
                reason: DropReason::MaxDocs,
            });
            continue;
        }

        let key = DocumentKey::new(scope.clone(), path.clone());
        let record = match documents.get(&key).await {
            Ok(record) => record,
            Err(StorageError::NotFound { .. }) => continue,
            Err(e) => return Err(e.into()),
        };

        let chars = record
            .envelope
            .serialized_len()
            .map_err(|e| CoreError::InvalidDocument(e.to_string()))?;
        if total_chars + chars > budget.max_chars_total {
            dropped_files.push(DroppedFile {
                path: path.clone(),
                reason: DropReason::MaxCharsTotal,
            });
            continue;
        }

        total_chars += chars;
        files.push(AssembledFile {
            path: path.clone(),
            etag: record.etag,
            envelope: record.envelope,
            chars,
        });
    }

    tracing::debug!(
        event = "context.assembled",
        scope = %scope,
        accepted = files.len(),
        dropped = dropped_files.len(),
        total_chars
    );

    Ok(AssembledContext {
        files,
        dropped_files,
        total_chars,
    })
}
