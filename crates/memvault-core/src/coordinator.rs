//! Orchestration layer for document mutation and retrieval.
//!
//! The coordinator owns validation (envelope fields, size limits, patch
//! bounds), drives the patch engine, writes through the document store's
//! compare-and-swap path, and emits one audit record per successful
//! mutation. Guard failures are synchronous typed errors with no partial
//! side effects; ETag conflicts propagate unchanged and callers own the
//! re-read-and-retry loop.

use std::sync::Arc;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use memvault_store::{
    validate_path, AuditRecord, AuditStore, DocumentEnvelope, DocumentKey, DocumentRecord,
    DocumentStore, EventDigest, EventQuery, EventStore, IfMatch, PatchOperation, Scope,
    ScoredEvent, TextPatchEdit, MAX_ENVELOPE_CHARS,
};

use crate::assembly::{self, AssembledContext, AssemblyBudget};
use crate::error::{CoreError, CoreResult};
use crate::patch::{self, MAX_PATCH_OPS};

/// A patch request: exactly one of `ops` (structural) or `edits` (text)
/// must be non-empty.
#[derive(Debug, Clone, Default)]
pub struct PatchRequest {
    pub ops: Vec<PatchOperation>,
    pub edits: Vec<TextPatchEdit>,
    pub reason: Option<String>,
    pub evidence_message_ids: Option<Vec<String>>,
}

/// A wholesale content replacement (or creation, with `if_match = "*"`).
#[derive(Debug, Clone)]
pub struct ReplaceRequest {
    pub schema_id: String,
    pub schema_version: String,
    pub content: serde_json::Value,
    pub reason: Option<String>,
    pub evidence_message_ids: Option<Vec<String>>,
}

/// Coordinates the document, event, and audit stores for one deployment.
pub struct MemoryCoordinator {
    documents: Arc<dyn DocumentStore>,
    events: Arc<dyn EventStore>,
    audit: Arc<dyn AuditStore>,
}

impl MemoryCoordinator {
    pub fn new(
        documents: Arc<dyn DocumentStore>,
        events: Arc<dyn EventStore>,
        audit: Arc<dyn AuditStore>,
    ) -> Self {
        Self {
            documents,
            events,
            audit,
        }
    }

    /// Load the current record for `key`.
    pub async fn get_document(&self, key: &DocumentKey) -> CoreResult<DocumentRecord> {
        validate_path(&key.path)?;
        Ok(self.documents.get(key).await?)
    }

    /// Apply a patch to an existing document.
    pub async fn patch_document(
        &self,
        key: &DocumentKey,
        request: PatchRequest,
        if_match: &str,
        actor: &str,
    ) -> CoreResult<DocumentRecord> {
        validate_path(&key.path)?;
        let if_match = IfMatch::parse(if_match).ok_or(CoreError::MissingIfMatch)?;
        validate_patch_shape(&request)?;

        let current = self.documents.get(key).await?;

        let mut patched = if !request.ops.is_empty() {
            patch::apply_ops(&current.envelope, &request.ops)?
        } else {
            let text = current
                .envelope
                .content
                .get("text")
                .and_then(|v| v.as_str())
                .ok_or(CoreError::PatchTextNotFound)?;
            let edited = patch::apply_edits(text, &request.edits)?;
            let mut envelope = current.envelope.clone();
            envelope.content["text"] = serde_json::Value::String(edited);
            envelope
        };

        if patched.doc_id != current.envelope.doc_id {
            return Err(CoreError::InvalidDocument("doc_id is immutable".to_string()));
        }
        patched.updated_at = Utc::now();
        patched.updated_by = actor.to_string();
        validate_envelope(&patched)?;

        let record = self.documents.upsert(key, patched, &if_match).await?;
        info!(
            event = "document.patched",
            key = %key,
            actor,
            new_etag = %record.etag,
            ops = request.ops.len(),
            edits = request.edits.len()
        );

        // Text-edit audits omit literal content; reconstruction relies on
        // reason and evidence pointers.
        let ops = if request.ops.is_empty() {
            None
        } else {
            Some(request.ops)
        };
        self.emit_audit(
            key,
            actor,
            Some(current.etag),
            &record,
            request.reason.unwrap_or_default(),
            ops,
            request.evidence_message_ids,
        )
        .await;

        Ok(record)
    }

    /// Replace a document's content wholesale, or create it when
    /// `if_match = "*"`.
    pub async fn replace_document(
        &self,
        key: &DocumentKey,
        request: ReplaceRequest,
        if_match: &str,
        actor: &str,
    ) -> CoreResult<DocumentRecord> {
        validate_path(&key.path)?;
        let if_match = IfMatch::parse(if_match).ok_or(CoreError::MissingIfMatch)?;

        let now = Utc::now();
        let (envelope, previous_etag) = match &if_match {
            IfMatch::Any => {
                let envelope = DocumentEnvelope {
                    doc_id: uuid::Uuid::new_v4().to_string(),
                    schema_id: request.schema_id,
                    schema_version: request.schema_version,
                    created_at: now,
                    updated_at: now,
                    updated_by: actor.to_string(),
                    content: request.content,
                };
                (envelope, None)
            }
            IfMatch::Etag(_) => {
                let current = self.documents.get(key).await?;
                let envelope = DocumentEnvelope {
                    doc_id: current.envelope.doc_id,
                    schema_id: request.schema_id,
                    schema_version: request.schema_version,
                    created_at: current.envelope.created_at,
                    updated_at: now,
                    updated_by: actor.to_string(),
                    content: request.content,
                };
                (envelope, Some(current.etag))
            }
        };
        validate_envelope(&envelope)?;

        let record = self.documents.upsert(key, envelope, &if_match).await?;
        info!(
            event = "document.replaced",
            key = %key,
            actor,
            created = previous_etag.is_none(),
            new_etag = %record.etag
        );

        self.emit_audit(
            key,
            actor,
            previous_etag,
            &record,
            request.reason.unwrap_or_default(),
            None,
            request.evidence_message_ids,
        )
        .await;

        Ok(record)
    }

    /// Assemble a deterministic context from `refs` within budget.
    pub async fn assemble_context(
        &self,
        scope: &Scope,
        refs: &[String],
        budget: &AssemblyBudget,
        cancel: &CancellationToken,
    ) -> CoreResult<AssembledContext> {
        assembly::assemble_context(self.documents.as_ref(), scope, refs, budget, cancel).await
    }

    /// Append one event digest.
    pub async fn write_event(&self, digest: EventDigest) -> CoreResult<()> {
        if digest.event_id.trim().is_empty() {
            return Err(CoreError::InvalidEvent("event_id is required".to_string()));
        }
        if digest.digest.trim().is_empty() {
            return Err(CoreError::InvalidEvent(
                "digest text is required".to_string(),
            ));
        }
        let event_id = digest.event_id.clone();
        let scope = digest.scope();
        self.events.append(digest).await?;
        info!(event = "event.written", scope = %scope, event_id = %event_id);
        Ok(())
    }

    /// Scored event recall over a scope.
    pub async fn search_events(
        &self,
        scope: &Scope,
        query: &EventQuery,
        cancel: &CancellationToken,
    ) -> CoreResult<Vec<ScoredEvent>> {
        if cancel.is_cancelled() {
            return Err(CoreError::Cancelled);
        }
        Ok(self.events.query(scope, query, cancel).await?)
    }

    /// Audit writes are best-effort and not transactional with the primary
    /// mutation: a failure here is surfaced in the log, never rolled back.
    #[allow(clippy::too_many_arguments)]
    async fn emit_audit(
        &self,
        key: &DocumentKey,
        actor: &str,
        previous_etag: Option<memvault_store::Etag>,
        record: &DocumentRecord,
        reason: String,
        ops: Option<Vec<PatchOperation>>,
        evidence_message_ids: Option<Vec<String>>,
    ) {
        let audit_record = AuditRecord {
            change_id: uuid::Uuid::new_v4().to_string(),
            actor: actor.to_string(),
            tenant_id: key.scope.tenant_id.clone(),
            user_id: key.scope.user_id.clone(),
            path: key.path.clone(),
            previous_etag,
            new_etag: record.etag.clone(),
            reason,
            ops,
            timestamp: Utc::now(),
            evidence_message_ids,
        };
        if let Err(e) = self.audit.append(audit_record).await {
            warn!(event = "audit.append_failed", key = %key, error = %e);
        }
    }
}

/// Exactly one dialect, bounded op count. Runs before any store access.
fn validate_patch_shape(request: &PatchRequest) -> CoreResult<()> {
    let count = request.ops.len() + request.edits.len();
    if request.ops.is_empty() == request.edits.is_empty() {
        return Err(CoreError::InvalidPatch(
            "exactly one of ops or edits must be non-empty".to_string(),
        ));
    }
    if count > MAX_PATCH_OPS {
        return Err(CoreError::PatchTooLarge {
            count,
            limit: MAX_PATCH_OPS,
        });
    }
    Ok(())
}

/// Required envelope fields plus the serialized size limit.
fn validate_envelope(envelope: &DocumentEnvelope) -> CoreResult<()> {
    for (field, value) in [
        ("doc_id", &envelope.doc_id),
        ("schema_id", &envelope.schema_id),
        ("schema_version", &envelope.schema_version),
        ("updated_by", &envelope.updated_by),
    ] {
        if value.trim().is_empty() {
            return Err(CoreError::InvalidDocument(format!("{field} is required")));
        }
    }
    let size = envelope
        .serialized_len()
        .map_err(|e| CoreError::InvalidDocument(e.to_string()))?;
    if size > MAX_ENVELOPE_CHARS {
        return Err(CoreError::DocumentSizeExceeded {
            size,
            limit: MAX_ENVELOPE_CHARS,
        });
    }
    Ok(())
}
