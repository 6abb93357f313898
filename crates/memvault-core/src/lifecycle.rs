//! Retention sweeps and forget-user across the three stores.
//!
//! Retention deletes event and audit records older than their per-category
//! cutoffs; documents are never touched by retention. Forget-user is
//! unconditional and ignores retention windows entirely.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::info;

use memvault_store::{AuditStore, DocumentStore, EventStore, Scope};

use crate::error::{CoreError, CoreResult};

/// Per-category retention windows in days.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionRules {
    pub events_days: u32,
    pub audit_days: u32,
    pub snapshots_days: u32,
}

/// Counts from one forget-user pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForgetOutcome {
    pub documents_deleted: usize,
    pub events_deleted: usize,
    pub audit_records_deleted: usize,
}

/// Counts and cutoffs from one retention sweep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetentionOutcome {
    pub events_deleted: usize,
    pub audit_records_deleted: usize,
    /// Documents are never retention-deleted; reported for completeness.
    pub snapshots_deleted: usize,
    pub events_cutoff: DateTime<Utc>,
    pub audit_cutoff: DateTime<Utc>,
    pub snapshots_cutoff: DateTime<Utc>,
}

/// Scheduled-deletion service operating directly on the store interfaces,
/// independent of the coordinator.
pub struct LifecycleService {
    documents: Arc<dyn DocumentStore>,
    events: Arc<dyn EventStore>,
    audit: Arc<dyn AuditStore>,
}

impl LifecycleService {
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

    /// Delete everything scoped to `(tenant, user)`: documents, events,
    /// and audit records. Ignores retention windows.
    pub async fn forget_user(
        &self,
        scope: &Scope,
        cancel: &CancellationToken,
    ) -> CoreResult<ForgetOutcome> {
        let mut documents_deleted = 0;
        for key in self.documents.list_keys(scope).await? {
            if cancel.is_cancelled() {
                return Err(CoreError::Cancelled);
            }
            if self.documents.delete(&key).await? {
                documents_deleted += 1;
            }
        }

        if cancel.is_cancelled() {
            return Err(CoreError::Cancelled);
        }
        let events_deleted = self.events.delete_scope(scope).await?;

        if cancel.is_cancelled() {
            return Err(CoreError::Cancelled);
        }
        let audit_records_deleted = self.audit.delete_scope(scope).await?;

        let outcome = ForgetOutcome {
            documents_deleted,
            events_deleted,
            audit_records_deleted,
        };
        info!(
            event = "lifecycle.forget_user",
            scope = %scope,
            documents = outcome.documents_deleted,
            events = outcome.events_deleted,
            audit_records = outcome.audit_records_deleted
        );
        Ok(outcome)
    }

    /// Sweep events and audit records strictly older than their cutoffs.
    /// `as_of` defaults to now. Documents are never touched.
    pub async fn apply_retention(
        &self,
        rules: &RetentionRules,
        as_of: Option<DateTime<Utc>>,
        cancel: &CancellationToken,
    ) -> CoreResult<RetentionOutcome> {
        let as_of = as_of.unwrap_or_else(Utc::now);
        let events_cutoff = cutoff(as_of, rules.events_days)?;
        let audit_cutoff = cutoff(as_of, rules.audit_days)?;
        let snapshots_cutoff = cutoff(as_of, rules.snapshots_days)?;

        if cancel.is_cancelled() {
            return Err(CoreError::Cancelled);
        }
        let events_deleted = self.events.delete_before(events_cutoff, cancel).await?;
        let audit_records_deleted = self.audit.delete_before(audit_cutoff, cancel).await?;

        let outcome = RetentionOutcome {
            events_deleted,
            audit_records_deleted,
            snapshots_deleted: 0,
            events_cutoff,
            audit_cutoff,
            snapshots_cutoff,
        };
        info!(
            event = "lifecycle.retention_applied",
            events = outcome.events_deleted,
            audit_records = outcome.audit_records_deleted,
            events_cutoff = %events_cutoff,
            audit_cutoff = %audit_cutoff
        );
        Ok(outcome)
    }
}

/// Subtract a day window from `as_of`, rejecting windows that fall outside
/// chrono's representable range.
fn cutoff(as_of: DateTime<Utc>, days: u32) -> CoreResult<DateTime<Utc>> {
    as_of
        .checked_sub_signed(Duration::days(i64::from(days)))
        .ok_or_else(|| {
            CoreError::InvalidRetentionRules(format!("retention window out of range: {days} days"))
        })
}
