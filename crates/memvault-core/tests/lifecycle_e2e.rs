//! Retention and forget-user scenarios across the full stack.

use std::sync::Arc;

use chrono::{Duration, Utc};
use serde_json::json;
use tokio_util::sync::CancellationToken;

use memvault_core::{
    CoreError, DocumentKey, EventDigest, EventQuery, LifecycleService, MemoryCoordinator,
    ReplaceRequest, RetentionRules, Scope,
};
use memvault_store::fs::{FsAuditStore, FsDocumentStore, FsEventStore};

struct Stack {
    coordinator: MemoryCoordinator,
    lifecycle: LifecycleService,
}

async fn stack(root: &std::path::Path) -> Stack {
    let documents = Arc::new(FsDocumentStore::new(root).await.unwrap());
    let events = Arc::new(FsEventStore::new(root).await.unwrap());
    let audit = Arc::new(FsAuditStore::new(root).await.unwrap());
    Stack {
        coordinator: MemoryCoordinator::new(documents.clone(), events.clone(), audit.clone()),
        lifecycle: LifecycleService::new(documents, events, audit),
    }
}

fn scope() -> Scope {
    Scope::new("tenant-a", "user-1")
}

fn event(id: &str, digest: &str, age_days: i64) -> EventDigest {
    EventDigest {
        event_id: id.into(),
        tenant_id: "tenant-a".into(),
        user_id: "user-1".into(),
        service_id: "svc".into(),
        timestamp: Utc::now() - Duration::days(age_days),
        source_type: "chat".into(),
        digest: digest.into(),
        keywords: vec!["memo".into()],
        project_ids: Vec::new(),
        evidence: json!({ "message_id": id }),
    }
}

#[tokio::test]
async fn retention_removes_old_events_from_search() {
    let dir = tempfile::tempdir().unwrap();
    let s = stack(dir.path()).await;
    let cancel = CancellationToken::new();

    // One year plus one day old, and one day old.
    s.coordinator
        .write_event(event("e-old", "stale deploy note", 366))
        .await
        .unwrap();
    s.coordinator
        .write_event(event("e-new", "fresh deploy note", 1))
        .await
        .unwrap();

    let before = s
        .coordinator
        .search_events(&scope(), &EventQuery::text("deploy"), &cancel)
        .await
        .unwrap();
    assert_eq!(before.len(), 2);

    let rules = RetentionRules {
        events_days: 365,
        audit_days: 365,
        snapshots_days: 365,
    };
    let outcome = s
        .lifecycle
        .apply_retention(&rules, None, &cancel)
        .await
        .unwrap();
    assert_eq!(outcome.events_deleted, 1);

    let after = s
        .coordinator
        .search_events(&scope(), &EventQuery::text("deploy"), &cancel)
        .await
        .unwrap();
    assert_eq!(after.len(), 1);
    assert_eq!(after[0].event.event_id, "e-new");
}

#[tokio::test]
async fn forget_user_empties_documents_and_search() {
    let dir = tempfile::tempdir().unwrap();
    let s = stack(dir.path()).await;
    let cancel = CancellationToken::new();

    let key = DocumentKey::new(scope(), "notes/today");
    s.coordinator
        .replace_document(
            &key,
            ReplaceRequest {
                schema_id: "note".into(),
                schema_version: "1".into(),
                content: json!({ "text": "remember this" }),
                reason: None,
                evidence_message_ids: None,
            },
            "*",
            "writer",
        )
        .await
        .unwrap();
    s.coordinator
        .write_event(event("e1", "wrote a note", 1))
        .await
        .unwrap();

    let outcome = s.lifecycle.forget_user(&scope(), &cancel).await.unwrap();
    assert_eq!(outcome.documents_deleted, 1);
    assert_eq!(outcome.events_deleted, 1);
    // The replace was audited; forget removes that too.
    assert_eq!(outcome.audit_records_deleted, 1);

    let err = s.coordinator.get_document(&key).await.unwrap_err();
    assert!(matches!(err, CoreError::DocumentNotFound { .. }));

    let hits = s
        .coordinator
        .search_events(&scope(), &EventQuery::default(), &cancel)
        .await
        .unwrap();
    assert!(hits.is_empty());
}

#[tokio::test]
async fn forget_is_scoped_to_one_user() {
    let dir = tempfile::tempdir().unwrap();
    let s = stack(dir.path()).await;
    let cancel = CancellationToken::new();

    let other_scope = Scope::new("tenant-a", "user-2");
    s.coordinator
        .write_event(event("mine", "belongs to user-1", 1))
        .await
        .unwrap();
    s.coordinator
        .write_event(EventDigest {
            user_id: "user-2".into(),
            ..event("theirs", "belongs to user-2", 1)
        })
        .await
        .unwrap();

    s.lifecycle.forget_user(&scope(), &cancel).await.unwrap();

    let hits = s
        .coordinator
        .search_events(&other_scope, &EventQuery::default(), &cancel)
        .await
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].event.event_id, "theirs");
}
