//! End-to-end document flow over the filesystem backends: create, patch in
//! both dialects, conflict retry, and context assembly.

use std::sync::Arc;

use serde_json::json;
use tokio_util::sync::CancellationToken;

use memvault_core::{
    AssemblyBudget, CoreError, DocumentKey, MemoryCoordinator, PatchOpKind, PatchOperation,
    PatchRequest, ReplaceRequest, Scope, TextPatchEdit,
};
use memvault_store::fs::{FsAuditStore, FsDocumentStore, FsEventStore};

async fn coordinator(root: &std::path::Path) -> MemoryCoordinator {
    MemoryCoordinator::new(
        Arc::new(FsDocumentStore::new(root).await.unwrap()),
        Arc::new(FsEventStore::new(root).await.unwrap()),
        Arc::new(FsAuditStore::new(root).await.unwrap()),
    )
}

fn scope() -> Scope {
    Scope::new("tenant-a", "user-1")
}

fn key(path: &str) -> DocumentKey {
    DocumentKey::new(scope(), path)
}

fn replace(text: &str) -> ReplaceRequest {
    ReplaceRequest {
        schema_id: "note".into(),
        schema_version: "1".into(),
        content: json!({ "text": text }),
        reason: Some("e2e".into()),
        evidence_message_ids: None,
    }
}

fn text_edit(old: &str, new: &str, occurrence: Option<usize>) -> PatchRequest {
    PatchRequest {
        edits: vec![TextPatchEdit {
            old_text: old.into(),
            new_text: new.into(),
            occurrence,
        }],
        ..Default::default()
    }
}

#[tokio::test]
async fn write_then_read_is_byte_identical() {
    let dir = tempfile::tempdir().unwrap();
    let c = coordinator(dir.path()).await;

    let content = json!({
        "text": "line one\nline two",
        "nested": { "values": [1, 2, 3], "flag": true }
    });
    let mut request = replace("x");
    request.content = content.clone();
    let created = c.replace_document(&key("doc"), request, "*", "w").await.unwrap();

    let read = c.get_document(&key("doc")).await.unwrap();
    assert_eq!(read.envelope.content, content);
    assert_eq!(read.etag, created.etag);
}

#[tokio::test]
async fn ambiguous_edit_then_occurrence_resolves() {
    let dir = tempfile::tempdir().unwrap();
    let c = coordinator(dir.path()).await;
    let created = c
        .replace_document(&key("doc"), replace("alpha\nalpha\n"), "*", "w")
        .await
        .unwrap();

    let err = c
        .patch_document(
            &key("doc"),
            text_edit("alpha\n", "beta\n", None),
            created.etag.as_str(),
            "w",
        )
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::PatchMatchAmbiguous { .. }));

    // The failed patch must not have advanced the document.
    let unchanged = c.get_document(&key("doc")).await.unwrap();
    assert_eq!(unchanged.etag, created.etag);

    let patched = c
        .patch_document(
            &key("doc"),
            text_edit("alpha\n", "beta\n", Some(2)),
            created.etag.as_str(),
            "w",
        )
        .await
        .unwrap();
    assert_eq!(patched.envelope.content["text"], json!("alpha\nbeta\n"));
}

#[tokio::test]
async fn loser_rebases_after_conflict() {
    let dir = tempfile::tempdir().unwrap();
    let c = coordinator(dir.path()).await;
    let base = c
        .replace_document(&key("doc"), replace("count: 0"), "*", "w")
        .await
        .unwrap();

    // Winner advances the document.
    c.patch_document(
        &key("doc"),
        text_edit("count: 0", "count: 1", None),
        base.etag.as_str(),
        "winner",
    )
    .await
    .unwrap();

    // Loser conflicts, re-reads using the attached latest etag, retries.
    let err = c
        .patch_document(
            &key("doc"),
            text_edit("count: 0", "count: 2", None),
            base.etag.as_str(),
            "loser",
        )
        .await
        .unwrap_err();
    let latest = err.latest_etag().cloned().expect("conflict carries latest");

    let current = c.get_document(&key("doc")).await.unwrap();
    assert_eq!(current.etag, latest);

    let rebased = c
        .patch_document(
            &key("doc"),
            text_edit("count: 1", "count: 2", None),
            latest.as_str(),
            "loser",
        )
        .await
        .unwrap();
    assert_eq!(rebased.envelope.content["text"], json!("count: 2"));
}

#[tokio::test]
async fn structural_patch_roundtrips_through_fs() {
    let dir = tempfile::tempdir().unwrap();
    let c = coordinator(dir.path()).await;
    let created = c
        .replace_document(&key("profile/main"), replace("bio"), "*", "w")
        .await
        .unwrap();

    let request = PatchRequest {
        ops: vec![
            PatchOperation {
                op: PatchOpKind::Add,
                path: "/content/projects".into(),
                value: Some(json!([])),
            },
            PatchOperation {
                op: PatchOpKind::Add,
                path: "/content/projects/-".into(),
                value: Some(json!("memvault")),
            },
        ],
        reason: Some("track projects".into()),
        ..Default::default()
    };
    c.patch_document(&key("profile/main"), request, created.etag.as_str(), "w")
        .await
        .unwrap();

    let read = c.get_document(&key("profile/main")).await.unwrap();
    assert_eq!(read.envelope.content["projects"], json!(["memvault"]));
}

#[tokio::test]
async fn assembly_over_fs_documents() {
    let dir = tempfile::tempdir().unwrap();
    let c = coordinator(dir.path()).await;
    for path in ["ctx/a", "ctx/b", "ctx/c"] {
        c.replace_document(&key(path), replace(path), "*", "w")
            .await
            .unwrap();
    }

    let budget = AssemblyBudget {
        max_docs: 2,
        max_chars_total: 30_000,
    };
    let refs: Vec<String> = ["ctx/a", "ctx/missing", "ctx/b", "ctx/c"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    let out = c
        .assemble_context(&scope(), &refs, &budget, &CancellationToken::new())
        .await
        .unwrap();

    let accepted: Vec<&str> = out.files.iter().map(|f| f.path.as_str()).collect();
    assert_eq!(accepted, vec!["ctx/a", "ctx/b"]);
    assert_eq!(out.dropped_files.len(), 1);
    assert_eq!(out.dropped_files[0].path, "ctx/c");
}
