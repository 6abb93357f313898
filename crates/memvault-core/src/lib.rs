//! MemVault core library
//!
//! Mutation and retrieval engine for the scoped document service: the
//! dual patch engine, the coordinator that enforces envelope and size
//! invariants and emits audit records, budget-bounded context assembly,
//! scored event recall, and the retention/forget lifecycle.
//!
//! Storage backends are selected at startup and passed in as trait
//! objects; see `memvault_store` for the filesystem and in-memory
//! implementations.

pub mod assembly;
pub mod coordinator;
pub mod error;
pub mod lifecycle;
pub mod patch;

pub use assembly::{
    AssembledContext, AssembledFile, AssemblyBudget, DropReason, DroppedFile, DEFAULT_MAX_CHARS_TOTAL,
    DEFAULT_MAX_DOCS,
};
pub use coordinator::{MemoryCoordinator, PatchRequest, ReplaceRequest};
pub use error::{CoreError, CoreResult};
pub use lifecycle::{ForgetOutcome, LifecycleService, RetentionOutcome, RetentionRules};
pub use patch::{apply_edits, apply_ops, MAX_PATCH_OPS};

pub use memvault_store::{
    AuditRecord, AuditStore, DocumentEnvelope, DocumentKey, DocumentRecord, DocumentStore, Etag,
    EventDigest, EventQuery, EventStore, IfMatch, PatchOpKind, PatchOperation, Scope, ScoredEvent,
    StorageError, TextPatchEdit, MAX_ENVELOPE_CHARS,
};
