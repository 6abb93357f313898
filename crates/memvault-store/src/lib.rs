//! MemVault storage layer (Layer 0)
//!
//! Persistence for the scoped document service: envelopes with
//! content-hash ETags and compare-and-swap writes, append-only event
//! digests with scored recall, and a write-only audit log.
//!
//! ## Key Components
//!
//! - `storage_traits`: the three async store abstractions
//! - `fs`: filesystem backends (per-key gate emulating conditional writes)
//! - `fakes`: in-memory backends with identical observable semantics
//! - `recall`: shared filter + relevance scoring for event queries

mod error;
pub mod fakes;
pub mod fs;
pub mod recall;
pub mod schema;
pub mod storage_traits;

pub use error::StorageError;
pub use recall::EventQuery;
pub use schema::{
    validate_path, AuditRecord, DocumentEnvelope, DocumentKey, DocumentRecord, Etag, EventDigest,
    IfMatch, PatchOpKind, PatchOperation, Scope, ScoredEvent, TextPatchEdit, MAX_ENVELOPE_CHARS,
};
pub use storage_traits::{AuditStore, DocumentStore, EventStore, StorageResult};
