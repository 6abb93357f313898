//! Dual patch engine: structural JSON patches and deterministic text edits.
//!
//! Both dialects are pure functions from an existing envelope to a new one;
//! neither touches storage. A request carries exactly one non-empty dialect
//! and the whole list applies all-or-nothing.

pub mod structural;
pub mod text;

pub use structural::apply_ops;
pub use text::apply_edits;

/// Upper bound on ops/edits per patch request.
pub const MAX_PATCH_OPS: usize = 100;
