//! Record model shared by every persisted kind.
//!
//! # Responsibility
//! - Define the canonical record shape (identity, timestamps, attribute bag).
//! - Describe record kinds and their declared fields.
//!
//! # Invariants
//! - Every record is identified by the composite key `"<kind>.<id>"`.
//! - Field typing lives in kind descriptors, never in runtime inspection.

pub mod kind;
pub mod record;
