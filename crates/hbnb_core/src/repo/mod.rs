//! Record store contract and file-backed implementation.
//!
//! # Responsibility
//! - Define the keyed registry API that services depend on.
//! - Keep JSON snapshot details inside the persistence boundary.
//!
//! # Invariants
//! - Lookups and deletes of absent keys return `NotFound`, never panic.
//! - Reload either applies every entry of the snapshot or none of them.

pub mod record_store;
