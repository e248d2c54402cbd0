//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define synchronous data access contracts for note revisions.
//! - Isolate SQLite query details from the async store facade.
//!
//! # Invariants
//! - Repository APIs return semantic errors (`NotFound`, `Conflict`) in
//!   addition to DB transport errors.
//! - Persisted revisions are never rewritten in place.

pub mod note_repo;
