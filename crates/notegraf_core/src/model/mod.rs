//! Domain model for versioned, linked notes.
//!
//! # Responsibility
//! - Define the canonical snapshot shape shared by stores and browsers.
//! - Keep wire naming (`note_inner`, externally tagged locators) in one place.
//!
//! # Invariants
//! - Every revision of a note shares one stable `NoteId`.
//! - Chain links (`prev`/`next`) resolve to the current revision of the target.

pub mod note;
