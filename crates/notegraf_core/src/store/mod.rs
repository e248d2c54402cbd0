//! Note Store contracts and backends.
//!
//! # Responsibility
//! - Define the read contract consumed by the browsing core (`NoteStore`).
//! - Define the write contract used by the note service (`NoteWriter`).
//! - Provide in-memory, SQLite and HTTP backends behind the same traits.
//!
//! # Invariants
//! - `fetch_note` resolves the current revision; deleted notes are `NotFound`.
//! - `fetch_revisions` is non-empty on success and every entry shares the
//!   requested id.
//! - Stores surface failures verbatim; callers decide how fatal they are.

use crate::model::note::{Note, NoteDraft, NoteId, NoteLocator, NoteValidationError, RevisionId};
use async_trait::async_trait;
use thiserror::Error;

pub mod http;
pub mod memory;
pub mod sqlite;

pub use http::{HttpNoteStore, HttpStoreConfig};
pub use memory::InMemoryNoteStore;
pub use sqlite::SqliteNoteStore;

pub type StoreResult<T> = Result<T, StoreError>;

/// Failure surfaced by a Note Store backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The note does not exist or has been deleted.
    #[error("note `{0}` not found")]
    NotFound(NoteId),
    #[error("revision `{revision}` of note `{id}` not found")]
    RevisionNotFound { id: NoteId, revision: RevisionId },
    /// Network, protocol, timeout or storage engine failure.
    #[error("transport error: {0}")]
    Transport(String),
    /// The backend answered with data that does not decode as a note.
    #[error("invalid note data: {0}")]
    InvalidData(String),
    #[error(transparent)]
    Validation(#[from] NoteValidationError),
}

/// Read side of a Note Store.
#[async_trait]
pub trait NoteStore: Send + Sync {
    /// Fetches the current revision of a note.
    async fn fetch_note(&self, id: &NoteId) -> StoreResult<Note>;

    /// Fetches one specific revision of a note.
    async fn fetch_revision(&self, id: &NoteId, revision: &RevisionId) -> StoreResult<Note>;

    /// Lists every stored revision of a note, most recent first.
    async fn fetch_revisions(&self, anchor: &NoteId) -> StoreResult<Vec<Note>>;
}

/// Write side of a Note Store.
#[async_trait]
pub trait NoteWriter: NoteStore {
    /// Creates a new note with a fresh id and first revision.
    async fn create_note(&self, draft: NoteDraft) -> StoreResult<NoteLocator>;

    /// Appends a new revision to a live note and makes it current.
    async fn update_note(&self, id: &NoteId, draft: NoteDraft) -> StoreResult<NoteLocator>;

    /// Deletes a note; its revision history stays listable.
    async fn delete_note(&self, id: &NoteId) -> StoreResult<()>;
}
