//! Core browsing logic for Notegraf.
//! Sequence assembly, revision selection and the Note Store backends live here.

pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;
pub mod store;

pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use model::note::{
    Note, NoteDraft, NoteId, NoteLocator, NoteMetadata, NoteValidationError, RevisionId,
};
pub use service::{
    assemble_sequence, BrowseConfig, BrowseError, Direction, ErrorKind, LoadStatus, NoteService,
    NoteServiceError, RevisionSelector, RunOutcome, SequenceAssembler,
};
pub use store::{
    HttpNoteStore, HttpStoreConfig, InMemoryNoteStore, NoteStore, NoteWriter, SqliteNoteStore,
    StoreError, StoreResult,
};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
