//! Browsing and write use-case services.
//!
//! # Responsibility
//! - Assemble note sequences and load revision histories over any `NoteStore`.
//! - Own per-session browsing state with stale-result protection.
//! - Orchestrate writes through `NoteWriter`.

pub mod error;
pub mod note_service;
pub mod revisions;
pub mod sequence;
pub mod status;

pub use error::{BrowseError, Direction, ErrorKind};
pub use note_service::{derive_markdown_preview, MarkdownPreview, NoteService, NoteServiceError};
pub use revisions::{RevisionSelector, RevisionState, RevisionSummary};
pub use sequence::{assemble_sequence, Assembly, CycleStop, SequenceAssembler, SequenceState};
pub use status::{LoadStatus, RunOutcome, PENDING_TEXT};

/// Settings for a sequence browsing session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BrowseConfig {
    /// Whether a freshly mounted session expands the chain. Off by default.
    pub recursive_default: bool,
}
