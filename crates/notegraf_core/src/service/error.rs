//! Closed error-kind enumeration for the browsing services.

use crate::model::note::NoteId;
use crate::store::StoreError;
use std::fmt::{self, Display};
use thiserror::Error;

/// Expansion direction along prev/next links.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Following `prev` links, prepending.
    Backward,
    /// Following `next` links, appending.
    Forward,
}

impl Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Backward => f.write_str("backward"),
            Self::Forward => f.write_str("forward"),
        }
    }
}

/// Fieldless discriminant of [`BrowseError`] for branching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    Transport,
    CycleDetected,
    EmptyRevisionSet,
}

/// Failure observed while assembling a sequence or loading revisions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BrowseError {
    #[error("note `{0}` not found")]
    NotFound(NoteId),
    /// Network, protocol, timeout or storage failure, message kept verbatim.
    #[error("{0}")]
    Transport(String),
    /// Expansion revisited an id; the chain is truncated, not failed.
    #[error("chain truncated: note `{revisited}` revisited while expanding {direction}")]
    CycleDetected {
        revisited: NoteId,
        direction: Direction,
    },
    /// The store reported success with no revisions.
    #[error("note `{0}` has no revisions")]
    EmptyRevisionSet(NoteId),
}

impl BrowseError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Transport(_) => ErrorKind::Transport,
            Self::CycleDetected { .. } => ErrorKind::CycleDetected,
            Self::EmptyRevisionSet(_) => ErrorKind::EmptyRevisionSet,
        }
    }

    /// `CycleDetected` still yields a usable chain; every other kind does not.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::CycleDetected { .. })
    }
}

impl From<StoreError> for BrowseError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::NotFound(id) => Self::NotFound(id),
            StoreError::RevisionNotFound { id, .. } => Self::NotFound(id),
            other => Self::Transport(other.to_string()),
        }
    }
}
