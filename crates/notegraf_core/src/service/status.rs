//! Load status shared by the browsing components.

use crate::service::error::BrowseError;

/// Neutral pending indicator shown while a load is in flight.
pub const PENDING_TEXT: &str = "Loading...";

/// Lifecycle of one component's payload.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LoadStatus {
    #[default]
    Loading,
    Loaded,
    Failed(BrowseError),
}

impl LoadStatus {
    pub fn is_loading(&self) -> bool {
        matches!(self, Self::Loading)
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self, Self::Loaded)
    }

    pub fn error(&self) -> Option<&BrowseError> {
        match self {
            Self::Failed(err) => Some(err),
            _ => None,
        }
    }

    /// User-visible status line; empty once loaded.
    pub fn describe(&self) -> String {
        match self {
            Self::Loading => PENDING_TEXT.to_string(),
            Self::Loaded => String::new(),
            Self::Failed(err) => err.to_string(),
        }
    }
}

/// Result of trying to commit one run into component state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The run was the newest one and its result is now visible.
    Committed,
    /// A newer run started meanwhile; the result was dropped.
    Superseded,
}
