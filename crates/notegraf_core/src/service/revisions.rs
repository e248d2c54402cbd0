//! Revision history loading and selection.
//!
//! # Responsibility
//! - Load every stored revision of an anchor note in one request.
//! - Track which revision is selected and expose it as the active note.
//!
//! # Invariants
//! - `revisions` and `selected` are populated only while `status == Loaded`.
//! - After a successful load, `selected` is the revision of the first entry.
//! - `select` never fetches; unknown revision ids leave the selection as is.

use crate::model::note::{Note, NoteId, RevisionId};
use crate::service::error::BrowseError;
use crate::service::note_service::derive_markdown_preview;
use crate::service::status::{LoadStatus, RunOutcome};
use crate::store::NoteStore;
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;

/// One entry of the revision picker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevisionSummary {
    pub revision: RevisionId,
    /// Non-blank title, if any.
    pub title: Option<String>,
    /// Plain-text excerpt of the body, for untitled revisions.
    pub preview: Option<String>,
    pub modified_at: DateTime<Utc>,
    pub is_selected: bool,
}

/// Observable state of one revision browsing session.
#[derive(Debug, Clone, PartialEq)]
pub struct RevisionState {
    pub anchor: NoteId,
    pub generation: u64,
    pub status: LoadStatus,
    /// Store order, most recent first.
    pub revisions: Vec<Note>,
    pub selected: Option<RevisionId>,
}

impl RevisionState {
    pub fn new(anchor: NoteId) -> Self {
        Self {
            anchor,
            generation: 0,
            status: LoadStatus::Loading,
            revisions: Vec::new(),
            selected: None,
        }
    }

    /// Starts a new load and returns its token.
    pub fn begin_run(&mut self, anchor: Option<NoteId>) -> u64 {
        if let Some(anchor) = anchor {
            self.anchor = anchor;
        }
        self.generation += 1;
        self.status = LoadStatus::Loading;
        self.revisions.clear();
        self.selected = None;
        self.generation
    }

    /// Commits a finished load if `token` is still current.
    ///
    /// An empty list becomes `Failed(EmptyRevisionSet)`; a list carrying
    /// another note's snapshot becomes a `Transport` failure.
    pub fn commit_run(
        &mut self,
        token: u64,
        result: Result<Vec<Note>, BrowseError>,
    ) -> RunOutcome {
        if token != self.generation {
            return RunOutcome::Superseded;
        }
        match result.and_then(|revisions| self.check_revisions(revisions)) {
            Ok(revisions) => {
                self.selected = revisions.first().map(|note| note.revision.clone());
                self.revisions = revisions;
                self.status = LoadStatus::Loaded;
            }
            Err(err) => {
                self.revisions.clear();
                self.selected = None;
                self.status = LoadStatus::Failed(err);
            }
        }
        RunOutcome::Committed
    }

    fn check_revisions(&self, revisions: Vec<Note>) -> Result<Vec<Note>, BrowseError> {
        if revisions.is_empty() {
            return Err(BrowseError::EmptyRevisionSet(self.anchor.clone()));
        }
        if let Some(foreign) = revisions.iter().find(|note| note.id != self.anchor) {
            return Err(BrowseError::Transport(format!(
                "revision list for `{}` contains note `{}`",
                self.anchor, foreign.id
            )));
        }
        Ok(revisions)
    }

    /// Selects a loaded revision; returns whether the selection changed.
    ///
    /// Unknown revision ids, or calls before a successful load, are no-ops.
    pub fn select(&mut self, revision: &RevisionId) -> bool {
        if !self.status.is_loaded() || self.selected.as_ref() == Some(revision) {
            return false;
        }
        if !self.revisions.iter().any(|note| &note.revision == revision) {
            return false;
        }
        self.selected = Some(revision.clone());
        true
    }

    /// The selected snapshot; `None` unless loaded.
    pub fn active(&self) -> Option<&Note> {
        if !self.status.is_loaded() {
            return None;
        }
        let selected = self.selected.as_ref()?;
        self.revisions.iter().find(|note| &note.revision == selected)
    }

    pub fn summaries(&self) -> Vec<RevisionSummary> {
        self.revisions
            .iter()
            .map(|note| RevisionSummary {
                revision: note.revision.clone(),
                title: note.display_title().map(str::to_string),
                preview: derive_markdown_preview(&note.body).preview_text,
                modified_at: note.metadata.modified_at,
                is_selected: self.selected.as_ref() == Some(&note.revision),
            })
            .collect()
    }
}

/// Stateful revision picker bound to one anchor and one store.
pub struct RevisionSelector<S: NoteStore + ?Sized> {
    store: Arc<S>,
    state: watch::Sender<RevisionState>,
}

impl<S: NoteStore + ?Sized> RevisionSelector<S> {
    pub fn new(store: Arc<S>, anchor: NoteId) -> Self {
        let (state, _) = watch::channel(RevisionState::new(anchor));
        Self { store, state }
    }

    /// Loads the revision list for the current anchor.
    pub fn load(&self) -> impl Future<Output = RunOutcome> + '_ {
        self.start(None)
    }

    /// Points the selector at a new anchor and reloads.
    pub fn set_anchor(&self, anchor: NoteId) -> impl Future<Output = RunOutcome> + '_ {
        self.start(Some(anchor))
    }

    /// Returns whether the selection changed.
    pub fn select(&self, revision: &RevisionId) -> bool {
        let changed = self.state.send_if_modified(|state| state.select(revision));
        if !changed {
            debug!("event=revision_select module=revisions status=ignored revision={revision}");
        }
        changed
    }

    pub fn active(&self) -> Option<Note> {
        self.state.borrow().active().cloned()
    }

    pub fn summaries(&self) -> Vec<RevisionSummary> {
        self.state.borrow().summaries()
    }

    pub fn state(&self) -> RevisionState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<RevisionState> {
        self.state.subscribe()
    }

    fn start(&self, anchor: Option<NoteId>) -> impl Future<Output = RunOutcome> + '_ {
        let mut run = None;
        self.state.send_modify(|state| {
            let token = state.begin_run(anchor);
            run = Some((token, state.anchor.clone()));
        });

        async move {
            let Some((token, anchor)) = run else {
                return RunOutcome::Superseded;
            };
            let result = load_revisions(self.store.as_ref(), &anchor).await;
            let mut outcome = RunOutcome::Superseded;
            self.state.send_if_modified(|state| {
                outcome = state.commit_run(token, result);
                outcome == RunOutcome::Committed
            });
            if outcome == RunOutcome::Superseded {
                debug!("event=revision_commit module=revisions status=stale generation={token}");
            }
            outcome
        }
    }
}

/// Fetches the full revision list of `anchor` as one request.
pub async fn load_revisions<S>(store: &S, anchor: &NoteId) -> Result<Vec<Note>, BrowseError>
where
    S: NoteStore + ?Sized,
{
    let started_at = Instant::now();
    match store.fetch_revisions(anchor).await {
        Ok(revisions) => {
            info!(
                "event=revision_load module=revisions status=ok anchor={anchor} revisions={} duration_ms={}",
                revisions.len(),
                started_at.elapsed().as_millis()
            );
            Ok(revisions)
        }
        Err(err) => {
            warn!(
                "event=revision_load module=revisions status=error anchor={anchor} duration_ms={} error={err}",
                started_at.elapsed().as_millis()
            );
            Err(err.into())
        }
    }
}
