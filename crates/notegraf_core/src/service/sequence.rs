//! Sequence assembly along prev/next links.
//!
//! # Responsibility
//! - Reconstruct the ordered chain around an anchor note.
//! - Own the per-session sequence state and its generation token.
//!
//! # Invariants
//! - An assembled chain never contains the same note id twice.
//! - Backward expansion finishes before forward expansion starts.
//! - Any fetch failure discards the whole chain (all-or-nothing).
//! - Only the run holding the current generation token may commit.
//! - `notes` is non-empty only while `status == Loaded`.

use crate::model::note::{Note, NoteId};
use crate::service::error::{BrowseError, Direction};
use crate::service::status::{LoadStatus, RunOutcome};
use crate::service::BrowseConfig;
use crate::store::NoteStore;
use log::{debug, info, warn};
use std::collections::{HashSet, VecDeque};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;

/// Expansion in one direction stopped because a link pointed back into the chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleStop {
    pub direction: Direction,
    pub revisited: NoteId,
}

impl CycleStop {
    pub fn to_error(&self) -> BrowseError {
        BrowseError::CycleDetected {
            revisited: self.revisited.clone(),
            direction: self.direction,
        }
    }
}

/// A successfully assembled chain, ordered backward-most to forward-most.
#[derive(Debug, Clone, PartialEq)]
pub struct Assembly {
    pub notes: Vec<Note>,
    /// At most one entry per direction.
    pub cycle_stops: Vec<CycleStop>,
}

impl Assembly {
    pub fn is_truncated(&self) -> bool {
        !self.cycle_stops.is_empty()
    }
}

/// Fetches the anchor and, when `recursive`, expands it into a maximal chain.
///
/// # Errors
/// - Returns the first fetch failure; no partial chain is ever returned.
pub async fn assemble_sequence<S>(
    store: &S,
    anchor: &NoteId,
    recursive: bool,
) -> Result<Assembly, BrowseError>
where
    S: NoteStore + ?Sized,
{
    let started_at = Instant::now();
    info!("event=sequence_assemble module=sequence status=start anchor={anchor} recursive={recursive}");

    let result = assemble_inner(store, anchor, recursive).await;
    match &result {
        Ok(assembly) => info!(
            "event=sequence_assemble module=sequence status=ok anchor={anchor} notes={} truncated={} duration_ms={}",
            assembly.notes.len(),
            assembly.is_truncated(),
            started_at.elapsed().as_millis()
        ),
        Err(err) => warn!(
            "event=sequence_assemble module=sequence status=error anchor={anchor} kind={:?} duration_ms={}",
            err.kind(),
            started_at.elapsed().as_millis()
        ),
    }
    result
}

async fn assemble_inner<S>(
    store: &S,
    anchor: &NoteId,
    recursive: bool,
) -> Result<Assembly, BrowseError>
where
    S: NoteStore + ?Sized,
{
    let anchor_note = store.fetch_note(anchor).await?;
    let mut visited = HashSet::from([anchor_note.id.clone()]);
    let mut chain = VecDeque::from([anchor_note]);
    let mut cycle_stops = Vec::new();

    if recursive {
        for direction in [Direction::Backward, Direction::Forward] {
            if let Some(stop) = expand(store, &mut chain, &mut visited, direction).await? {
                cycle_stops.push(stop);
            }
        }
    }

    Ok(Assembly {
        notes: chain.into(),
        cycle_stops,
    })
}

async fn expand<S>(
    store: &S,
    chain: &mut VecDeque<Note>,
    visited: &mut HashSet<NoteId>,
    direction: Direction,
) -> Result<Option<CycleStop>, BrowseError>
where
    S: NoteStore + ?Sized,
{
    loop {
        let link = match direction {
            Direction::Backward => chain.front().and_then(|note| note.prev.clone()),
            Direction::Forward => chain.back().and_then(|note| note.next.clone()),
        };
        let Some(link) = link else {
            return Ok(None);
        };

        // Checked before fetching so a known cycle costs no request.
        if visited.contains(&link) {
            debug!("event=sequence_expand module=sequence status=cycle direction={direction} note_id={link}");
            return Ok(Some(CycleStop {
                direction,
                revisited: link,
            }));
        }

        let note = match store.fetch_note(&link).await {
            Ok(note) => note,
            Err(err) => {
                warn!(
                    "event=sequence_expand module=sequence status=error direction={direction} note_id={link} error={err}"
                );
                return Err(err.into());
            }
        };

        if !visited.insert(note.id.clone()) {
            debug!(
                "event=sequence_expand module=sequence status=cycle direction={direction} note_id={}",
                note.id
            );
            return Ok(Some(CycleStop {
                direction,
                revisited: note.id,
            }));
        }

        match direction {
            Direction::Backward => chain.push_front(note),
            Direction::Forward => chain.push_back(note),
        }
    }
}

/// Observable state of one sequence browsing session.
#[derive(Debug, Clone, PartialEq)]
pub struct SequenceState {
    pub anchor: NoteId,
    pub recursive: bool,
    /// Token of the most recently started run.
    pub generation: u64,
    pub status: LoadStatus,
    pub notes: Vec<Note>,
    pub cycle_stops: Vec<CycleStop>,
}

impl SequenceState {
    pub fn new(anchor: NoteId, recursive: bool) -> Self {
        Self {
            anchor,
            recursive,
            generation: 0,
            status: LoadStatus::Loading,
            notes: Vec::new(),
            cycle_stops: Vec::new(),
        }
    }

    /// Starts a new run and returns its token.
    ///
    /// Changing the anchor resets the session; the payload is cleared either way.
    pub fn begin_run(&mut self, anchor: Option<NoteId>, recursive: bool) -> u64 {
        if let Some(anchor) = anchor {
            self.anchor = anchor;
        }
        self.generation += 1;
        self.recursive = recursive;
        self.status = LoadStatus::Loading;
        self.notes.clear();
        self.cycle_stops.clear();
        self.generation
    }

    /// Commits a finished run if `token` is still current.
    pub fn commit_run(&mut self, token: u64, result: Result<Assembly, BrowseError>) -> RunOutcome {
        if token != self.generation {
            return RunOutcome::Superseded;
        }
        match result {
            Ok(assembly) => {
                self.notes = assembly.notes;
                self.cycle_stops = assembly.cycle_stops;
                self.status = LoadStatus::Loaded;
            }
            Err(err) => {
                self.notes.clear();
                self.cycle_stops.clear();
                self.status = LoadStatus::Failed(err);
            }
        }
        RunOutcome::Committed
    }
}

/// Stateful sequence component bound to one anchor and one store.
///
/// Runs are started synchronously (token taken, state set to `Loading`) and
/// driven by awaiting the returned future. A run overtaken by a newer one
/// completes as [`RunOutcome::Superseded`] without touching visible state.
pub struct SequenceAssembler<S: NoteStore + ?Sized> {
    store: Arc<S>,
    state: watch::Sender<SequenceState>,
}

impl<S: NoteStore + ?Sized> SequenceAssembler<S> {
    pub fn new(store: Arc<S>, anchor: NoteId, config: &BrowseConfig) -> Self {
        let (state, _) = watch::channel(SequenceState::new(anchor, config.recursive_default));
        Self { store, state }
    }

    /// Initial load with the configured recursion default.
    pub fn mount(&self) -> impl Future<Output = RunOutcome> + '_ {
        let recursive = self.state.borrow().recursive;
        self.assemble(recursive)
    }

    /// Sets the recursion flag and re-assembles from scratch.
    pub fn set_recursive(&self, recursive: bool) -> impl Future<Output = RunOutcome> + '_ {
        self.assemble(recursive)
    }

    pub fn toggle_recursive(&self) -> impl Future<Output = RunOutcome> + '_ {
        let recursive = !self.state.borrow().recursive;
        self.assemble(recursive)
    }

    /// Points the session at a new anchor and re-assembles.
    pub fn set_anchor(&self, anchor: NoteId) -> impl Future<Output = RunOutcome> + '_ {
        let recursive = self.state.borrow().recursive;
        self.start(Some(anchor), recursive)
    }

    /// Starts a full run for the current anchor.
    pub fn assemble(&self, recursive: bool) -> impl Future<Output = RunOutcome> + '_ {
        self.start(None, recursive)
    }

    pub fn state(&self) -> SequenceState {
        self.state.borrow().clone()
    }

    /// Change feed for renderers.
    pub fn subscribe(&self) -> watch::Receiver<SequenceState> {
        self.state.subscribe()
    }

    fn start(
        &self,
        anchor: Option<NoteId>,
        recursive: bool,
    ) -> impl Future<Output = RunOutcome> + '_ {
        let mut run = None;
        self.state.send_modify(|state| {
            let token = state.begin_run(anchor, recursive);
            run = Some((token, state.anchor.clone()));
        });

        async move {
            let Some((token, anchor)) = run else {
                return RunOutcome::Superseded;
            };
            let result = assemble_sequence(self.store.as_ref(), &anchor, recursive).await;
            self.finish(token, result)
        }
    }

    fn finish(&self, token: u64, result: Result<Assembly, BrowseError>) -> RunOutcome {
        let mut outcome = RunOutcome::Superseded;
        self.state.send_if_modified(|state| {
            outcome = state.commit_run(token, result);
            outcome == RunOutcome::Committed
        });
        if outcome == RunOutcome::Superseded {
            debug!("event=sequence_commit module=sequence status=stale generation={token}");
        }
        outcome
    }
}
