#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use notegraf_core::model::note::{Note, NoteId, NoteMetadata, RevisionId};
use notegraf_core::store::{NoteStore, StoreError, StoreResult};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

/// One recorded store call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fetch {
    Note(String),
    Revision(String, String),
    Revisions(String),
}

/// Read-only store with scripted contents, failures and latencies.
#[derive(Default)]
pub struct ScriptedStore {
    notes: HashMap<NoteId, Note>,
    revisions: HashMap<NoteId, Vec<Note>>,
    failures: HashMap<NoteId, StoreError>,
    delays: HashMap<NoteId, Duration>,
    log: Mutex<Vec<Fetch>>,
}

impl ScriptedStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `note` as the current snapshot served for its own id.
    pub fn with_note(self, note: Note) -> Self {
        let id = note.id.clone();
        self.with_note_at(id, note)
    }

    /// Serves `note` when `key` is requested, whatever id the note carries.
    pub fn with_note_at(mut self, key: impl Into<NoteId>, note: Note) -> Self {
        self.notes.insert(key.into(), note);
        self
    }

    pub fn with_revisions(mut self, id: impl Into<NoteId>, revisions: Vec<Note>) -> Self {
        self.revisions.insert(id.into(), revisions);
        self
    }

    pub fn failing(mut self, id: impl Into<NoteId>, err: StoreError) -> Self {
        self.failures.insert(id.into(), err);
        self
    }

    pub fn delayed(mut self, id: impl Into<NoteId>, delay: Duration) -> Self {
        self.delays.insert(id.into(), delay);
        self
    }

    pub fn calls(&self) -> Vec<Fetch> {
        self.log.lock().unwrap().clone()
    }

    /// Ids passed to `fetch_note`, in call order.
    pub fn fetched_notes(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Fetch::Note(id) => Some(id),
                _ => None,
            })
            .collect()
    }

    async fn enter(&self, id: &NoteId, call: Fetch) -> StoreResult<()> {
        self.log.lock().unwrap().push(call);
        if let Some(delay) = self.delays.get(id) {
            tokio::time::sleep(*delay).await;
        }
        match self.failures.get(id) {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl NoteStore for ScriptedStore {
    async fn fetch_note(&self, id: &NoteId) -> StoreResult<Note> {
        self.enter(id, Fetch::Note(id.to_string())).await?;
        self.notes
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.clone()))
    }

    async fn fetch_revision(&self, id: &NoteId, revision: &RevisionId) -> StoreResult<Note> {
        self.enter(id, Fetch::Revision(id.to_string(), revision.to_string()))
            .await?;
        self.revisions
            .get(id)
            .and_then(|list| list.iter().find(|note| &note.revision == revision))
            .cloned()
            .ok_or_else(|| StoreError::RevisionNotFound {
                id: id.clone(),
                revision: revision.clone(),
            })
    }

    async fn fetch_revisions(&self, anchor: &NoteId) -> StoreResult<Vec<Note>> {
        self.enter(anchor, Fetch::Revisions(anchor.to_string()))
            .await?;
        if let Some(list) = self.revisions.get(anchor) {
            return Ok(list.clone());
        }
        self.notes
            .get(anchor)
            .map(|note| vec![note.clone()])
            .ok_or_else(|| StoreError::NotFound(anchor.clone()))
    }
}

/// Snapshot `{id}-r1` with the given links.
pub fn note(id: &str, prev: Option<&str>, next: Option<&str>) -> Note {
    Note {
        id: NoteId::from(id),
        revision: RevisionId::from(format!("{id}-r1")),
        title: Some(format!("Note {id}")),
        body: format!("body of {id}"),
        prev: prev.map(NoteId::from),
        next: next.map(NoteId::from),
        metadata: NoteMetadata::new(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()),
    }
}

/// One revision of `id`; `minute` orders revisions in time.
pub fn revision(id: &str, rev: &str, title: Option<&str>, body: &str, minute: u32) -> Note {
    Note {
        id: NoteId::from(id),
        revision: RevisionId::from(rev),
        title: title.map(str::to_string),
        body: body.to_string(),
        prev: None,
        next: None,
        metadata: NoteMetadata::new(Utc.with_ymd_and_hms(2024, 1, 1, 12, minute, 0).unwrap()),
    }
}

/// The A <-> B <-> C chain.
pub fn abc_store() -> ScriptedStore {
    ScriptedStore::new()
        .with_note(note("A", None, Some("B")))
        .with_note(note("B", Some("A"), Some("C")))
        .with_note(note("C", Some("B"), None))
}

pub fn ids(notes: &[Note]) -> Vec<&str> {
    notes.iter().map(|note| note.id.as_str()).collect()
}
