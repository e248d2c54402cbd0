//! In-memory Note Store.
//!
//! # Responsibility
//! - Keep full revision histories in process memory.
//! - Serve as the reference backend for development and tests.
//!
//! # Invariants
//! - A note with no current revision is deleted; its history is kept.
//! - Revision ids are unique within one note.

use crate::model::note::{Note, NoteDraft, NoteId, NoteLocator, RevisionId};
use crate::store::{NoteStore, NoteWriter, StoreError, StoreResult};
use async_trait::async_trait;
use chrono::Utc;
use log::debug;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Default)]
struct NoteHistory {
    /// Oldest first.
    revisions: Vec<Note>,
    current: Option<RevisionId>,
}

impl NoteHistory {
    fn current_note(&self) -> Option<&Note> {
        let current = self.current.as_ref()?;
        self.revisions.iter().find(|note| &note.revision == current)
    }
}

/// Volatile store with no persistence layer.
#[derive(Debug, Default)]
pub struct InMemoryNoteStore {
    notes: RwLock<HashMap<NoteId, NoteHistory>>,
}

impl InMemoryNoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Imports an existing snapshot as the current revision of its note.
    ///
    /// Used by import paths and fixtures where identity already exists.
    /// Re-seeding an already stored revision replaces that snapshot in place.
    pub async fn seed(&self, note: Note) {
        let mut notes = self.notes.write().await;
        let history = notes.entry(note.id.clone()).or_default();
        history.current = Some(note.revision.clone());
        match history
            .revisions
            .iter_mut()
            .find(|existing| existing.revision == note.revision)
        {
            Some(existing) => *existing = note,
            None => history.revisions.push(note),
        }
    }

    pub async fn is_empty(&self) -> bool {
        self.notes.read().await.is_empty()
    }
}

fn new_note_id() -> NoteId {
    NoteId::new(Uuid::new_v4().to_string())
}

fn new_revision_id() -> RevisionId {
    RevisionId::new(Uuid::new_v4().to_string())
}

#[async_trait]
impl NoteStore for InMemoryNoteStore {
    async fn fetch_note(&self, id: &NoteId) -> StoreResult<Note> {
        let notes = self.notes.read().await;
        notes
            .get(id)
            .and_then(NoteHistory::current_note)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.clone()))
    }

    async fn fetch_revision(&self, id: &NoteId, revision: &RevisionId) -> StoreResult<Note> {
        let notes = self.notes.read().await;
        let history = notes
            .get(id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;
        history
            .revisions
            .iter()
            .find(|note| &note.revision == revision)
            .cloned()
            .ok_or_else(|| StoreError::RevisionNotFound {
                id: id.clone(),
                revision: revision.clone(),
            })
    }

    async fn fetch_revisions(&self, anchor: &NoteId) -> StoreResult<Vec<Note>> {
        let notes = self.notes.read().await;
        let history = notes
            .get(anchor)
            .ok_or_else(|| StoreError::NotFound(anchor.clone()))?;
        Ok(history.revisions.iter().rev().cloned().collect())
    }
}

#[async_trait]
impl NoteWriter for InMemoryNoteStore {
    async fn create_note(&self, draft: NoteDraft) -> StoreResult<NoteLocator> {
        draft.validate(None)?;
        let id = new_note_id();
        let revision = new_revision_id();
        let note = draft.into_note(id.clone(), revision.clone(), Utc::now());

        let mut notes = self.notes.write().await;
        notes.insert(
            id.clone(),
            NoteHistory {
                revisions: vec![note],
                current: Some(revision.clone()),
            },
        );
        debug!("event=note_create module=store.memory status=ok note_id={id}");
        Ok(NoteLocator::Specific(id, revision))
    }

    async fn update_note(&self, id: &NoteId, draft: NoteDraft) -> StoreResult<NoteLocator> {
        draft.validate(Some(id))?;
        let mut notes = self.notes.write().await;
        let history = notes
            .get_mut(id)
            .filter(|history| history.current.is_some())
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;

        let revision = new_revision_id();
        history
            .revisions
            .push(draft.into_note(id.clone(), revision.clone(), Utc::now()));
        history.current = Some(revision.clone());
        debug!(
            "event=note_update module=store.memory status=ok note_id={id} revisions={}",
            history.revisions.len()
        );
        Ok(NoteLocator::Specific(id.clone(), revision))
    }

    async fn delete_note(&self, id: &NoteId) -> StoreResult<()> {
        let mut notes = self.notes.write().await;
        let history = notes
            .get_mut(id)
            .filter(|history| history.current.is_some())
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;
        history.current = None;
        debug!("event=note_delete module=store.memory status=ok note_id={id}");
        Ok(())
    }
}
