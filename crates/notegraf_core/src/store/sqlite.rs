//! SQLite-backed Note Store.
//!
//! # Responsibility
//! - Adapt the synchronous revision repository to the async store traits.
//! - Run every repository call on tokio's blocking pool.
//!
//! # Invariants
//! - One connection is shared behind a mutex; calls are serialized.
//! - Timestamps are stored with millisecond precision.

use crate::db::{open_db, open_db_in_memory, DbError};
use crate::model::note::{Note, NoteDraft, NoteId, NoteLocator, RevisionId};
use crate::repo::note_repo::{NoteRepository, RepoError, RepoResult, SqliteNoteRepository};
use crate::store::{NoteStore, NoteWriter, StoreError, StoreResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, error};
use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

impl From<RepoError> for StoreError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::NotFound(id) => Self::NotFound(id),
            RepoError::InvalidData(message) => Self::InvalidData(message),
            other => Self::Transport(other.to_string()),
        }
    }
}

impl From<DbError> for StoreError {
    fn from(value: DbError) -> Self {
        Self::Transport(value.to_string())
    }
}

/// Note Store persisted in a local SQLite database.
#[derive(Clone)]
pub struct SqliteNoteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteNoteStore {
    /// Opens (and migrates) a database file.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        Ok(Self::from_connection(open_db(path)?))
    }

    /// Opens a fresh migrated in-memory database.
    pub fn open_in_memory() -> StoreResult<Self> {
        Ok(Self::from_connection(open_db_in_memory()?))
    }

    /// Wraps an already migrated connection.
    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    async fn with_repo<T, F>(&self, op: F) -> StoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut SqliteNoteRepository<'_>) -> RepoResult<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|_| StoreError::Transport("sqlite connection lock poisoned".to_string()))?;
            let mut repo = SqliteNoteRepository::try_new(&mut guard)?;
            op(&mut repo).map_err(StoreError::from)
        })
        .await
        .map_err(|err| {
            error!("event=sqlite_task module=store.sqlite status=error error={err}");
            StoreError::Transport(format!("sqlite task failed: {err}"))
        })?
    }
}

/// Drops sub-millisecond precision so read-back snapshots compare equal.
fn stored_now() -> DateTime<Utc> {
    let now = Utc::now();
    DateTime::<Utc>::from_timestamp_millis(now.timestamp_millis()).unwrap_or(now)
}

fn new_snapshot(draft: NoteDraft, id: NoteId) -> Note {
    let revision = RevisionId::new(Uuid::new_v4().to_string());
    draft.into_note(id, revision, stored_now())
}

#[async_trait]
impl NoteStore for SqliteNoteStore {
    async fn fetch_note(&self, id: &NoteId) -> StoreResult<Note> {
        let id = id.clone();
        self.with_repo(move |repo| {
            repo.get_current(&id)?
                .ok_or(RepoError::NotFound(id))
        })
        .await
    }

    async fn fetch_revision(&self, id: &NoteId, revision: &RevisionId) -> StoreResult<Note> {
        let lookup = (id.clone(), revision.clone());
        let found = self
            .with_repo(move |repo| repo.get_revision(&lookup.0, &lookup.1))
            .await?;
        found.ok_or_else(|| StoreError::RevisionNotFound {
            id: id.clone(),
            revision: revision.clone(),
        })
    }

    async fn fetch_revisions(&self, anchor: &NoteId) -> StoreResult<Vec<Note>> {
        let id = anchor.clone();
        let revisions = self.with_repo(move |repo| repo.list_revisions(&id)).await?;
        if revisions.is_empty() {
            return Err(StoreError::NotFound(anchor.clone()));
        }
        Ok(revisions)
    }
}

#[async_trait]
impl NoteWriter for SqliteNoteStore {
    async fn create_note(&self, draft: NoteDraft) -> StoreResult<NoteLocator> {
        draft.validate(None)?;
        let note = new_snapshot(draft, NoteId::new(Uuid::new_v4().to_string()));
        let locator = note.locator();
        self.with_repo(move |repo| repo.insert_note(&note)).await?;
        debug!(
            "event=note_create module=store.sqlite status=ok note_id={}",
            locator.id()
        );
        Ok(locator)
    }

    async fn update_note(&self, id: &NoteId, draft: NoteDraft) -> StoreResult<NoteLocator> {
        draft.validate(Some(id))?;
        let note = new_snapshot(draft, id.clone());
        let locator = note.locator();
        self.with_repo(move |repo| repo.append_revision(&note))
            .await?;
        debug!("event=note_update module=store.sqlite status=ok note_id={id}");
        Ok(locator)
    }

    async fn delete_note(&self, id: &NoteId) -> StoreResult<()> {
        let target = id.clone();
        self.with_repo(move |repo| repo.mark_deleted(&target))
            .await?;
        debug!("event=note_delete module=store.sqlite status=ok note_id={id}");
        Ok(())
    }
}
