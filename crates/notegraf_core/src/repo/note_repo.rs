//! Note revision repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Persist immutable note snapshots as rows of `revisions`.
//! - Track the current revision of every note in `notes`.
//! - Own per-revision tag rows with atomic write semantics.
//!
//! # Invariants
//! - Revision rows are append-only; updates add a row with a higher `seq`.
//! - `notes.current_revision IS NULL` marks a deleted note.
//! - Revision listings are ordered by `seq DESC` (newest first).

use crate::db::DbError;
use crate::model::note::{Note, NoteId, NoteMetadata, RevisionId};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction, TransactionBehavior};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{Display, Formatter};

const REVISION_SELECT_SQL: &str = "SELECT
    r.revision,
    r.note_id,
    r.title,
    r.body,
    r.prev_id,
    r.next_id,
    r.custom_metadata,
    r.modified_at
FROM revisions r";

pub type RepoResult<T> = Result<T, RepoError>;

/// Repository error for note persistence and query operations.
#[derive(Debug)]
pub enum RepoError {
    Db(DbError),
    NotFound(NoteId),
    /// A note with the same id already exists.
    Conflict(NoteId),
    InvalidData(String),
    MissingRequiredTable(&'static str),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound(id) => write!(f, "note not found: {id}"),
            Self::Conflict(id) => write!(f, "note already exists: {id}"),
            Self::InvalidData(message) => write!(f, "invalid persisted note data: {message}"),
            Self::MissingRequiredTable(table) => write!(f, "missing required table `{table}`"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Lifecycle state of one note row.
#[derive(Debug, Clone, PartialEq, Eq)]
enum NoteState {
    Missing,
    Live,
    Deleted,
}

/// Repository interface for note revision storage.
pub trait NoteRepository {
    /// Inserts a brand new note whose first revision is `note`.
    fn insert_note(&mut self, note: &Note) -> RepoResult<()>;
    /// Appends `note` as a new revision of a live note and makes it current.
    fn append_revision(&mut self, note: &Note) -> RepoResult<()>;
    /// Clears the current revision of a live note.
    fn mark_deleted(&mut self, id: &NoteId) -> RepoResult<()>;
    /// Gets the current revision; `None` when missing or deleted.
    fn get_current(&self, id: &NoteId) -> RepoResult<Option<Note>>;
    fn get_revision(&self, id: &NoteId, revision: &RevisionId) -> RepoResult<Option<Note>>;
    /// Lists all revisions newest first; empty when the note is unknown.
    fn list_revisions(&self, id: &NoteId) -> RepoResult<Vec<Note>>;
}

/// SQLite-backed note revision repository.
pub struct SqliteNoteRepository<'conn> {
    conn: &'conn mut Connection,
}

impl<'conn> SqliteNoteRepository<'conn> {
    /// Constructs a repository from a migrated/ready connection.
    pub fn try_new(conn: &'conn mut Connection) -> RepoResult<Self> {
        ensure_connection_ready(conn)?;
        Ok(Self { conn })
    }
}

impl NoteRepository for SqliteNoteRepository<'_> {
    fn insert_note(&mut self, note: &Note) -> RepoResult<()> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        if read_note_state(&tx, &note.id)? != NoteState::Missing {
            return Err(RepoError::Conflict(note.id.clone()));
        }

        tx.execute(
            "INSERT INTO notes (id, current_revision) VALUES (?1, ?2);",
            params![note.id.as_str(), note.revision.as_str()],
        )?;
        insert_revision_row(&tx, note, 1)?;
        tx.commit()?;
        Ok(())
    }

    fn append_revision(&mut self, note: &Note) -> RepoResult<()> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        if !matches!(read_note_state(&tx, &note.id)?, NoteState::Live) {
            return Err(RepoError::NotFound(note.id.clone()));
        }

        let last_seq: i64 = tx.query_row(
            "SELECT COALESCE(MAX(seq), 0) FROM revisions WHERE note_id = ?1;",
            [note.id.as_str()],
            |row| row.get(0),
        )?;
        insert_revision_row(&tx, note, last_seq + 1)?;
        tx.execute(
            "UPDATE notes SET current_revision = ?2 WHERE id = ?1;",
            params![note.id.as_str(), note.revision.as_str()],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn mark_deleted(&mut self, id: &NoteId) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE notes
             SET current_revision = NULL
             WHERE id = ?1
               AND current_revision IS NOT NULL;",
            [id.as_str()],
        )?;

        if changed == 0 {
            return Err(RepoError::NotFound(id.clone()));
        }

        Ok(())
    }

    fn get_current(&self, id: &NoteId) -> RepoResult<Option<Note>> {
        let sql = format!(
            "{REVISION_SELECT_SQL}
             INNER JOIN notes n ON n.current_revision = r.revision
             WHERE n.id = ?1;"
        );
        let mut notes = query_notes(&*self.conn, &sql, params![id.as_str()])?;
        Ok(notes.pop())
    }

    fn get_revision(&self, id: &NoteId, revision: &RevisionId) -> RepoResult<Option<Note>> {
        let sql = format!(
            "{REVISION_SELECT_SQL}
             WHERE r.note_id = ?1
               AND r.revision = ?2;"
        );
        let mut notes = query_notes(&*self.conn, &sql, params![id.as_str(), revision.as_str()])?;
        Ok(notes.pop())
    }

    fn list_revisions(&self, id: &NoteId) -> RepoResult<Vec<Note>> {
        let sql = format!(
            "{REVISION_SELECT_SQL}
             WHERE r.note_id = ?1
             ORDER BY r.seq DESC;"
        );
        query_notes(&*self.conn, &sql, params![id.as_str()])
    }
}

fn insert_revision_row(tx: &Transaction<'_>, note: &Note, seq: i64) -> RepoResult<()> {
    let custom_metadata = serde_json::to_string(&note.metadata.custom_metadata)
        .map_err(|err| RepoError::InvalidData(format!("custom_metadata encode failed: {err}")))?;

    tx.execute(
        "INSERT INTO revisions (
            revision,
            note_id,
            seq,
            title,
            body,
            prev_id,
            next_id,
            custom_metadata,
            modified_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9);",
        params![
            note.revision.as_str(),
            note.id.as_str(),
            seq,
            note.title.as_deref(),
            note.body.as_str(),
            note.prev.as_ref().map(NoteId::as_str),
            note.next.as_ref().map(NoteId::as_str),
            custom_metadata,
            note.metadata.modified_at.timestamp_millis(),
        ],
    )?;

    for tag in &note.metadata.tags {
        tx.execute(
            "INSERT OR IGNORE INTO revision_tags (revision, tag) VALUES (?1, ?2);",
            params![note.revision.as_str(), tag.as_str()],
        )?;
    }

    Ok(())
}

fn query_notes(
    conn: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
) -> RepoResult<Vec<Note>> {
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query(params)?;
    let mut notes = Vec::new();
    while let Some(row) = rows.next()? {
        let mut note = parse_revision_row(row)?;
        note.metadata.tags = load_tags_for_revision(conn, &note.revision)?;
        notes.push(note);
    }
    Ok(notes)
}

fn parse_revision_row(row: &Row<'_>) -> RepoResult<Note> {
    let revision: String = row.get("revision")?;

    let custom_text: String = row.get("custom_metadata")?;
    let custom_metadata: Map<String, Value> = serde_json::from_str(&custom_text).map_err(|_| {
        RepoError::InvalidData(format!(
            "invalid custom_metadata for revision `{revision}` in revisions.custom_metadata"
        ))
    })?;

    let modified_ms: i64 = row.get("modified_at")?;
    let modified_at = DateTime::<Utc>::from_timestamp_millis(modified_ms).ok_or_else(|| {
        RepoError::InvalidData(format!(
            "invalid modified_at value `{modified_ms}` in revisions.modified_at"
        ))
    })?;

    Ok(Note {
        id: NoteId::new(row.get::<_, String>("note_id")?),
        revision: RevisionId::new(revision),
        title: row.get("title")?,
        body: row.get("body")?,
        prev: row.get::<_, Option<String>>("prev_id")?.map(NoteId::new),
        next: row.get::<_, Option<String>>("next_id")?.map(NoteId::new),
        metadata: NoteMetadata {
            tags: BTreeSet::new(),
            custom_metadata,
            modified_at,
        },
    })
}

fn load_tags_for_revision(conn: &Connection, revision: &RevisionId) -> RepoResult<BTreeSet<String>> {
    let mut stmt =
        conn.prepare("SELECT tag FROM revision_tags WHERE revision = ?1 ORDER BY tag ASC;")?;
    let mut rows = stmt.query([revision.as_str()])?;
    let mut tags = BTreeSet::new();
    while let Some(row) = rows.next()? {
        let value: String = row.get(0)?;
        tags.insert(value);
    }
    Ok(tags)
}

fn read_note_state(conn: &Connection, id: &NoteId) -> RepoResult<NoteState> {
    let row: Option<Option<String>> = conn
        .query_row(
            "SELECT current_revision FROM notes WHERE id = ?1;",
            [id.as_str()],
            |row| row.get(0),
        )
        .optional()?;

    Ok(match row {
        None => NoteState::Missing,
        Some(None) => NoteState::Deleted,
        Some(Some(_)) => NoteState::Live,
    })
}

fn ensure_connection_ready(conn: &Connection) -> RepoResult<()> {
    for table in ["notes", "revisions", "revision_tags"] {
        if !table_exists(conn, table)? {
            return Err(RepoError::MissingRequiredTable(table));
        }
    }
    Ok(())
}

fn table_exists(conn: &Connection, table: &str) -> RepoResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM sqlite_master
            WHERE type = 'table' AND name = ?1
        );",
        [table],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}
