//! Note snapshot model.
//!
//! # Responsibility
//! - Define the immutable note snapshot returned by every store.
//! - Define typed identifiers for notes and their revisions.
//! - Define the editable draft shape consumed by write paths.
//!
//! # Invariants
//! - `id` is shared by every revision of one logical note.
//! - `prev`/`next` reference note ids, never a specific revision.
//! - A `Note` is never mutated after a fetch; newer data arrives as a new value.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::fmt::{self, Display};
use thiserror::Error;

/// Stable identifier of a logical note.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NoteId(String);

impl NoteId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for NoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for NoteId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for NoteId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl From<String> for NoteId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Identifier of one stored snapshot of a note.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RevisionId(String);

impl RevisionId {
    pub fn new(revision: impl Into<String>) -> Self {
        Self(revision.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for RevisionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for RevisionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for RevisionId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl From<String> for RevisionId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Points at either the current revision of a note or one specific revision.
///
/// Serialized in externally tagged form, e.g. `{"Specific": ["id", "rev"]}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NoteLocator {
    Current(NoteId),
    Specific(NoteId, RevisionId),
}

impl NoteLocator {
    pub fn id(&self) -> &NoteId {
        match self {
            Self::Current(id) | Self::Specific(id, _) => id,
        }
    }

    /// Returns `None` for `Current` locators.
    pub fn revision(&self) -> Option<&RevisionId> {
        match self {
            Self::Current(_) => None,
            Self::Specific(_, revision) => Some(revision),
        }
    }
}

/// Descriptive metadata attached to every revision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoteMetadata {
    #[serde(default)]
    pub tags: BTreeSet<String>,
    /// Opaque user mapping; `null` on the wire reads as empty.
    #[serde(default, deserialize_with = "null_as_empty_map")]
    pub custom_metadata: Map<String, Value>,
    pub modified_at: DateTime<Utc>,
}

impl NoteMetadata {
    pub fn new(modified_at: DateTime<Utc>) -> Self {
        Self {
            tags: BTreeSet::new(),
            custom_metadata: Map::new(),
            modified_at,
        }
    }
}

/// One retrieved snapshot of a note revision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub id: NoteId,
    pub revision: RevisionId,
    #[serde(default)]
    pub title: Option<String>,
    /// Markdown source; named `note_inner` by the web API.
    #[serde(rename = "note_inner", alias = "body")]
    pub body: String,
    #[serde(default)]
    pub prev: Option<NoteId>,
    #[serde(default)]
    pub next: Option<NoteId>,
    pub metadata: NoteMetadata,
}

impl Note {
    /// Returns the title, treating an empty or blank title as absent.
    pub fn display_title(&self) -> Option<&str> {
        self.title
            .as_deref()
            .map(str::trim)
            .filter(|title| !title.is_empty())
    }

    /// Locator pinned to this exact snapshot.
    pub fn locator(&self) -> NoteLocator {
        NoteLocator::Specific(self.id.clone(), self.revision.clone())
    }
}

/// Validation failures for note drafts.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NoteValidationError {
    #[error("`{field}` link must not be blank")]
    BlankLink { field: &'static str },
    #[error("note `{id}` cannot link to itself through `{field}`")]
    SelfLink { id: NoteId, field: &'static str },
}

/// Editable content of a note, used to create a note or a new revision.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NoteDraft {
    pub title: Option<String>,
    pub body: String,
    pub prev: Option<NoteId>,
    pub next: Option<NoteId>,
    pub tags: BTreeSet<String>,
    pub custom_metadata: Map<String, Value>,
}

impl NoteDraft {
    pub fn new(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            ..Self::default()
        }
    }

    /// Pre-fills a draft from an existing snapshot, e.g. for editing.
    pub fn from_note(note: &Note) -> Self {
        Self {
            title: note.title.clone(),
            body: note.body.clone(),
            prev: note.prev.clone(),
            next: note.next.clone(),
            tags: note.metadata.tags.clone(),
            custom_metadata: note.metadata.custom_metadata.clone(),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_prev(mut self, prev: impl Into<NoteId>) -> Self {
        self.prev = Some(prev.into());
        self
    }

    pub fn with_next(mut self, next: impl Into<NoteId>) -> Self {
        self.next = Some(next.into());
        self
    }

    pub fn with_tags<I, T>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// Checks link fields.
    ///
    /// `own_id` is `None` for notes that do not exist yet, in which case only
    /// blank links are rejected.
    pub fn validate(&self, own_id: Option<&NoteId>) -> Result<(), NoteValidationError> {
        for (field, link) in [("prev", &self.prev), ("next", &self.next)] {
            let Some(link) = link else {
                continue;
            };
            if link.as_str().trim().is_empty() {
                return Err(NoteValidationError::BlankLink { field });
            }
            if own_id == Some(link) {
                return Err(NoteValidationError::SelfLink {
                    id: link.clone(),
                    field,
                });
            }
        }
        Ok(())
    }

    /// Materializes the draft as a snapshot with the given identity.
    pub fn into_note(self, id: NoteId, revision: RevisionId, modified_at: DateTime<Utc>) -> Note {
        Note {
            id,
            revision,
            title: self.title,
            body: self.body,
            prev: self.prev,
            next: self.next,
            metadata: NoteMetadata {
                tags: self.tags,
                custom_metadata: self.custom_metadata,
                modified_at,
            },
        }
    }
}

fn null_as_empty_map<'de, D>(deserializer: D) -> Result<Map<String, Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Map<String, Value>>::deserialize(deserializer)?.unwrap_or_default())
}
