//! Note write use-case service.
//!
//! # Responsibility
//! - Provide create/update/delete/link APIs over any `NoteWriter`.
//! - Normalize tags before they reach storage.
//! - Derive markdown preview projections (`preview_text`, `preview_image`).
//!
//! # Invariants
//! - Updates use full content replacement semantics.
//! - Tag names are trimmed, lowercased and deduplicated; blank tags are rejected.
//! - Every successful write returns the stored snapshot read back from the store.

use crate::model::note::{Note, NoteDraft, NoteId, NoteLocator};
use crate::store::{NoteWriter, StoreError};
use log::{info, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

static MARKDOWN_IMAGE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"!\[[^\]]*]\(([^)]+)\)").expect("valid image regex"));
static MARKDOWN_LINK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[([^\]]+)\]\(([^)]+)\)").expect("valid link regex"));
static MARKDOWN_SYMBOL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"[\*_`#>~\-\[\]\(\)!]+"#).expect("valid markdown symbol regex"));
static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid ws regex"));

const PREVIEW_CHARS: usize = 100;

/// Service error for note write use-cases.
#[derive(Debug)]
pub enum NoteServiceError {
    /// Tag input contains empty values.
    InvalidTag(String),
    /// Target note does not exist.
    NoteNotFound(NoteId),
    /// `link_notes` was asked to link a note to itself.
    SelfLink(NoteId),
    /// Store-layer failure.
    Store(StoreError),
    /// Read-back returned a different revision than the write reported.
    InconsistentState(&'static str),
    /// A link write failed and some earlier writes could not be reverted.
    PartialLink {
        unreverted: Vec<NoteId>,
        cause: Box<NoteServiceError>,
    },
}

impl Display for NoteServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidTag(value) => write!(f, "invalid tag: `{value}`"),
            Self::NoteNotFound(id) => write!(f, "note not found: {id}"),
            Self::SelfLink(id) => write!(f, "cannot link note {id} to itself"),
            Self::Store(err) => write!(f, "{err}"),
            Self::InconsistentState(details) => write!(f, "inconsistent note state: {details}"),
            Self::PartialLink { unreverted, cause } => {
                let ids: Vec<&str> = unreverted.iter().map(NoteId::as_str).collect();
                write!(
                    f,
                    "link partially applied, could not revert [{}]: {cause}",
                    ids.join(", ")
                )
            }
        }
    }
}

impl Error for NoteServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Store(err) => Some(err),
            Self::PartialLink { cause, .. } => Some(cause.as_ref()),
            _ => None,
        }
    }
}

impl From<StoreError> for NoteServiceError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::NotFound(id) => Self::NoteNotFound(id),
            other => Self::Store(other),
        }
    }
}

/// Markdown-derived preview projection for notes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkdownPreview {
    /// Sanitized summary text.
    pub preview_text: Option<String>,
    /// First markdown image path.
    pub preview_image: Option<String>,
}

/// Both sides of a `link_notes` call after the write.
#[derive(Debug, Clone, PartialEq)]
pub struct LinkedPair {
    pub prev: Note,
    pub next: Note,
}

/// Note service facade over a writable store.
pub struct NoteService<W: NoteWriter + ?Sized> {
    store: Arc<W>,
}

impl<W: NoteWriter + ?Sized> NoteService<W> {
    pub fn new(store: Arc<W>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<W> {
        &self.store
    }

    /// Creates one note and returns its first stored revision.
    pub async fn create_note(&self, draft: NoteDraft) -> Result<Note, NoteServiceError> {
        let draft = normalize_draft(draft)?;
        let locator = self.store.create_note(draft).await?;
        let note = self.read_back(&locator, "created note missing in read-back").await?;
        info!(
            "event=note_create module=service.note status=ok note_id={} revision={}",
            note.id, note.revision
        );
        Ok(note)
    }

    /// Replaces note content fully by appending a new revision.
    pub async fn update_note(&self, id: &NoteId, draft: NoteDraft) -> Result<Note, NoteServiceError> {
        let draft = normalize_draft(draft)?;
        let locator = self.store.update_note(id, draft).await?;
        let note = self.read_back(&locator, "updated note missing in read-back").await?;
        info!(
            "event=note_update module=service.note status=ok note_id={} revision={}",
            note.id, note.revision
        );
        Ok(note)
    }

    pub async fn delete_note(&self, id: &NoteId) -> Result<(), NoteServiceError> {
        self.store.delete_note(id).await?;
        info!("event=note_delete module=service.note status=ok note_id={id}");
        Ok(())
    }

    /// Points `prev.next` at `next` and `next.prev` at `prev`.
    ///
    /// Former neighbours still pointing back at either side are detached in
    /// the same operation. Each touched note gets one new revision; when a
    /// later write fails, earlier ones are reverted by re-writing their
    /// previous content.
    pub async fn link_notes(&self, prev: &NoteId, next: &NoteId) -> Result<LinkedPair, NoteServiceError> {
        if prev == next {
            return Err(NoteServiceError::SelfLink(prev.clone()));
        }
        let prev_note = self.store.fetch_note(prev).await?;
        let next_note = self.store.fetch_note(next).await?;
        let mut plan = LinkPlan::default();

        if let Some(old_next) = prev_note.next.as_ref().filter(|id| *id != next) {
            if let Some(note) = self.fetch_neighbour(old_next).await? {
                if note.prev.as_ref() == Some(prev) {
                    plan.stage(note).prev = None;
                }
            }
        }
        if let Some(old_prev) = next_note.prev.as_ref().filter(|id| *id != prev) {
            if let Some(note) = self.fetch_neighbour(old_prev).await? {
                if note.next.as_ref() == Some(next) {
                    plan.stage(note).next = None;
                }
            }
        }
        plan.stage(prev_note).next = Some(next.clone());
        plan.stage(next_note).prev = Some(prev.clone());

        let written = self.apply_plan(plan).await?;
        let find = |id: &NoteId| written.iter().find(|note| &note.id == id).cloned();
        let (Some(prev), Some(next)) = (find(prev), find(next)) else {
            return Err(NoteServiceError::InconsistentState(
                "linked note missing after write",
            ));
        };
        info!(
            "event=note_link module=service.note status=ok prev_id={} next_id={} writes={}",
            prev.id,
            next.id,
            written.len()
        );
        Ok(LinkedPair { prev, next })
    }

    /// Current snapshot of a linked note; `None` for dangling links.
    async fn fetch_neighbour(&self, id: &NoteId) -> Result<Option<Note>, NoteServiceError> {
        match self.store.fetch_note(id).await {
            Ok(note) => Ok(Some(note)),
            Err(StoreError::NotFound(_)) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    async fn apply_plan(&self, plan: LinkPlan) -> Result<Vec<Note>, NoteServiceError> {
        let mut written = Vec::with_capacity(plan.steps.len());
        let mut originals = Vec::with_capacity(plan.steps.len());
        for (original, draft) in plan.steps {
            match self.update_note(&original.id, draft).await {
                Ok(note) => {
                    written.push(note);
                    originals.push(original);
                }
                Err(err) => {
                    warn!(
                        "event=note_link module=service.note status=error note_id={} applied={} error={err}",
                        original.id,
                        originals.len()
                    );
                    return Err(self.revert(originals, err).await);
                }
            }
        }
        Ok(written)
    }

    async fn revert(&self, originals: Vec<Note>, cause: NoteServiceError) -> NoteServiceError {
        let mut unreverted = Vec::new();
        for original in originals.iter().rev() {
            let restore = NoteDraft::from_note(original);
            if let Err(err) = self.store.update_note(&original.id, restore).await {
                warn!(
                    "event=note_link_revert module=service.note status=error note_id={} error={err}",
                    original.id
                );
                unreverted.push(original.id.clone());
            }
        }
        if unreverted.is_empty() {
            cause
        } else {
            NoteServiceError::PartialLink {
                unreverted,
                cause: Box::new(cause),
            }
        }
    }

    async fn read_back(
        &self,
        locator: &NoteLocator,
        details: &'static str,
    ) -> Result<Note, NoteServiceError> {
        let note = match locator {
            NoteLocator::Specific(id, revision) => self.store.fetch_revision(id, revision).await?,
            NoteLocator::Current(id) => self.store.fetch_note(id).await?,
        };
        if &note.id != locator.id() {
            return Err(NoteServiceError::InconsistentState(details));
        }
        Ok(note)
    }
}

/// Pending writes of one `link_notes` call, one entry per touched note.
#[derive(Default)]
struct LinkPlan {
    steps: Vec<(Note, NoteDraft)>,
}

impl LinkPlan {
    fn stage(&mut self, note: Note) -> &mut NoteDraft {
        let index = match self.steps.iter().position(|(staged, _)| staged.id == note.id) {
            Some(index) => index,
            None => {
                let draft = NoteDraft::from_note(&note);
                self.steps.push((note, draft));
                self.steps.len() - 1
            }
        };
        &mut self.steps[index].1
    }
}

fn normalize_draft(mut draft: NoteDraft) -> Result<NoteDraft, NoteServiceError> {
    for tag in &draft.tags {
        if tag.trim().is_empty() {
            return Err(NoteServiceError::InvalidTag(tag.clone()));
        }
    }
    draft.tags = normalize_tags(draft.tags.iter());
    Ok(draft)
}

/// Normalizes one tag; `None` for blank input.
pub fn normalize_tag(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_lowercase())
    }
}

/// Normalizes and deduplicates tags, dropping blank entries.
pub fn normalize_tags<I, T>(values: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = T>,
    T: AsRef<str>,
{
    values
        .into_iter()
        .filter_map(|value| normalize_tag(value.as_ref()))
        .collect()
}

/// Splits a comma-separated tag list as accepted by the web form.
pub fn parse_tag_list(raw: &str) -> BTreeSet<String> {
    normalize_tags(raw.split(','))
}

/// Derives note preview fields from markdown content.
///
/// Rules:
/// - `preview_image`: first markdown image path matched by regex.
/// - `preview_text`: markdown symbols removed, whitespace normalized, first
///   100 chars retained.
pub fn derive_markdown_preview(content: &str) -> MarkdownPreview {
    let preview_image = MARKDOWN_IMAGE_RE
        .captures(content)
        .and_then(|caps| caps.get(1).map(|m| m.as_str().trim().to_string()))
        .filter(|value| !value.is_empty());

    let without_images = MARKDOWN_IMAGE_RE.replace_all(content, " ");
    let without_links = MARKDOWN_LINK_RE.replace_all(&without_images, "$1");
    let without_symbols = MARKDOWN_SYMBOL_RE.replace_all(&without_links, " ");
    let normalized = WHITESPACE_RE.replace_all(&without_symbols, " ");
    let trimmed = normalized.trim();
    let preview_text = if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.chars().take(PREVIEW_CHARS).collect())
    };

    MarkdownPreview {
        preview_text,
        preview_image,
    }
}
