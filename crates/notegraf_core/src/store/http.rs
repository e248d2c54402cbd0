//! HTTP Note Store client for the Notegraf web API.
//!
//! # Responsibility
//! - Map store operations onto `/api/v1/note` endpoints.
//! - Translate HTTP status codes into `StoreError` kinds.
//!
//! # Invariants
//! - HTTP 404 is always `NotFound`; any other non-success status is
//!   `Transport` carrying the status line.
//! - Request timeouts surface as `Transport` failures.

use crate::model::note::{Note, NoteDraft, NoteId, NoteLocator, RevisionId};
use crate::store::{NoteStore, NoteWriter, StoreError, StoreResult};
use async_trait::async_trait;
use log::{debug, warn};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::{Duration, Instant};

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8000";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
const BASE_URL_ENV: &str = "NOTEGRAF_BASE_URL";
const TIMEOUT_ENV: &str = "NOTEGRAF_HTTP_TIMEOUT_SECS";

/// Connection settings for [`HttpNoteStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpStoreConfig {
    pub base_url: String,
    pub timeout: Duration,
}

impl Default for HttpStoreConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

impl HttpStoreConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    /// Reads `NOTEGRAF_BASE_URL` and `NOTEGRAF_HTTP_TIMEOUT_SECS`, falling
    /// back to defaults for unset or unparsable values.
    pub fn from_env() -> Self {
        let base_url =
            std::env::var(BASE_URL_ENV).unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        let timeout_secs = std::env::var(TIMEOUT_ENV)
            .ok()
            .and_then(|value| value.trim().parse::<u64>().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);
        Self {
            base_url,
            timeout: Duration::from_secs(timeout_secs),
        }
    }
}

/// Form payload accepted by the create and update endpoints.
#[derive(Debug, Serialize)]
struct NoteForm {
    title: String,
    note_inner: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    prev: Option<NoteId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    next: Option<NoteId>,
    metadata_tags: String,
    metadata_custom_metadata: String,
}

impl NoteForm {
    fn from_draft(draft: NoteDraft) -> StoreResult<Self> {
        let custom = serde_json::to_string(&draft.custom_metadata)
            .map_err(|err| StoreError::InvalidData(format!("custom_metadata encode failed: {err}")))?;
        Ok(Self {
            title: draft.title.unwrap_or_default(),
            note_inner: draft.body,
            prev: draft.prev,
            next: draft.next,
            metadata_tags: draft.tags.into_iter().collect::<Vec<_>>().join(", "),
            metadata_custom_metadata: custom,
        })
    }
}

/// Note Store talking to a remote Notegraf server.
#[derive(Debug, Clone)]
pub struct HttpNoteStore {
    client: Client,
    base_url: String,
}

impl HttpNoteStore {
    pub fn new(config: HttpStoreConfig) -> StoreResult<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|err| StoreError::Transport(format!("failed to build http client: {err}")))?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn note_url(&self, id: &NoteId) -> String {
        format!("{}/api/v1/note/{}", self.base_url, id)
    }

    fn revisions_url(&self, id: &NoteId) -> String {
        format!("{}/revision", self.note_url(id))
    }

    fn revision_url(&self, id: &NoteId, revision: &RevisionId) -> String {
        format!("{}/revision/{}", self.note_url(id), revision)
    }

    async fn send(&self, request: RequestBuilder, id: Option<&NoteId>) -> StoreResult<Response> {
        let started_at = Instant::now();
        let response = request.send().await.map_err(|err| {
            warn!(
                "event=http_request module=store.http status=error duration_ms={} error={}",
                started_at.elapsed().as_millis(),
                err
            );
            StoreError::Transport(err.to_string())
        })?;

        let status = response.status();
        debug!(
            "event=http_request module=store.http status=ok http_status={} duration_ms={}",
            status.as_u16(),
            started_at.elapsed().as_millis()
        );
        if status == StatusCode::NOT_FOUND {
            if let Some(id) = id {
                return Err(StoreError::NotFound(id.clone()));
            }
        }
        if !status.is_success() {
            return Err(StoreError::Transport(format!("server returned {status}")));
        }
        Ok(response)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: String, id: &NoteId) -> StoreResult<T> {
        let response = self.send(self.client.get(url), Some(id)).await?;
        response
            .json::<T>()
            .await
            .map_err(|err| StoreError::InvalidData(err.to_string()))
    }

    async fn post_form(
        &self,
        url: String,
        id: Option<&NoteId>,
        draft: NoteDraft,
    ) -> StoreResult<NoteLocator> {
        let form = NoteForm::from_draft(draft)?;
        let response = self.send(self.client.post(url).json(&form), id).await?;
        response
            .json::<NoteLocator>()
            .await
            .map_err(|err| StoreError::InvalidData(err.to_string()))
    }
}

#[async_trait]
impl NoteStore for HttpNoteStore {
    async fn fetch_note(&self, id: &NoteId) -> StoreResult<Note> {
        self.get_json(self.note_url(id), id).await
    }

    async fn fetch_revision(&self, id: &NoteId, revision: &RevisionId) -> StoreResult<Note> {
        match self.get_json(self.revision_url(id, revision), id).await {
            Err(StoreError::NotFound(id)) => Err(StoreError::RevisionNotFound {
                id,
                revision: revision.clone(),
            }),
            other => other,
        }
    }

    async fn fetch_revisions(&self, anchor: &NoteId) -> StoreResult<Vec<Note>> {
        self.get_json(self.revisions_url(anchor), anchor).await
    }
}

#[async_trait]
impl NoteWriter for HttpNoteStore {
    async fn create_note(&self, draft: NoteDraft) -> StoreResult<NoteLocator> {
        draft.validate(None)?;
        let url = format!("{}/api/v1/note", self.base_url);
        self.post_form(url, None, draft).await
    }

    async fn update_note(&self, id: &NoteId, draft: NoteDraft) -> StoreResult<NoteLocator> {
        draft.validate(Some(id))?;
        self.post_form(self.revisions_url(id), Some(id), draft).await
    }

    async fn delete_note(&self, id: &NoteId) -> StoreResult<()> {
        self.send(self.client.delete(self.note_url(id)), Some(id))
            .await?;
        Ok(())
    }
}
