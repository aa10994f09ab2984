use serde::Deserialize;
use time::OffsetDateTime;

use crate::api::ApiClient;
use crate::error::ApiError;

/// Full note as returned by the detail endpoints. `content` is an opaque
/// rich-text markup string owned by the editor, never interpreted here.
#[derive(Debug, Clone, Deserialize)]
pub struct Note {
    pub id: i64,
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// List row. The list serializer omits `created_at`; extra backend fields
/// (slug, tags, parent) are ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct NoteSummary {
    pub id: i64,
    pub title: String,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// `GET /notes/` may answer with a bare array or a DRF pagination envelope.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum NoteListing {
    Paginated { results: Vec<NoteSummary> },
    Plain(Vec<NoteSummary>),
}

impl NoteListing {
    fn into_notes(self) -> Vec<NoteSummary> {
        match self {
            NoteListing::Paginated { results } => results,
            NoteListing::Plain(notes) => notes,
        }
    }
}

/// CRUD orchestration against the notes endpoints.
#[derive(Clone)]
pub struct NotesApi {
    client: ApiClient,
}

impl NotesApi {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &ApiClient {
        &self.client
    }

    /// Most recently updated first.
    pub async fn list(&self) -> Result<Vec<NoteSummary>, ApiError> {
        let listing: NoteListing = self.client.get("notes/").await?;
        let mut notes = listing.into_notes();
        notes.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(notes)
    }

    pub async fn get(&self, id: i64) -> Result<Note, ApiError> {
        self.client.get(&format!("notes/{id}/")).await
    }

    pub async fn create(&self, title: &str, content: &str) -> Result<Note, ApiError> {
        self.client
            .post(
                "notes/",
                serde_json::json!({ "title": title, "content": content }),
            )
            .await
    }

    pub async fn update(&self, id: i64, title: &str, content: &str) -> Result<Note, ApiError> {
        self.client
            .put(
                &format!("notes/{id}/"),
                serde_json::json!({ "title": title, "content": content }),
            )
            .await
    }

    /// Renames by resending the current content under the new title, the same
    /// shape the editor uses for saves.
    pub async fn rename(&self, id: i64, new_title: &str) -> Result<Note, ApiError> {
        let existing = self.get(id).await?;
        self.update(id, new_title, &existing.content).await
    }

    pub async fn delete(&self, id: i64) -> Result<(), ApiError> {
        self.client.delete(&format!("notes/{id}/")).await
    }
}
