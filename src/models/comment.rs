use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use utoipa::ToSchema;

/// Character range of the note a comment is anchored to.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, ToSchema)]
pub struct CommentSelection {
    pub start: u32,
    pub end: u32,
}

/// Payload of `comment:add`. Any client supplied `id` or `createdAt` is
/// ignored; the hub assigns both.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CommentInput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "noteId")]
    pub document_id: String,
    #[serde(rename = "userId")]
    pub author_id: String,
    #[serde(rename = "userName")]
    pub author_name: String,
    #[serde(rename = "content")]
    pub body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selection: Option<CommentSelection>,
}

/// A stored comment.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: String,
    #[serde(rename = "noteId")]
    pub document_id: String,
    #[serde(rename = "userId")]
    pub author_id: String,
    #[serde(rename = "userName")]
    pub author_name: String,
    #[serde(rename = "content")]
    pub body: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selection: Option<CommentSelection>,
}

/// Payload of `note:update`. Relayed as-is; the hub never looks at `content`
/// and keeps `updatedAt` and any extra fields exactly as the sender wrote them.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NoteUpdate {
    #[serde(rename = "noteId")]
    pub document_id: String,
    pub content: String,
    pub updated_at: Value,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}
