use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::{Comment, CommentInput, EventError, JoinPayload, NoteUpdate, Participant};

pub const USER_JOIN: &str = "user:join";
pub const NOTE_UPDATE: &str = "note:update";
pub const COMMENT_ADD: &str = "comment:add";
pub const COMMENT_DELETE: &str = "comment:delete";

/// Events a client may send. On the wire: `{"event": "<name>", "data": <payload>}`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "event", content = "data")]
pub enum ClientMessage {
    #[serde(rename = "user:join")]
    UserJoin(JoinPayload),
    #[serde(rename = "note:update")]
    NoteUpdate(NoteUpdate),
    #[serde(rename = "comment:add")]
    CommentAdd(CommentInput),
    #[serde(rename = "comment:delete")]
    CommentDelete(String),
}

/// Events the hub sends to clients, in the same envelope.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "event", content = "data")]
pub enum ServerMessage {
    #[serde(rename = "users:update")]
    UsersUpdate(Vec<Participant>),
    #[serde(rename = "note:update")]
    NoteUpdate(NoteUpdate),
    #[serde(rename = "comments:update")]
    CommentsUpdate(Vec<Comment>),
}

/// A decoded text frame: either a valid client event or the reason it was
/// rejected.
#[derive(Debug, PartialEq)]
pub enum InboundEvent {
    Message(ClientMessage),
    Rejected(EventError),
}

#[derive(Deserialize)]
struct Envelope {
    event: String,
    #[serde(default)]
    data: Value,
}

impl InboundEvent {
    pub fn parse(text: &str) -> Self {
        match ClientMessage::decode(text) {
            Ok(msg) => InboundEvent::Message(msg),
            Err(e) => InboundEvent::Rejected(e),
        }
    }
}

impl ClientMessage {
    /// Decode one text frame. The envelope is read first so an unknown event
    /// name and a bad payload for a known event are reported differently.
    pub fn decode(text: &str) -> Result<Self, EventError> {
        let envelope: Envelope = serde_json::from_str(text)
            .map_err(|e| EventError::InvalidEnvelope(e.to_string()))?;

        let event = envelope.event.as_str();
        let msg = match event {
            USER_JOIN => ClientMessage::UserJoin(payload(event, envelope.data)?),
            NOTE_UPDATE => {
                let update: NoteUpdate = payload(event, envelope.data)?;
                require_non_blank(event, "noteId", &update.document_id)?;
                if update.updated_at.is_null() {
                    return Err(EventError::malformed(event, "`updatedAt` must not be null"));
                }
                ClientMessage::NoteUpdate(update)
            }
            COMMENT_ADD => {
                let input: CommentInput = payload(event, envelope.data)?;
                require_non_blank(event, "noteId", &input.document_id)?;
                ClientMessage::CommentAdd(input)
            }
            COMMENT_DELETE => {
                let comment_id: String = payload(event, envelope.data)?;
                require_non_blank(event, "commentId", &comment_id)?;
                ClientMessage::CommentDelete(comment_id)
            }
            other => return Err(EventError::UnknownEvent(other.to_string())),
        };
        Ok(msg)
    }

    pub fn event_name(&self) -> &'static str {
        match self {
            ClientMessage::UserJoin(_) => USER_JOIN,
            ClientMessage::NoteUpdate(_) => NOTE_UPDATE,
            ClientMessage::CommentAdd(_) => COMMENT_ADD,
            ClientMessage::CommentDelete(_) => COMMENT_DELETE,
        }
    }
}

fn payload<T: serde::de::DeserializeOwned>(event: &str, data: Value) -> Result<T, EventError> {
    serde_json::from_value(data).map_err(|e| EventError::malformed(event, e))
}

fn require_non_blank(event: &str, field: &str, value: &str) -> Result<(), EventError> {
    if value.trim().is_empty() {
        return Err(EventError::malformed(event, format!("`{field}` must not be empty")));
    }
    Ok(())
}
