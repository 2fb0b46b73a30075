use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

/// Response for an error
#[derive(Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub code: u16,
    pub status: String,
    pub error: String,
}

/// Reason an inbound frame was rejected. Rejection only drops the frame; the
/// connection stays open.
#[derive(Debug, Error, PartialEq)]
pub enum EventError {
    #[error("frame is not a JSON event envelope: {0}")]
    InvalidEnvelope(String),

    #[error("unknown event '{0}'")]
    UnknownEvent(String),

    #[error("malformed '{event}' payload: {reason}")]
    MalformedPayload { event: String, reason: String },
}

impl EventError {
    pub(crate) fn malformed(event: &str, reason: impl ToString) -> Self {
        EventError::MalformedPayload {
            event: event.to_string(),
            reason: reason.to_string(),
        }
    }
}
