use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Caret position reported by an editing client.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, ToSchema)]
pub struct CursorPosition {
    pub line: u32,
    pub ch: u32,
}

/// Payload of `user:join`: a participant as announced by the client, before
/// the hub attaches its connection id.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct JoinPayload {
    pub id: String,
    #[serde(rename = "name")]
    pub display_name: String,
    #[serde(rename = "color")]
    pub color_tag: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor: Option<CursorPosition>,
}

/// Presence record for one announced connection.
///
/// `id` is chosen by the client and is not unique across connections: two
/// tabs of the same user show up as two participants sharing an `id`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub id: String,
    #[serde(rename = "name")]
    pub display_name: String,
    #[serde(rename = "color")]
    pub color_tag: String,
    #[serde(rename = "socketId")]
    pub connection_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor: Option<CursorPosition>,
}

impl Participant {
    pub fn new(connection_id: &str, data: JoinPayload) -> Self {
        Self {
            id: data.id,
            display_name: data.display_name,
            color_tag: data.color_tag,
            connection_id: connection_id.to_string(),
            cursor: data.cursor,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn participant_uses_wire_field_names() {
        let join: JoinPayload =
            serde_json::from_value(json!({ "id": "u1", "name": "Al", "color": "#fff" })).unwrap();
        let participant = Participant::new("conn-1", join);

        assert_eq!(
            serde_json::to_value(&participant).unwrap(),
            json!({ "id": "u1", "name": "Al", "color": "#fff", "socketId": "conn-1" })
        );
    }

    #[test]
    fn cursor_is_carried_through() {
        let join: JoinPayload = serde_json::from_value(json!({
            "id": "u2", "name": "Bo", "color": "#000", "cursor": { "line": 3, "ch": 7 }
        }))
        .unwrap();
        let participant = Participant::new("conn-2", join);

        assert_eq!(participant.cursor, Some(CursorPosition { line: 3, ch: 7 }));
    }
}
