use crate::models::{JoinPayload, Participant};

/// Presence records, one per announced connection, kept in arrival order.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    participants: Vec<Participant>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert the participant for `connection_id`, replacing any earlier
    /// announcement on the same connection. Duplicate client ids are allowed.
    pub fn register_participant(&mut self, connection_id: &str, data: JoinPayload) -> Participant {
        let participant = Participant::new(connection_id, data);
        match self.position(connection_id) {
            Some(idx) => self.participants[idx] = participant.clone(),
            None => self.participants.push(participant.clone()),
        }
        participant
    }

    /// Remove the participant for `connection_id`. `None` when the connection
    /// never announced itself or was already removed.
    pub fn remove_participant(&mut self, connection_id: &str) -> Option<Participant> {
        let idx = self.position(connection_id)?;
        Some(self.participants.remove(idx))
    }

    pub fn list_participants(&self) -> Vec<Participant> {
        self.participants.clone()
    }

    pub fn len(&self) -> usize {
        self.participants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }

    fn position(&self, connection_id: &str) -> Option<usize> {
        self.participants
            .iter()
            .position(|p| p.connection_id == connection_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn join(id: &str, name: &str) -> JoinPayload {
        JoinPayload {
            id: id.to_string(),
            display_name: name.to_string(),
            color_tag: "#fff".to_string(),
            cursor: None,
        }
    }

    #[test]
    fn register_then_list() {
        let mut registry = ConnectionRegistry::new();
        registry.register_participant("c1", join("u1", "Al"));
        registry.register_participant("c2", join("u2", "Bo"));

        let ids: Vec<_> = registry
            .list_participants()
            .into_iter()
            .map(|p| p.connection_id)
            .collect();
        assert_eq!(ids, vec!["c1", "c2"]);
    }

    #[test]
    fn reannouncing_replaces_in_place() {
        let mut registry = ConnectionRegistry::new();
        registry.register_participant("c1", join("u1", "Al"));
        registry.register_participant("c2", join("u2", "Bo"));
        registry.register_participant("c1", join("u1", "Alice"));

        let list = registry.list_participants();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].display_name, "Alice");
        assert_eq!(list[1].display_name, "Bo");
    }

    #[test]
    fn same_client_id_on_two_connections_is_kept() {
        let mut registry = ConnectionRegistry::new();
        registry.register_participant("tab-1", join("u1", "Al"));
        registry.register_participant("tab-2", join("u1", "Al"));

        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn remove_is_idempotent() {
        let mut registry = ConnectionRegistry::new();
        registry.register_participant("c1", join("u1", "Al"));

        assert_eq!(registry.remove_participant("c1").map(|p| p.id), Some("u1".to_string()));
        assert!(registry.remove_participant("c1").is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn removing_one_leaves_others_untouched() {
        let mut registry = ConnectionRegistry::new();
        registry.register_participant("c1", join("u1", "Al"));
        registry.register_participant("c2", join("u2", "Bo"));
        registry.register_participant("c3", join("u3", "Cy"));
        let before = registry.list_participants();

        registry.remove_participant("c2");

        assert_eq!(registry.list_participants(), vec![before[0].clone(), before[2].clone()]);
    }
}
