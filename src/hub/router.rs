use std::collections::HashMap;

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::hub::comment_store::CommentStore;
use crate::hub::registry::ConnectionRegistry;
use crate::models::{ClientMessage, Comment, CommentInput, InboundEvent, JoinPayload, NoteUpdate, Participant, ServerMessage};

/// Hub side of one connection: the queue of pre-serialised JSON frames, plus a
/// token whose drop tells the socket that the hub has let go of it.
#[derive(Debug)]
pub struct Outbox {
    frames: mpsc::Sender<String>,
    _attached: oneshot::Sender<()>,
}

/// Socket side of one connection.
#[derive(Debug)]
pub struct Mailbox {
    pub frames: mpsc::Receiver<String>,
    /// Resolves once the hub has dropped the connection, whatever the reason.
    pub detached: oneshot::Receiver<()>,
}

impl Outbox {
    pub fn channel(capacity: usize) -> (Outbox, Mailbox) {
        let (frames, frames_rx) = mpsc::channel(capacity);
        let (attached, detached) = oneshot::channel();
        (
            Outbox { frames, _attached: attached },
            Mailbox { frames: frames_rx, detached },
        )
    }
}

/// Counters exposed through the diagnostics endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct HubStats {
    pub connections: usize,
    pub participants: usize,
    pub documents: usize,
    pub comments: usize,
}

/// Owns all shared hub state and decides who receives what.
///
/// Every method runs to completion without awaiting, so the caller decides how
/// access is serialised (the hub task in [`crate::hub`]). Sends never block: a
/// connection whose queue is closed or full is dropped and handled like a
/// disconnect.
#[derive(Debug, Default)]
pub struct EventRouter {
    registry: ConnectionRegistry,
    comments: CommentStore,
    connections: HashMap<String, Outbox>,
}

impl EventRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a new connection. It receives broadcasts from now on but is not
    /// listed as a participant until it sends `user:join`.
    pub fn connect(&mut self, connection_id: String, outbox: Outbox) {
        debug!("Connection {} attached to hub", connection_id);
        self.connections.insert(connection_id, outbox);
    }

    pub fn handle_event(&mut self, connection_id: &str, event: InboundEvent) {
        if !self.connections.contains_key(connection_id) {
            debug!("Dropping event from detached connection {}", connection_id);
            return;
        }

        let msg = match event {
            InboundEvent::Message(msg) => msg,
            InboundEvent::Rejected(e) => {
                warn!("Rejected event from {}: {}", connection_id, e);
                return;
            }
        };

        debug!("{} from {}", msg.event_name(), connection_id);
        match msg {
            ClientMessage::UserJoin(data) => self.on_join(connection_id, data),
            ClientMessage::NoteUpdate(update) => self.on_note_update(connection_id, update),
            ClientMessage::CommentAdd(input) => self.on_comment_add(input),
            ClientMessage::CommentDelete(comment_id) => self.on_comment_delete(&comment_id),
        }
    }

    /// Run the disconnect path. Returns `false` when the connection was already
    /// gone, in which case nothing is broadcast.
    pub fn disconnect(&mut self, connection_id: &str) -> bool {
        if self.connections.remove(connection_id).is_none() {
            return false;
        }
        if let Some(p) = self.registry.remove_participant(connection_id) {
            info!("Participant {} ({}) left", p.display_name, connection_id);
        }
        self.broadcast_participants();
        true
    }

    pub fn participants(&self) -> Vec<Participant> {
        self.registry.list_participants()
    }

    pub fn comments_for(&self, document_id: &str) -> &[Comment] {
        self.comments.comments_for(document_id)
    }

    pub fn stats(&self) -> HubStats {
        HubStats {
            connections: self.connections.len(),
            participants: self.registry.len(),
            documents: self.comments.document_count(),
            comments: self.comments.comment_count(),
        }
    }

    fn on_join(&mut self, connection_id: &str, data: JoinPayload) {
        let participant = self.registry.register_participant(connection_id, data);
        info!("Participant {} ({}) joined as {}", participant.display_name, participant.id, connection_id);
        self.broadcast_participants();
    }

    fn on_note_update(&mut self, connection_id: &str, update: NoteUpdate) {
        self.broadcast(&ServerMessage::NoteUpdate(update), Some(connection_id));
    }

    fn on_comment_add(&mut self, input: CommentInput) {
        let comment = self.comments.add_comment(input);
        let log = self.comments.comments_for(&comment.document_id).to_vec();
        self.broadcast(&ServerMessage::CommentsUpdate(log), None);
    }

    fn on_comment_delete(&mut self, comment_id: &str) {
        match self.comments.delete_comment(comment_id) {
            Some(log) => self.broadcast(&ServerMessage::CommentsUpdate(log), None),
            None => debug!("Delete of unknown comment {} ignored", comment_id),
        }
    }

    fn broadcast_participants(&mut self) {
        let msg = ServerMessage::UsersUpdate(self.registry.list_participants());
        self.broadcast(&msg, None);
    }

    fn broadcast(&mut self, msg: &ServerMessage, except: Option<&str>) {
        let failed = self.fan_out(msg, except);
        self.reap(failed);
    }

    /// Queue `msg` on every connection except `except`. Returns the ids whose
    /// queue rejected the frame.
    fn fan_out(&self, msg: &ServerMessage, except: Option<&str>) -> Vec<String> {
        let text = match serde_json::to_string(msg) {
            Ok(text) => text,
            Err(e) => {
                warn!("Failed to serialise outbound message: {}", e);
                return Vec::new();
            }
        };

        let mut failed = Vec::new();
        for (connection_id, outbox) in &self.connections {
            if except == Some(connection_id.as_str()) {
                continue;
            }
            match outbox.frames.try_send(text.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    warn!("Outbound queue full for {}, dropping connection", connection_id);
                    failed.push(connection_id.clone());
                }
                Err(TrySendError::Closed(_)) => {
                    warn!("Connection {} closed while sending", connection_id);
                    failed.push(connection_id.clone());
                }
            }
        }
        failed
    }

    /// Disconnect every failed connection. Each removal broadcasts a new
    /// participant list, which may itself fail on further connections.
    fn reap(&mut self, mut failed: Vec<String>) {
        while let Some(connection_id) = failed.pop() {
            if self.connections.remove(&connection_id).is_none() {
                continue;
            }
            self.registry.remove_participant(&connection_id);
            let msg = ServerMessage::UsersUpdate(self.registry.list_participants());
            failed.extend(self.fan_out(&msg, None));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EventError;
    use proptest::prelude::*;
    use serde_json::{json, Map};
    use std::collections::HashSet;
    use tokio::sync::oneshot::error::TryRecvError;

    fn attach(router: &mut EventRouter, connection_id: &str) -> Mailbox {
        let (outbox, mailbox) = Outbox::channel(16);
        router.connect(connection_id.to_string(), outbox);
        mailbox
    }

    fn drain(mailbox: &mut Mailbox) -> Vec<ServerMessage> {
        let mut out = Vec::new();
        while let Ok(text) = mailbox.frames.try_recv() {
            out.push(serde_json::from_str(&text).unwrap());
        }
        out
    }

    fn join(id: &str, name: &str) -> InboundEvent {
        InboundEvent::Message(ClientMessage::UserJoin(JoinPayload {
            id: id.to_string(),
            display_name: name.to_string(),
            color_tag: "#fff".to_string(),
            cursor: None,
        }))
    }

    fn add(note: &str, body: &str) -> InboundEvent {
        InboundEvent::Message(ClientMessage::CommentAdd(CommentInput {
            id: None,
            document_id: note.to_string(),
            author_id: "u1".to_string(),
            author_name: "Al".to_string(),
            body: body.to_string(),
            selection: None,
        }))
    }

    fn connection_ids(msg: &ServerMessage) -> Vec<String> {
        match msg {
            ServerMessage::UsersUpdate(list) => list.iter().map(|p| p.connection_id.clone()).collect(),
            other => panic!("expected users:update, got {other:?}"),
        }
    }

    #[test]
    fn join_broadcasts_full_list_to_everyone() {
        let mut router = EventRouter::new();
        let mut a = attach(&mut router, "a");
        let mut b = attach(&mut router, "b");

        router.handle_event("a", join("u1", "Al"));

        for rx in [&mut a, &mut b] {
            let msgs = drain(rx);
            assert_eq!(msgs.len(), 1);
            assert_eq!(connection_ids(&msgs[0]), vec!["a"]);
        }
    }

    #[test]
    fn unannounced_connection_is_not_listed() {
        let mut router = EventRouter::new();
        let _a = attach(&mut router, "a");
        let _b = attach(&mut router, "b");
        router.handle_event("b", join("u2", "Bo"));

        let ids: Vec<_> = router.participants().into_iter().map(|p| p.connection_id).collect();
        assert_eq!(ids, vec!["b"]);
        assert_eq!(router.stats().connections, 2);
    }

    #[test]
    fn note_update_skips_sender() {
        let mut router = EventRouter::new();
        let mut a = attach(&mut router, "a");
        let mut b = attach(&mut router, "b");
        let mut c = attach(&mut router, "c");
        let mut extra = Map::new();
        extra.insert("title".to_string(), json!("Groceries"));
        let update = NoteUpdate {
            document_id: "n1".to_string(),
            content: "draft".to_string(),
            updated_at: json!(1714557600000u64),
            extra,
        };

        router.handle_event("a", InboundEvent::Message(ClientMessage::NoteUpdate(update.clone())));

        assert!(drain(&mut a).is_empty());
        assert_eq!(drain(&mut b), vec![ServerMessage::NoteUpdate(update.clone())]);
        assert_eq!(drain(&mut c), vec![ServerMessage::NoteUpdate(update)]);
    }

    #[test]
    fn events_before_join_are_still_routed() {
        let mut router = EventRouter::new();
        let mut a = attach(&mut router, "a");
        let mut b = attach(&mut router, "b");

        router.handle_event("a", add("n1", "hi"));

        assert_eq!(drain(&mut a).len(), 1);
        assert_eq!(drain(&mut b).len(), 1);
        assert!(router.participants().is_empty());
    }

    #[test]
    fn comment_add_broadcasts_whole_document_log() {
        let mut router = EventRouter::new();
        let mut a = attach(&mut router, "a");

        router.handle_event("a", add("n1", "first"));
        router.handle_event("a", add("n2", "elsewhere"));
        router.handle_event("a", add("n1", "second"));

        let msgs = drain(&mut a);
        match msgs.last() {
            Some(ServerMessage::CommentsUpdate(log)) => {
                let bodies: Vec<_> = log.iter().map(|c| c.body.as_str()).collect();
                assert_eq!(bodies, vec!["first", "second"]);
            }
            other => panic!("expected comments:update, got {other:?}"),
        }
    }

    #[test]
    fn delete_of_unknown_comment_is_silent() {
        let mut router = EventRouter::new();
        let mut a = attach(&mut router, "a");
        router.handle_event("a", add("n1", "keep"));
        drain(&mut a);
        let before = router.comments_for("n1").to_vec();

        router.handle_event("a", InboundEvent::Message(ClientMessage::CommentDelete("nope".to_string())));

        assert!(drain(&mut a).is_empty());
        assert_eq!(router.comments_for("n1"), before.as_slice());
    }

    #[test]
    fn delete_broadcasts_remaining_log() {
        let mut router = EventRouter::new();
        let mut a = attach(&mut router, "a");
        router.handle_event("a", add("n1", "one"));
        router.handle_event("a", add("n1", "two"));
        let doomed = router.comments_for("n1")[0].id.clone();
        drain(&mut a);

        router.handle_event("a", InboundEvent::Message(ClientMessage::CommentDelete(doomed)));

        match drain(&mut a).as_slice() {
            [ServerMessage::CommentsUpdate(log)] => {
                assert_eq!(log.len(), 1);
                assert_eq!(log[0].body, "two");
            }
            other => panic!("unexpected messages: {other:?}"),
        }
    }

    #[test]
    fn rejected_event_is_dropped_without_broadcast() {
        let mut router = EventRouter::new();
        let mut a = attach(&mut router, "a");

        router.handle_event("a", InboundEvent::Rejected(EventError::UnknownEvent("x".to_string())));

        assert!(drain(&mut a).is_empty());
        assert_eq!(router.stats().connections, 1);
    }

    #[test]
    fn disconnect_twice_broadcasts_once() {
        let mut router = EventRouter::new();
        let mut a = attach(&mut router, "a");
        let mut b = attach(&mut router, "b");
        router.handle_event("a", join("u1", "Al"));
        router.handle_event("b", join("u2", "Bo"));
        drain(&mut b);

        assert!(router.disconnect("a"));
        assert!(!router.disconnect("a"));
        assert_eq!(a.detached.try_recv(), Err(TryRecvError::Closed));

        let msgs = drain(&mut b);
        assert_eq!(msgs.len(), 1);
        assert_eq!(connection_ids(&msgs[0]), vec!["b"]);
    }

    #[test]
    fn closed_outbox_counts_as_disconnect() {
        let mut router = EventRouter::new();
        let a = attach(&mut router, "a");
        let mut b = attach(&mut router, "b");
        router.handle_event("a", join("u1", "Al"));
        router.handle_event("b", join("u2", "Bo"));
        drain(&mut b);
        drop(a);

        router.handle_event("b", add("n1", "hi"));

        let msgs = drain(&mut b);
        assert!(matches!(msgs[0], ServerMessage::CommentsUpdate(_)));
        assert_eq!(connection_ids(&msgs[1]), vec!["b"]);
        assert_eq!(router.stats().connections, 1);
        assert!(!router.disconnect("a"));
    }

    #[test]
    fn full_outbox_drops_only_the_slow_connection() {
        let mut router = EventRouter::new();
        let (slow_outbox, mut slow) = Outbox::channel(1);
        router.connect("slow".to_string(), slow_outbox);
        let mut fast = attach(&mut router, "fast");
        router.handle_event("slow", join("u1", "Al"));
        assert_eq!(slow.detached.try_recv(), Err(TryRecvError::Empty));
        router.handle_event("fast", join("u2", "Bo"));

        let ids: Vec<_> = router.participants().into_iter().map(|p| p.connection_id).collect();
        assert_eq!(ids, vec!["fast"]);
        let last = drain(&mut fast).pop().unwrap();
        assert_eq!(connection_ids(&last), vec!["fast"]);
        // The socket learns right away, while a stale frame is still queued.
        assert_eq!(slow.detached.try_recv(), Err(TryRecvError::Closed));
        assert!(slow.frames.try_recv().is_ok());
    }

    #[test]
    fn events_from_detached_connection_are_ignored() {
        let mut router = EventRouter::new();
        let mut a = attach(&mut router, "a");

        router.handle_event("ghost", add("n1", "hi"));

        assert!(drain(&mut a).is_empty());
        assert_eq!(router.stats().comments, 0);
    }

    #[derive(Debug, Clone)]
    enum Op {
        Connect(usize),
        Join(usize, u8),
        Disconnect(usize),
        /// The socket side goes away without telling the hub.
        Kill(usize),
        Comment(usize),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0..5usize).prop_map(Op::Connect),
            (0..5usize, 0..3u8).prop_map(|(slot, name)| Op::Join(slot, name)),
            (0..5usize).prop_map(Op::Disconnect),
            (0..5usize).prop_map(Op::Kill),
            (0..5usize).prop_map(Op::Comment),
        ]
    }

    /// Expected hub view, keyed by client slot. A slot gets a fresh connection
    /// id every time it reconnects.
    #[derive(Default)]
    struct Model {
        next_id: usize,
        ids: HashMap<usize, String>,
        attached: HashSet<usize>,
        killed: HashSet<usize>,
        announced: Vec<usize>,
        mailboxes: HashMap<usize, Mailbox>,
    }

    impl Model {
        fn id(&self, slot: usize) -> String {
            self.ids
                .get(&slot)
                .cloned()
                .unwrap_or_else(|| format!("never-{slot}"))
        }

        fn detach(&mut self, slot: usize) {
            self.attached.remove(&slot);
            self.killed.remove(&slot);
            self.announced.retain(|s| *s != slot);
            self.mailboxes.remove(&slot);
        }

        /// Any broadcast reaps every killed connection, one participant list
        /// each. Returns how many were reaped.
        fn reap(&mut self) -> usize {
            let killed: Vec<usize> = self.killed.drain().collect();
            for slot in &killed {
                self.detach(*slot);
            }
            killed.len()
        }

        fn expected_ids(&self) -> Vec<String> {
            self.announced.iter().map(|s| self.ids[s].clone()).collect()
        }
    }

    fn users_updates(mailbox: &mut Mailbox) -> Vec<Vec<String>> {
        drain(mailbox)
            .iter()
            .filter(|msg| matches!(msg, ServerMessage::UsersUpdate(_)))
            .map(connection_ids)
            .collect()
    }

    proptest! {
        #[test]
        fn participants_match_announced_live_connections(ops in prop::collection::vec(op(), 1..60)) {
            let mut router = EventRouter::new();
            let (outbox, mut observer) = Outbox::channel(1024);
            router.connect("observer".to_string(), outbox);
            let mut model = Model::default();

            for op in ops {
                let expected_updates = match op {
                    Op::Connect(slot) => {
                        if !model.attached.contains(&slot) {
                            let id = format!("c{}", model.next_id);
                            model.next_id += 1;
                            let (outbox, mailbox) = Outbox::channel(1024);
                            router.connect(id.clone(), outbox);
                            model.ids.insert(slot, id);
                            model.attached.insert(slot);
                            model.mailboxes.insert(slot, mailbox);
                        }
                        0
                    }
                    Op::Join(slot, name) => {
                        router.handle_event(&model.id(slot), join(&format!("u{name}"), &format!("User{name}")));
                        if model.attached.contains(&slot) {
                            if !model.announced.contains(&slot) {
                                model.announced.push(slot);
                            }
                            1 + model.reap()
                        } else {
                            0
                        }
                    }
                    Op::Disconnect(slot) => {
                        let was_attached = model.attached.contains(&slot);
                        prop_assert_eq!(router.disconnect(&model.id(slot)), was_attached);
                        if was_attached {
                            model.detach(slot);
                            1 + model.reap()
                        } else {
                            0
                        }
                    }
                    Op::Kill(slot) => {
                        if model.attached.contains(&slot) {
                            model.mailboxes.remove(&slot);
                            model.killed.insert(slot);
                        }
                        0
                    }
                    Op::Comment(slot) => {
                        router.handle_event(&model.id(slot), add("n1", "hi"));
                        if model.attached.contains(&slot) {
                            model.reap()
                        } else {
                            0
                        }
                    }
                };

                let updates = users_updates(&mut observer);
                prop_assert_eq!(updates.len(), expected_updates);
                if let Some(last) = updates.last() {
                    prop_assert_eq!(last, &model.expected_ids());
                }
                let listed: Vec<String> = router.participants().into_iter().map(|p| p.connection_id).collect();
                prop_assert_eq!(listed, model.expected_ids());
                prop_assert_eq!(router.stats().connections, model.attached.len() + 1);
            }
        }
    }
}
