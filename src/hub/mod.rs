//! The collaboration hub: presence registry, comment logs and event routing.
//!
//! All state lives in one [`EventRouter`] owned by a dedicated task. Socket
//! handlers talk to it through a cloneable [`HubHandle`], so mutations are
//! applied one command at a time in the order each connection sent them.

pub mod comment_store;
pub mod registry;
pub mod router;

pub use comment_store::CommentStore;
pub use registry::ConnectionRegistry;
pub use router::{EventRouter, HubStats, Mailbox, Outbox};

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::oneshot;
use tracing::{error, info};

use crate::models::InboundEvent;

/// Attach and query commands. Sent on an unbounded channel that the hub
/// serves ahead of client traffic.
#[derive(Debug)]
pub enum HubCommand {
    Connect { connection_id: String, outbox: Outbox },
    Stats { reply: oneshot::Sender<HubStats> },
}

/// Traffic from one connection, applied in the order it was queued. A
/// disconnect shares this queue so it never overtakes the connection's own
/// events.
#[derive(Debug)]
enum Inbound {
    Event { connection_id: String, event: InboundEvent },
    Disconnect { connection_id: String },
}

#[derive(Clone, Debug)]
pub struct HubHandle {
    control: mpsc::UnboundedSender<HubCommand>,
    events: mpsc::Sender<Inbound>,
    outbound_buffer: usize,
}

impl HubHandle {
    /// Start the hub task. `outbound_buffer` is the number of frames queued per
    /// connection before that connection is considered too slow and dropped.
    /// `inbound_buffer` bounds the events waiting for the hub; when it is full
    /// the sending socket waits, and only that socket.
    pub fn spawn(outbound_buffer: usize, inbound_buffer: usize) -> Self {
        let (control, control_rx) = mpsc::unbounded_channel();
        let (events, events_rx) = mpsc::channel(inbound_buffer.max(1));
        tokio::spawn(run(EventRouter::new(), control_rx, events_rx));
        Self {
            control,
            events,
            outbound_buffer: outbound_buffer.max(1),
        }
    }

    /// Attach a connection and return the socket side of its queue.
    pub fn connect(&self, connection_id: &str) -> Mailbox {
        let (outbox, mailbox) = Outbox::channel(self.outbound_buffer);
        self.send(HubCommand::Connect {
            connection_id: connection_id.to_string(),
            outbox,
        });
        mailbox
    }

    /// Queue an event for the hub, waiting while the inbound queue is full.
    pub async fn dispatch(&self, connection_id: &str, event: InboundEvent) {
        let inbound = Inbound::Event {
            connection_id: connection_id.to_string(),
            event,
        };
        if self.events.send(inbound).await.is_err() {
            error!("Hub task is not running, event dropped");
        }
    }

    /// Queue the disconnect path behind this connection's pending events.
    /// Callable from synchronous code; when the queue is full the send is
    /// finished on a spawned task. Safe to call more than once for the same
    /// connection.
    pub fn disconnect(&self, connection_id: &str) {
        let inbound = Inbound::Disconnect {
            connection_id: connection_id.to_string(),
        };
        match self.events.try_send(inbound) {
            Ok(()) => {}
            Err(TrySendError::Full(inbound)) => {
                let events = self.events.clone();
                tokio::spawn(async move {
                    if events.send(inbound).await.is_err() {
                        error!("Hub task is not running, disconnect dropped");
                    }
                });
            }
            Err(TrySendError::Closed(_)) => error!("Hub task is not running, disconnect dropped"),
        }
    }

    /// `None` if the hub task has stopped.
    pub async fn stats(&self) -> Option<HubStats> {
        let (reply, rx) = oneshot::channel();
        self.send(HubCommand::Stats { reply });
        rx.await.ok()
    }

    fn send(&self, cmd: HubCommand) {
        if self.control.send(cmd).is_err() {
            error!("Hub task is not running, command dropped");
        }
    }
}

async fn run(
    mut router: EventRouter,
    mut control: mpsc::UnboundedReceiver<HubCommand>,
    mut events: mpsc::Receiver<Inbound>,
) {
    info!("Hub started");
    loop {
        // Control first: a connection's Connect is always queued before any of
        // its events, so it is applied before them.
        tokio::select! {
            biased;
            cmd = control.recv() => match cmd {
                Some(HubCommand::Connect { connection_id, outbox }) => router.connect(connection_id, outbox),
                Some(HubCommand::Stats { reply }) => {
                    let _ = reply.send(router.stats());
                }
                None => break,
            },
            inbound = events.recv() => match inbound {
                Some(Inbound::Event { connection_id, event }) => router.handle_event(&connection_id, event),
                Some(Inbound::Disconnect { connection_id }) => {
                    router.disconnect(&connection_id);
                }
                None => break,
            },
        }
    }
    info!("Hub stopped");
}
