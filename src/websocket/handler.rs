use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::{header::ORIGIN, HeaderMap, Method, StatusCode},
    response::{IntoResponse, Response},
};
use futures_util::{SinkExt, StreamExt};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::hub::HubHandle;
use crate::models::InboundEvent;
use crate::websocket::guard::ConnectionGuard;
use crate::AppState;

/// WebSocket handler
pub async fn websocket_handler(
    method: Method,
    headers: HeaderMap,
    State(state): State<AppState>,
    ws: WebSocketUpgrade,
) -> Response {
    if !state.origins.allows_method(&method) {
        warn!("Rejected WebSocket connection using method {}", method);
        return (StatusCode::METHOD_NOT_ALLOWED, "Method not allowed").into_response();
    }

    // Browsers always send Origin; other clients may omit it.
    if let Some(origin) = headers.get(ORIGIN) {
        let allowed = origin
            .to_str()
            .map(|o| state.origins.allows_origin(o))
            .unwrap_or(false);
        if !allowed {
            warn!("Rejected WebSocket connection from origin {:?}", origin);
            return (StatusCode::FORBIDDEN, "Origin not allowed").into_response();
        }
    }

    ws.on_upgrade(move |socket| handle_socket(socket, state.hub))
}

/// Handle WebSocket connection
async fn handle_socket(socket: WebSocket, hub: HubHandle) {
    // Transport-assigned handle; a reconnecting client gets a new one
    let connection_id = Uuid::new_v4().to_string();
    info!("Client connected: {}", connection_id);

    let mailbox = hub.connect(&connection_id);
    let _guard = ConnectionGuard::new(connection_id.clone(), hub.clone());

    let (mut sender, mut receiver) = socket.split();

    // Drain this connection's queue into the socket. Ends as soon as the hub
    // drops the connection, without flushing what is still queued, or when the
    // socket refuses a write.
    let writer_id = connection_id.clone();
    let mut send_task = tokio::spawn(async move {
        let mut frames = mailbox.frames;
        let mut detached = mailbox.detached;
        loop {
            tokio::select! {
                biased;
                _ = &mut detached => {
                    info!("Hub dropped connection {}, closing socket", writer_id);
                    break;
                }
                frame = frames.recv() => {
                    let Some(text) = frame else { break };
                    if let Err(e) = sender.send(Message::Text(text)).await {
                        warn!("Send to {} failed: {}", writer_id, e);
                        break;
                    }
                }
            }
        }
        let _ = sender.close().await;
    });

    // Forward inbound text frames to the hub in the order they arrive
    let reader_id = connection_id.clone();
    let reader_hub = hub.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(frame) = receiver.next().await {
            match frame {
                // Awaiting here slows only this socket when the hub is backed up
                Ok(Message::Text(text)) => reader_hub.dispatch(&reader_id, InboundEvent::parse(&text)).await,
                Ok(Message::Close(_)) => break,
                Ok(_) => debug!("Ignoring non-text frame from {}", reader_id),
                Err(e) => {
                    warn!("Receive from {} failed: {}", reader_id, e);
                    break;
                }
            }
        }
    });

    // Wait for either task to finish (and finish the other)
    tokio::select! {
        _ = (&mut send_task) => recv_task.abort(),
        _ = (&mut recv_task) => send_task.abort(),
    };
    info!("Client disconnected: {}", connection_id);
}
