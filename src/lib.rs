//! Real-time collaboration hub: shared presence, per-note comment threads and
//! note change relay over WebSocket.

pub mod config;
pub mod docs;
pub mod handlers;
pub mod hub;
pub mod models;
pub mod routes;
pub mod websocket;

use std::sync::Arc;

use hub::HubHandle;
use routes::origin_policy::OriginPolicy;

/// Shared state handed to every request handler
#[derive(Clone)]
pub struct AppState {
    pub hub: HubHandle,
    pub origins: Arc<OriginPolicy>,
}
