use crate::hub::HubHandle;

/// Runs the hub's disconnect path for a connection when dropped, however the
/// socket task ends (close frame, I/O error, abort or server shutdown).
pub struct ConnectionGuard {
    connection_id: String,
    hub: HubHandle,
}

impl ConnectionGuard {
    pub fn new(connection_id: String, hub: HubHandle) -> Self {
        Self { connection_id, hub }
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.hub.disconnect(&self.connection_id);
    }
}
