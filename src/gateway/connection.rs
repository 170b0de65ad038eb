use tokio::sync::mpsc;

use super::events::{Role, ServerMessage};
use crate::snowflake::ConnectionId;

/// Registry-side handle of one live control connection.
#[derive(Debug, Clone)]
pub struct Connection {
    pub id: ConnectionId,
    /// Room code and role, set once by `create_room` or `join_room`.
    pub membership: Option<(String, Role)>,
    pub tx: mpsc::UnboundedSender<ServerMessage>,
}

impl Connection {
    pub fn new(id: ConnectionId, tx: mpsc::UnboundedSender<ServerMessage>) -> Self {
        Self {
            id,
            membership: None,
            tx,
        }
    }

    /// Queue a message for this connection. A closed socket is not an error here;
    /// its cleanup runs through `RoomRegistry::disconnect`.
    pub fn send(&self, msg: ServerMessage) {
        if self.tx.send(msg).is_err() {
            tracing::debug!("dropping message for closed connection {}", self.id);
        }
    }
}
