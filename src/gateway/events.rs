use serde::{Deserialize, Serialize};
use std::fmt;

/// Participant role inside a room. Assigned once per connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Target,
    Client,
}

impl Role {
    pub fn counterpart(self) -> Role {
        match self {
            Role::Target => Role::Client,
            Role::Client => Role::Target,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Target => "target",
            Role::Client => "client",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error strings carried by `error` messages.
pub mod error_message {
    pub const INVALID_CODE: &str = "Invalid code";
    pub const ROOM_FULL: &str = "Room full";
    pub const ROLE_ASSIGNED: &str = "Role already assigned";
    pub const NOT_A_MEMBER: &str = "Not a member of this room";
    pub const NO_CODES: &str = "No room codes available";
    pub const ROOM_EXPIRED: &str = "Room expired";
}

/// Messages sent by a browser (or session client) to the registry.
///
/// Envelope: `{"type": "...", "data": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ClientMessage {
    CreateRoom,
    JoinRoom {
        code: String,
    },
    SendPeerId {
        code: String,
        #[serde(rename = "peerId")]
        peer_id: String,
        role: Role,
    },
    Signal {
        code: String,
        data: serde_json::Value,
    },
}

/// Messages sent by the registry to a connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ServerMessage {
    RoomCreated {
        code: String,
    },
    RoomJoined {
        code: String,
    },
    ClientConnected,
    PeerIdReceived {
        #[serde(rename = "peerId")]
        peer_id: String,
        from: Role,
    },
    Signal {
        data: serde_json::Value,
    },
    /// The counterpart's control connection closed.
    PeerLeft {
        role: Role,
    },
    Error {
        message: String,
    },
}

impl ServerMessage {
    pub fn error(message: impl Into<String>) -> Self {
        ServerMessage::Error {
            message: message.into(),
        }
    }

    pub fn to_json(&self) -> String {
        // Every variant holds plain strings or JSON values; serialization cannot fail.
        serde_json::to_string(self).unwrap_or_else(|e| {
            tracing::error!("failed to encode server message: {e}");
            String::from(r#"{"type":"error","data":{"message":"internal error"}}"#)
        })
    }
}
