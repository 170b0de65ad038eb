use std::fmt;

use crate::gateway::events::{error_message, Role};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// `join_room` with a code the registry does not know.
    RoomNotFound,
    /// `join_room` on a room that already has its client.
    RoomFull,
    /// Camera or microphone permission refused. Not retried.
    MediaAccessDenied(String),
    /// The peer transport could not reach the remote endpoint.
    PeerConnectFailure(String),
    /// An action that needs a room code was issued before one was known.
    NoRoom,
    RoleAlreadyAssigned,
    /// A role-scoped action was issued by the other role.
    WrongRole { required: Role },
    IdentityAlreadySent,
    /// The control channel to the registry is unreachable or closed.
    ControlChannel(String),
    /// Any other `error` reply from the registry.
    Rejected(String),
}

impl SessionError {
    /// Map the text of a registry `error` reply to a typed error.
    pub fn from_wire(message: &str) -> Self {
        match message {
            error_message::INVALID_CODE => SessionError::RoomNotFound,
            error_message::ROOM_FULL => SessionError::RoomFull,
            error_message::ROLE_ASSIGNED => SessionError::RoleAlreadyAssigned,
            other => SessionError::Rejected(other.to_string()),
        }
    }
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::RoomNotFound => write!(f, "room not found"),
            SessionError::RoomFull => write!(f, "room is full"),
            SessionError::MediaAccessDenied(e) => write!(f, "media access denied: {e}"),
            SessionError::PeerConnectFailure(e) => write!(f, "peer connection failed: {e}"),
            SessionError::NoRoom => write!(f, "no room code known yet"),
            SessionError::RoleAlreadyAssigned => write!(f, "session role already assigned"),
            SessionError::WrongRole { required } => write!(f, "only the {required} may do this"),
            SessionError::IdentityAlreadySent => write!(f, "peer identifier already sent"),
            SessionError::ControlChannel(e) => write!(f, "control channel error: {e}"),
            SessionError::Rejected(msg) => write!(f, "registry rejected request: {msg}"),
        }
    }
}

impl std::error::Error for SessionError {}
