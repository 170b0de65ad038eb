use crate::gateway::events::Role;

use super::transport::MediaStream;

/// Everything a session client observes, fanned out to every subscriber.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    RoomCreated(String),
    RoomJoined(String),
    ClientConnected,
    PeerIdReceived { peer_id: String, from: Role },
    DataChannelOpen { remote_peer_id: String },
    /// A remote media stream arrived on an answered call (target only).
    Stream(MediaStream),
    Signal(serde_json::Value),
    PeerLeft(Role),
    Error(String),
    /// The control channel closed.
    Disconnected,
}
