pub mod code;
pub mod reaper;

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use std::fmt;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::gateway::connection::Connection;
use crate::gateway::events::{error_message, Role, ServerMessage};
use crate::snowflake::{self, ConnectionId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomError {
    NotFound,
    Full,
    RoleAlreadyAssigned,
    NotAMember,
    CodesExhausted,
}

impl RoomError {
    /// Text sent back to the offending connection in an `error` message.
    pub fn wire_message(&self) -> &'static str {
        match self {
            RoomError::NotFound => error_message::INVALID_CODE,
            RoomError::Full => error_message::ROOM_FULL,
            RoomError::RoleAlreadyAssigned => error_message::ROLE_ASSIGNED,
            RoomError::NotAMember => error_message::NOT_A_MEMBER,
            RoomError::CodesExhausted => error_message::NO_CODES,
        }
    }
}

impl fmt::Display for RoomError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoomError::NotFound => write!(f, "room not found"),
            RoomError::Full => write!(f, "room already has a client"),
            RoomError::RoleAlreadyAssigned => write!(f, "connection already holds a role"),
            RoomError::NotAMember => write!(f, "connection is not a member of the room"),
            RoomError::CodesExhausted => write!(f, "all room codes are in use"),
        }
    }
}

impl std::error::Error for RoomError {}

#[derive(Debug, Clone)]
pub struct Room {
    pub code: String,
    pub target: ConnectionId,
    /// Set at most once; a full room is never re-opened.
    pub client: Option<ConnectionId>,
    pub target_peer_id: Option<String>,
    pub client_peer_id: Option<String>,
    pub target_live: bool,
    pub client_live: bool,
    pub created_at: DateTime<Utc>,
    pub last_activity: Instant,
}

impl Room {
    fn new(code: String, target: ConnectionId) -> Self {
        Self {
            code,
            target,
            client: None,
            target_peer_id: None,
            client_peer_id: None,
            target_live: true,
            client_live: false,
            created_at: Utc::now(),
            last_activity: Instant::now(),
        }
    }

    fn member(&self, role: Role) -> Option<ConnectionId> {
        match role {
            Role::Target => Some(self.target),
            Role::Client => self.client,
        }
    }

    fn is_live(&self, role: Role) -> bool {
        match role {
            Role::Target => self.target_live,
            Role::Client => self.client_live,
        }
    }

    /// Connection of `role`, only while its socket is open.
    fn live_member(&self, role: Role) -> Option<ConnectionId> {
        self.member(role).filter(|_| self.is_live(role))
    }

    fn is_paired_and_live(&self) -> bool {
        self.target_live && self.client_live
    }

    fn touch(&mut self) {
        self.last_activity = Instant::now();
    }
}

/// Snapshot of a room for the HTTP status route.
#[derive(Debug, Clone, Serialize)]
pub struct RoomStatus {
    pub code: String,
    pub created_at: DateTime<Utc>,
    pub has_client: bool,
    pub target_live: bool,
    pub client_live: bool,
}

/// Result of a successful identifier submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayOutcome {
    /// Delivered to the counterpart right away.
    Forwarded,
    /// Kept on the room; the counterpart has not joined yet.
    Stored,
}

/// Pairs one target connection with at most one client under a 4-digit code
/// and relays identifiers and signaling payloads between them.
#[derive(Default)]
pub struct RoomRegistry {
    rooms: DashMap<String, Room>,
    connections: DashMap<ConnectionId, Connection>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Register a freshly opened control connection.
    pub fn connect(&self, tx: mpsc::UnboundedSender<ServerMessage>) -> ConnectionId {
        let id = snowflake::next_connection_id();
        self.connections.insert(id, Connection::new(id, tx));
        id
    }

    pub fn room_status(&self, code: &str) -> Option<RoomStatus> {
        self.rooms.get(code).map(|room| RoomStatus {
            code: room.code.clone(),
            created_at: room.created_at,
            has_client: room.client.is_some(),
            target_live: room.target_live,
            client_live: room.client_live,
        })
    }

    fn send(&self, conn_id: ConnectionId, msg: ServerMessage) {
        if let Some(conn) = self.connections.get(&conn_id) {
            conn.send(msg);
        }
    }

    fn deliver(&self, deliveries: Vec<(ConnectionId, ServerMessage)>) {
        for (conn_id, msg) in deliveries {
            self.send(conn_id, msg);
        }
    }

    pub fn reply_error(&self, conn_id: ConnectionId, err: &RoomError) {
        self.send(conn_id, ServerMessage::error(err.wire_message()));
    }

    fn membership(&self, conn_id: ConnectionId) -> Option<(String, Role)> {
        self.connections
            .get(&conn_id)
            .and_then(|c| c.membership.clone())
    }

    fn ensure_unassigned(&self, conn_id: ConnectionId) -> Result<(), RoomError> {
        match self.membership(conn_id) {
            Some(_) => Err(RoomError::RoleAlreadyAssigned),
            None => Ok(()),
        }
    }

    fn assign(&self, conn_id: ConnectionId, code: &str, role: Role) {
        if let Some(mut conn) = self.connections.get_mut(&conn_id) {
            conn.membership = Some((code.to_string(), role));
        }
    }

    /// Open a new room with `conn_id` as its target and reply `room_created`.
    pub fn create_room(&self, conn_id: ConnectionId) -> Result<String, RoomError> {
        self.ensure_unassigned(conn_id)?;

        let mut rng = rand::thread_rng();
        let mut created = None;
        for candidate in code::candidates(&mut rng) {
            if let Entry::Vacant(slot) = self.rooms.entry(candidate.clone()) {
                slot.insert(Room::new(candidate.clone(), conn_id));
                created = Some(candidate);
                break;
            }
        }
        let code = created.ok_or(RoomError::CodesExhausted)?;

        self.assign(conn_id, &code, Role::Target);
        self.send(conn_id, ServerMessage::RoomCreated { code: code.clone() });
        tracing::info!("room {code} created by target {conn_id}");
        Ok(code)
    }

    /// Attach `conn_id` as the client of `code`.
    ///
    /// On success the caller gets `room_joined`, the target gets
    /// `client_connected`, and an identifier the target stored before the
    /// client arrived is forwarded to the client.
    pub fn join_room(&self, conn_id: ConnectionId, code: &str) -> Result<(), RoomError> {
        self.ensure_unassigned(conn_id)?;

        let deliveries = {
            let mut room = self.rooms.get_mut(code).ok_or(RoomError::NotFound)?;
            if room.client.is_some() {
                return Err(RoomError::Full);
            }
            room.client = Some(conn_id);
            room.client_live = true;
            room.touch();

            let mut out = vec![
                (room.target, ServerMessage::ClientConnected),
                (
                    conn_id,
                    ServerMessage::RoomJoined {
                        code: code.to_string(),
                    },
                ),
            ];
            if let Some(peer_id) = room.target_peer_id.clone() {
                out.push((
                    conn_id,
                    ServerMessage::PeerIdReceived {
                        peer_id,
                        from: Role::Target,
                    },
                ));
            }
            out
        };

        self.assign(conn_id, code, Role::Client);
        self.deliver(deliveries);
        tracing::info!("client {conn_id} joined room {code}");
        Ok(())
    }

    /// Store `peer_id` under `role` and forward it to the counterpart if present.
    pub fn relay_peer_id(
        &self,
        conn_id: ConnectionId,
        code: &str,
        peer_id: &str,
        role: Role,
    ) -> Result<RelayOutcome, RoomError> {
        let membership = self.membership(conn_id);

        let delivery = {
            let mut room = self.rooms.get_mut(code).ok_or(RoomError::NotFound)?;
            if membership.as_ref() != Some(&(code.to_string(), role))
                || room.member(role) != Some(conn_id)
            {
                return Err(RoomError::NotAMember);
            }
            room.touch();

            match role {
                Role::Target => room.target_peer_id = Some(peer_id.to_string()),
                Role::Client => room.client_peer_id = Some(peer_id.to_string()),
            }

            room.live_member(role.counterpart()).map(|to| {
                (
                    to,
                    ServerMessage::PeerIdReceived {
                        peer_id: peer_id.to_string(),
                        from: role,
                    },
                )
            })
        };

        match delivery {
            Some((to, msg)) => {
                tracing::debug!("relayed {role} peer id in room {code} to {to}");
                self.send(to, msg);
                Ok(RelayOutcome::Forwarded)
            }
            None => {
                tracing::debug!("stored {role} peer id in room {code}, counterpart absent");
                Ok(RelayOutcome::Stored)
            }
        }
    }

    /// Forward an opaque payload to every other live member of the room.
    /// Returns the number of recipients.
    pub fn relay_signal(
        &self,
        conn_id: ConnectionId,
        code: &str,
        data: serde_json::Value,
    ) -> Result<usize, RoomError> {
        let recipients: Vec<ConnectionId> = {
            let mut room = self.rooms.get_mut(code).ok_or(RoomError::NotFound)?;
            if room.target != conn_id && room.client != Some(conn_id) {
                return Err(RoomError::NotAMember);
            }
            room.touch();
            [Role::Target, Role::Client]
                .into_iter()
                .filter_map(|role| room.live_member(role))
                .filter(|id| *id != conn_id)
                .collect()
        };

        for to in &recipients {
            self.send(*to, ServerMessage::Signal { data: data.clone() });
        }
        Ok(recipients.len())
    }

    /// Forget a closed connection, tell the surviving member, and drop the room
    /// once nobody in it is live.
    pub fn disconnect(&self, conn_id: ConnectionId) {
        let Some((_, conn)) = self.connections.remove(&conn_id) else {
            return;
        };
        let Some((code, role)) = conn.membership else {
            return;
        };

        let (notify, empty) = {
            let Some(mut room) = self.rooms.get_mut(&code) else {
                return;
            };
            if room.member(role) != Some(conn_id) {
                return;
            }
            match role {
                Role::Target => room.target_live = false,
                Role::Client => room.client_live = false,
            }
            room.touch();
            (
                room.live_member(role.counterpart()),
                !room.target_live && !room.client_live,
            )
        };

        if let Some(to) = notify {
            self.send(to, ServerMessage::PeerLeft { role });
        }
        if empty {
            self.rooms.remove(&code);
            tracing::info!("room {code} closed, no live members left");
        } else {
            tracing::info!("{role} {conn_id} left room {code}");
        }
    }

    /// Remove rooms idle for at least `idle_timeout` that are not fully paired.
    /// Live members of a reaped room get `error("Room expired")`.
    pub fn reap_idle(&self, now: Instant, idle_timeout: Duration) -> Vec<String> {
        let expired: Vec<String> = self
            .rooms
            .iter()
            .filter(|entry| {
                let room = entry.value();
                !room.is_paired_and_live()
                    && now.saturating_duration_since(room.last_activity) >= idle_timeout
            })
            .map(|entry| entry.key().clone())
            .collect();

        let mut reaped = Vec::with_capacity(expired.len());
        for code in expired {
            // Re-check under the removal lock; the room may have changed meanwhile.
            let removed = self.rooms.remove_if(&code, |_, room| {
                !room.is_paired_and_live()
                    && now.saturating_duration_since(room.last_activity) >= idle_timeout
            });
            if let Some((_, room)) = removed {
                for role in [Role::Target, Role::Client] {
                    if let Some(to) = room.live_member(role) {
                        self.send(to, ServerMessage::error(error_message::ROOM_EXPIRED));
                    }
                }
                reaped.push(code);
            }
        }
        reaped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Peer {
        id: ConnectionId,
        rx: mpsc::UnboundedReceiver<ServerMessage>,
    }

    impl Peer {
        fn connect(registry: &RoomRegistry) -> Self {
            let (tx, rx) = mpsc::unbounded_channel();
            let id = registry.connect(tx);
            Self { id, rx }
        }

        fn drain(&mut self) -> Vec<ServerMessage> {
            let mut out = Vec::new();
            while let Ok(msg) = self.rx.try_recv() {
                out.push(msg);
            }
            out
        }
    }

    fn paired(registry: &RoomRegistry) -> (String, Peer, Peer) {
        let mut target = Peer::connect(registry);
        let mut client = Peer::connect(registry);
        let code = registry.create_room(target.id).unwrap();
        registry.join_room(client.id, &code).unwrap();
        target.drain();
        client.drain();
        (code, target, client)
    }

    #[test]
    fn test_create_room_replies_with_code() {
        let registry = RoomRegistry::new();
        let mut target = Peer::connect(&registry);
        let code = registry.create_room(target.id).unwrap();
        assert!(code::is_valid_code(&code));
        assert_eq!(target.drain(), vec![ServerMessage::RoomCreated { code }]);
    }

    #[test]
    fn test_live_codes_are_unique() {
        let registry = RoomRegistry::new();
        let mut codes = std::collections::HashSet::new();
        for _ in 0..500 {
            let target = Peer::connect(&registry);
            let code = registry.create_room(target.id).unwrap();
            assert!(codes.insert(code), "duplicate live room code");
        }
        assert_eq!(registry.room_count(), 500);
    }

    #[test]
    fn test_join_unknown_code() {
        let registry = RoomRegistry::new();
        let client = Peer::connect(&registry);
        assert_eq!(registry.join_room(client.id, "4821"), Err(RoomError::NotFound));
    }

    #[test]
    fn test_join_notifies_both_sides() {
        let registry = RoomRegistry::new();
        let mut target = Peer::connect(&registry);
        let mut client = Peer::connect(&registry);
        let code = registry.create_room(target.id).unwrap();
        target.drain();

        registry.join_room(client.id, &code).unwrap();
        assert_eq!(target.drain(), vec![ServerMessage::ClientConnected]);
        assert_eq!(client.drain(), vec![ServerMessage::RoomJoined { code }]);
    }

    #[test]
    fn test_second_client_gets_room_full() {
        let registry = RoomRegistry::new();
        let (code, _target, _client) = paired(&registry);
        let late = Peer::connect(&registry);
        assert_eq!(registry.join_room(late.id, &code), Err(RoomError::Full));
    }

    #[test]
    fn test_full_room_stays_full_after_client_leaves() {
        let registry = RoomRegistry::new();
        let (code, _target, client) = paired(&registry);
        registry.disconnect(client.id);
        let late = Peer::connect(&registry);
        assert_eq!(registry.join_room(late.id, &code), Err(RoomError::Full));
    }

    #[test]
    fn test_role_is_assigned_once() {
        let registry = RoomRegistry::new();
        let (code, target, client) = paired(&registry);
        assert_eq!(registry.create_room(target.id), Err(RoomError::RoleAlreadyAssigned));
        assert_eq!(registry.join_room(client.id, &code), Err(RoomError::RoleAlreadyAssigned));
        assert_eq!(registry.create_room(client.id), Err(RoomError::RoleAlreadyAssigned));
    }

    #[test]
    fn test_client_id_reaches_target() {
        let registry = RoomRegistry::new();
        let (code, mut target, mut client) = paired(&registry);

        let outcome = registry
            .relay_peer_id(client.id, &code, "peerC", Role::Client)
            .unwrap();
        assert_eq!(outcome, RelayOutcome::Forwarded);
        assert_eq!(
            target.drain(),
            vec![ServerMessage::PeerIdReceived {
                peer_id: "peerC".into(),
                from: Role::Client
            }]
        );
        assert!(client.drain().is_empty());
    }

    #[test]
    fn test_target_id_stored_then_delivered_on_join() {
        let registry = RoomRegistry::new();
        let mut target = Peer::connect(&registry);
        let mut client = Peer::connect(&registry);
        let code = registry.create_room(target.id).unwrap();

        let outcome = registry
            .relay_peer_id(target.id, &code, "peerT", Role::Target)
            .unwrap();
        assert_eq!(outcome, RelayOutcome::Stored);

        registry.join_room(client.id, &code).unwrap();
        assert_eq!(
            client.drain(),
            vec![
                ServerMessage::RoomJoined { code: code.clone() },
                ServerMessage::PeerIdReceived {
                    peer_id: "peerT".into(),
                    from: Role::Target
                },
            ]
        );
        assert_eq!(
            target.drain(),
            vec![
                ServerMessage::RoomCreated { code },
                ServerMessage::ClientConnected
            ]
        );
    }

    #[test]
    fn test_each_submission_delivered_exactly_once_in_either_order() {
        for client_first in [true, false] {
            let registry = RoomRegistry::new();
            let (code, mut target, mut client) = paired(&registry);

            if client_first {
                registry.relay_peer_id(client.id, &code, "peerC", Role::Client).unwrap();
                registry.relay_peer_id(target.id, &code, "peerT", Role::Target).unwrap();
            } else {
                registry.relay_peer_id(target.id, &code, "peerT", Role::Target).unwrap();
                registry.relay_peer_id(client.id, &code, "peerC", Role::Client).unwrap();
            }

            assert_eq!(
                target.drain(),
                vec![ServerMessage::PeerIdReceived {
                    peer_id: "peerC".into(),
                    from: Role::Client
                }]
            );
            assert_eq!(
                client.drain(),
                vec![ServerMessage::PeerIdReceived {
                    peer_id: "peerT".into(),
                    from: Role::Target
                }]
            );
        }
    }

    #[test]
    fn test_relay_to_unknown_room_is_reported() {
        let registry = RoomRegistry::new();
        let peer = Peer::connect(&registry);
        assert_eq!(
            registry.relay_peer_id(peer.id, "1234", "x", Role::Client),
            Err(RoomError::NotFound)
        );
        assert_eq!(
            registry.relay_signal(peer.id, "1234", serde_json::json!({})),
            Err(RoomError::NotFound)
        );
    }

    #[test]
    fn test_relay_with_wrong_role_is_rejected() {
        let registry = RoomRegistry::new();
        let (code, target, mut client) = paired(&registry);
        assert_eq!(
            registry.relay_peer_id(target.id, &code, "fake", Role::Client),
            Err(RoomError::NotAMember)
        );
        assert!(client.drain().is_empty());
    }

    #[test]
    fn test_outsider_cannot_relay() {
        let registry = RoomRegistry::new();
        let (code, _target, _client) = paired(&registry);
        let outsider = Peer::connect(&registry);
        assert_eq!(
            registry.relay_peer_id(outsider.id, &code, "x", Role::Target),
            Err(RoomError::NotAMember)
        );
        assert_eq!(
            registry.relay_signal(outsider.id, &code, serde_json::json!(1)),
            Err(RoomError::NotAMember)
        );
    }

    #[test]
    fn test_signal_excludes_sender() {
        let registry = RoomRegistry::new();
        let (code, mut target, mut client) = paired(&registry);
        let data = serde_json::json!({ "kind": "ping" });
        assert_eq!(registry.relay_signal(target.id, &code, data.clone()), Ok(1));
        assert!(target.drain().is_empty());
        assert_eq!(client.drain(), vec![ServerMessage::Signal { data }]);
    }

    #[test]
    fn test_disconnect_notifies_survivor() {
        let registry = RoomRegistry::new();
        let (code, mut target, client) = paired(&registry);
        registry.disconnect(client.id);
        assert_eq!(target.drain(), vec![ServerMessage::PeerLeft { role: Role::Client }]);
        let status = registry.room_status(&code).unwrap();
        assert!(status.target_live);
        assert!(!status.client_live);
        assert_eq!(registry.connection_count(), 1);
    }

    #[test]
    fn test_room_removed_when_last_member_leaves() {
        let registry = RoomRegistry::new();
        let (code, target, client) = paired(&registry);
        registry.disconnect(target.id);
        assert!(registry.room_status(&code).is_some());
        registry.disconnect(client.id);
        assert!(registry.room_status(&code).is_none());
    }

    #[test]
    fn test_unpaired_target_leaving_frees_code() {
        let registry = RoomRegistry::new();
        let target = Peer::connect(&registry);
        let code = registry.create_room(target.id).unwrap();
        registry.disconnect(target.id);
        assert!(registry.room_status(&code).is_none());
        assert_eq!(registry.room_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reaper_spares_live_pairs_and_fresh_rooms() {
        let registry = RoomRegistry::new();
        let (paired_code, _target, _client) = paired(&registry);
        let mut lonely = Peer::connect(&registry);
        let lonely_code = registry.create_room(lonely.id).unwrap();
        lonely.drain();

        let idle = Duration::from_secs(60);
        assert!(registry.reap_idle(Instant::now(), idle).is_empty());

        tokio::time::advance(Duration::from_secs(61)).await;
        let reaped = registry.reap_idle(Instant::now(), idle);
        assert_eq!(reaped, vec![lonely_code.clone()]);
        assert_eq!(lonely.drain(), vec![ServerMessage::error(error_message::ROOM_EXPIRED)]);
        assert!(registry.room_status(&paired_code).is_some());
        assert!(registry.room_status(&lonely_code).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reaper_collects_abandoned_half_rooms() {
        let registry = RoomRegistry::new();
        let (code, mut target, client) = paired(&registry);
        registry.disconnect(client.id);
        target.drain();

        tokio::time::advance(Duration::from_secs(30)).await;
        assert!(registry.reap_idle(Instant::now(), Duration::from_secs(60)).is_empty());

        tokio::time::advance(Duration::from_secs(31)).await;
        assert_eq!(registry.reap_idle(Instant::now(), Duration::from_secs(60)), vec![code]);
        assert_eq!(target.drain(), vec![ServerMessage::error(error_message::ROOM_EXPIRED)]);
    }
}
