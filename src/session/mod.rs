pub mod error;
pub mod events;
pub mod loopback;
pub mod transport;

use futures_util::{SinkExt, StreamExt};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use crate::gateway::events::{error_message, ClientMessage, Role, ServerMessage};
pub use error::SessionError;
pub use events::SessionEvent;
pub use transport::{DataChannel, IncomingCall, MediaStream, PeerTransport};

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// How long `create_room` / `join_room` wait for the registry's reply.
pub const REPLY_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Default)]
struct LocalState {
    role: Option<Role>,
    room_code: Option<String>,
    identity_sent: bool,
    remote_stream: Option<MediaStream>,
}

struct Inner<T: PeerTransport> {
    outbound: mpsc::UnboundedSender<ClientMessage>,
    events: broadcast::Sender<SessionEvent>,
    local: Mutex<LocalState>,
    transport: T,
}

/// One control connection plus one peer-transport endpoint. Registry
/// messages are republished as [`SessionEvent`]s on a broadcast channel.
pub struct SessionClient<T: PeerTransport> {
    inner: Arc<Inner<T>>,
    tasks: Vec<JoinHandle<()>>,
}

impl<T: PeerTransport> Drop for SessionClient<T> {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

impl<T: PeerTransport> SessionClient<T> {
    /// Open the control channel at `server_url` (e.g. `ws://localhost:3000/ws`).
    pub async fn connect(server_url: &str, transport: T) -> Result<Self, SessionError> {
        let (ws, _) = connect_async(server_url)
            .await
            .map_err(|e| SessionError::ControlChannel(e.to_string()))?;
        tracing::info!("control channel connected to {server_url}");
        let (mut ws_sink, mut ws_stream) = ws.split();

        let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<ClientMessage>();
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let inner = Arc::new(Inner {
            outbound,
            events,
            local: Mutex::new(LocalState::default()),
            transport,
        });

        let writer = tokio::spawn(async move {
            while let Some(msg) = outbound_rx.recv().await {
                let json = match serde_json::to_string(&msg) {
                    Ok(json) => json,
                    Err(e) => {
                        tracing::error!("failed to encode client message: {e}");
                        continue;
                    }
                };
                if ws_sink.send(Message::Text(json.into())).await.is_err() {
                    break;
                }
            }
        });

        let reader = tokio::spawn({
            let inner = inner.clone();
            async move {
                while let Some(msg) = ws_stream.next().await {
                    match msg {
                        Ok(Message::Text(text)) => match serde_json::from_str::<ServerMessage>(&text) {
                            Ok(server_msg) => Inner::on_server_message(&inner, server_msg),
                            Err(e) => tracing::warn!("undecodable registry message: {e}"),
                        },
                        Ok(Message::Close(_)) => break,
                        Ok(_) => {}
                        Err(e) => {
                            tracing::warn!("control channel error: {e}");
                            break;
                        }
                    }
                }
                tracing::info!("control channel closed");
                inner.emit(SessionEvent::Disconnected);
            }
        });

        let mut tasks = vec![writer, reader];
        if let Some(incoming) = inner.transport.take_incoming() {
            tasks.push(tokio::spawn(Inner::answer_calls(inner.clone(), incoming)));
        }

        Ok(Self { inner, tasks })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events.subscribe()
    }

    pub fn role(&self) -> Option<Role> {
        self.inner.local().role
    }

    pub fn room_code(&self) -> Option<String> {
        self.inner.local().room_code.clone()
    }

    pub fn remote_stream(&self) -> Option<MediaStream> {
        self.inner.local().remote_stream.clone()
    }

    pub fn transport(&self) -> &T {
        &self.inner.transport
    }

    /// Become the target of a new room and wait for its code.
    pub async fn create_room(&self) -> Result<String, SessionError> {
        self.inner.assign_role(Role::Target)?;
        let mut events = self.subscribe();
        let reply = match self.inner.send(ClientMessage::CreateRoom) {
            Ok(()) => {
                await_reply(&mut events, CREATE_ERRORS, |event| match event {
                    SessionEvent::RoomCreated(code) => Some(code.clone()),
                    _ => None,
                })
                .await
            }
            Err(e) => Err(e),
        };
        if reply.is_err() {
            self.inner.clear_role();
        }
        reply
    }

    /// Become the client of room `code` and wait for the registry to confirm.
    pub async fn join_room(&self, code: &str) -> Result<(), SessionError> {
        self.inner.assign_role(Role::Client)?;
        self.inner.local().room_code = Some(code.to_string());

        let mut events = self.subscribe();
        let reply = match self.inner.send(ClientMessage::JoinRoom {
            code: code.to_string(),
        }) {
            Ok(()) => {
                await_reply(&mut events, JOIN_ERRORS, |event| match event {
                    SessionEvent::RoomJoined(_) => Some(()),
                    _ => None,
                })
                .await
            }
            Err(e) => Err(e),
        };
        if reply.is_err() {
            self.inner.clear_role();
        }
        reply
    }

    /// Wait for the transport to be assigned an identifier, then submit it for
    /// relay to the other member of the room. Allowed once per session.
    pub async fn send_identity(&self) -> Result<String, SessionError> {
        let (code, role) = {
            let mut local = self.inner.local();
            let (Some(code), Some(role)) = (local.room_code.clone(), local.role) else {
                return Err(SessionError::NoRoom);
            };
            if local.identity_sent {
                return Err(SessionError::IdentityAlreadySent);
            }
            local.identity_sent = true;
            (code, role)
        };

        let result = self.inner.submit_identity(code, role).await;
        if result.is_err() {
            self.inner.local().identity_sent = false;
        }
        result
    }

    /// Open a data channel to the client's endpoint (target only).
    pub async fn connect_to_peer(&self, remote_peer_id: &str) -> Result<DataChannel, SessionError> {
        self.inner.connect_to_peer(remote_peer_id).await
    }

    /// Call the target's endpoint carrying `stream` (client only).
    pub async fn call_peer(&self, remote_peer_id: &str, stream: MediaStream) -> Result<(), SessionError> {
        self.inner.require_role(Role::Client)?;
        tracing::info!("calling peer {remote_peer_id} with stream {}", stream.id);
        self.inner.transport.call(remote_peer_id, stream).await
    }

    /// Broadcast an opaque payload to the other member of the room.
    pub fn signal(&self, data: serde_json::Value) -> Result<(), SessionError> {
        let code = self.room_code().ok_or(SessionError::NoRoom)?;
        self.inner.send(ClientMessage::Signal { code, data })
    }
}

impl<T: PeerTransport> Inner<T> {
    fn local(&self) -> std::sync::MutexGuard<'_, LocalState> {
        self.local.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn emit(&self, event: SessionEvent) {
        // No subscribers is fine; events are advisory.
        let _ = self.events.send(event);
    }

    fn send(&self, msg: ClientMessage) -> Result<(), SessionError> {
        self.outbound
            .send(msg)
            .map_err(|_| SessionError::ControlChannel("connection closed".to_string()))
    }

    fn assign_role(&self, role: Role) -> Result<(), SessionError> {
        let mut local = self.local();
        if local.role.is_some() {
            return Err(SessionError::RoleAlreadyAssigned);
        }
        local.role = Some(role);
        tracing::info!("session role: {role}");
        Ok(())
    }

    /// Undo a role whose create/join the registry refused.
    fn clear_role(&self) {
        let mut local = self.local();
        local.role = None;
        local.room_code = None;
    }

    fn require_role(&self, required: Role) -> Result<(), SessionError> {
        match self.local().role {
            Some(role) if role == required => Ok(()),
            _ => Err(SessionError::WrongRole { required }),
        }
    }

    async fn submit_identity(&self, code: String, role: Role) -> Result<String, SessionError> {
        let mut ids = self.transport.local_id();
        let peer_id = ids
            .wait_for(|id| id.is_some())
            .await
            .map_err(|_| SessionError::PeerConnectFailure("transport closed before open".to_string()))?
            .clone()
            .ok_or_else(|| SessionError::PeerConnectFailure("no identifier assigned".to_string()))?;

        tracing::info!("sending {role} peer id {peer_id} for room {code}");
        self.send(ClientMessage::SendPeerId {
            code,
            peer_id: peer_id.clone(),
            role,
        })?;
        Ok(peer_id)
    }

    async fn connect_to_peer(&self, remote_peer_id: &str) -> Result<DataChannel, SessionError> {
        self.require_role(Role::Target)?;
        let channel = self.transport.connect(remote_peer_id).await?;
        tracing::info!("data connection open to {remote_peer_id}");
        self.emit(SessionEvent::DataChannelOpen {
            remote_peer_id: remote_peer_id.to_string(),
        });
        Ok(channel)
    }

    fn on_server_message(this: &Arc<Self>, msg: ServerMessage) {
        match msg {
            ServerMessage::RoomCreated { code } => {
                this.local().room_code = Some(code.clone());
                this.emit(SessionEvent::RoomCreated(code));
            }
            ServerMessage::RoomJoined { code } => {
                this.local().room_code = Some(code.clone());
                this.emit(SessionEvent::RoomJoined(code));
            }
            ServerMessage::ClientConnected => {
                tracing::info!("client joined the room");
                this.emit(SessionEvent::ClientConnected);
            }
            ServerMessage::PeerIdReceived { peer_id, from } => {
                tracing::info!("received peer id from {from}: {peer_id}");
                let is_target = this.local().role == Some(Role::Target);
                this.emit(SessionEvent::PeerIdReceived {
                    peer_id: peer_id.clone(),
                    from,
                });
                if is_target && from == Role::Client {
                    let inner = this.clone();
                    tokio::spawn(async move {
                        if let Err(e) = inner.connect_to_peer(&peer_id).await {
                            tracing::warn!("data connection to {peer_id} failed: {e}");
                        }
                    });
                }
            }
            ServerMessage::Signal { data } => this.emit(SessionEvent::Signal(data)),
            ServerMessage::PeerLeft { role } => {
                tracing::info!("{role} left the room");
                this.emit(SessionEvent::PeerLeft(role));
            }
            ServerMessage::Error { message } => {
                tracing::warn!("registry error: {message}");
                this.emit(SessionEvent::Error(message));
            }
        }
    }

    /// Target side: accept every inbound call without offering media and
    /// publish the caller's stream.
    async fn answer_calls(this: Arc<Self>, mut incoming: mpsc::Receiver<IncomingCall>) {
        while let Some(call) = incoming.recv().await {
            if this.local().role != Some(Role::Target) {
                tracing::debug!("ignoring call from {}, not the target", call.from);
                continue;
            }
            let from = call.from.clone();
            match call.answer(None).await {
                Ok(stream) => {
                    tracing::info!("received stream {} from {from}", stream.id);
                    this.local().remote_stream = Some(stream.clone());
                    this.emit(SessionEvent::Stream(stream));
                }
                Err(e) => tracing::warn!("call from {from} failed: {e}"),
            }
        }
    }
}

/// Errors the registry can answer `create_room` with.
const CREATE_ERRORS: &[&str] = &[error_message::ROLE_ASSIGNED, error_message::NO_CODES];

/// Errors the registry can answer `join_room` with.
const JOIN_ERRORS: &[&str] = &[
    error_message::INVALID_CODE,
    error_message::ROOM_FULL,
    error_message::ROLE_ASSIGNED,
];

/// Wait for the first event `pick` accepts, an error in `replies`, or the
/// timeout. Other errors belong to earlier requests and are skipped.
async fn await_reply<R>(
    events: &mut broadcast::Receiver<SessionEvent>,
    replies: &[&str],
    pick: impl Fn(&SessionEvent) -> Option<R>,
) -> Result<R, SessionError> {
    let wait = async {
        loop {
            match events.recv().await {
                Ok(SessionEvent::Error(message)) => {
                    if replies.contains(&message.as_str()) {
                        return Err(SessionError::from_wire(&message));
                    }
                    tracing::debug!("ignoring unrelated registry error: {message}");
                }
                Ok(SessionEvent::Disconnected) => {
                    return Err(SessionError::ControlChannel("connection closed".to_string()))
                }
                Ok(event) => {
                    if let Some(reply) = pick(&event) {
                        return Ok(reply);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!("session events lagged by {n}");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    return Err(SessionError::ControlChannel("connection closed".to_string()))
                }
            }
        }
    };
    tokio::time::timeout(REPLY_TIMEOUT, wait)
        .await
        .map_err(|_| SessionError::ControlChannel("registry did not reply".to_string()))?
}
