pub mod connection;
pub mod events;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use crate::rooms::RoomRegistry;
use crate::snowflake::ConnectionId;
use crate::state::AppState;
use events::{ClientMessage, ServerMessage};

pub async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut ws_sink, mut ws_stream) = socket.split();

    // Everything addressed to this connection, from its own requests or from the
    // other member of its room, goes through this channel so delivery stays FIFO.
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();
    let conn_id = state.registry.connect(tx);
    tracing::info!("connection {conn_id} opened");

    loop {
        tokio::select! {
            Some(msg) = rx.recv() => {
                if ws_sink.send(Message::Text(msg.to_json().into())).await.is_err() {
                    break;
                }
            }
            msg = ws_stream.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ClientMessage>(&text) {
                            Ok(client_msg) => handle_message(&state.registry, conn_id, client_msg),
                            Err(e) => tracing::warn!("undecodable message from {conn_id}: {e}"),
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        tracing::debug!("socket error on {conn_id}: {e}");
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    state.registry.disconnect(conn_id);
    tracing::info!("connection {conn_id} closed");
}

/// Apply one request to the registry. Failures are answered with an `error`
/// message on the requesting connection only.
pub fn handle_message(registry: &RoomRegistry, conn_id: ConnectionId, msg: ClientMessage) {
    let result = match msg {
        ClientMessage::CreateRoom => registry.create_room(conn_id).map(|_| ()),
        ClientMessage::JoinRoom { code } => registry.join_room(conn_id, code.trim()),
        ClientMessage::SendPeerId {
            code,
            peer_id,
            role,
        } => registry
            .relay_peer_id(conn_id, &code, &peer_id, role)
            .map(|_| ()),
        ClientMessage::Signal { code, data } => {
            registry.relay_signal(conn_id, &code, data).map(|_| ())
        }
    };

    if let Err(e) = result {
        tracing::debug!("request from {conn_id} rejected: {e}");
        registry.reply_error(conn_id, &e);
    }
}
