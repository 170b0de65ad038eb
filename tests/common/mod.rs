#![allow(dead_code)]

use auraserver::routes;
use auraserver::state::AppState;
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

pub type Ws = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Test server with its own registry. Each instance is isolated.
pub struct TestServer {
    pub state: AppState,
}

impl TestServer {
    pub fn new() -> Self {
        Self {
            state: AppState::new(),
        }
    }

    /// Router wired to this server's state for `oneshot()` calls.
    pub fn router(&self) -> axum::Router {
        routes::router(self.state.clone())
    }

    /// Bind on port 0, serve in the background and return the control-channel URL.
    pub async fn spawn(&self) -> String {
        let app = self.router();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("ws://127.0.0.1:{}/ws", addr.port())
    }
}

pub fn test_app() -> axum::Router {
    TestServer::new().router()
}

pub async fn ws_connect(url: &str) -> Ws {
    let (ws, _) = connect_async(url).await.unwrap();
    ws
}

pub async fn send_json(ws: &mut Ws, value: serde_json::Value) {
    ws.send(Message::Text(value.to_string().into())).await.unwrap();
}

/// Next text frame as JSON. Panics after two seconds of silence.
pub async fn recv_json(ws: &mut Ws) -> serde_json::Value {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(2), ws.next())
            .await
            .expect("timed out waiting for a message")
            .expect("socket closed")
            .unwrap();
        if let Message::Text(text) = msg {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

/// Assert nothing arrives within a short window.
pub async fn assert_silent(ws: &mut Ws) {
    let next = tokio::time::timeout(Duration::from_millis(150), ws.next()).await;
    assert!(next.is_err(), "unexpected message: {next:?}");
}

/// Create a room on `ws` and return its code.
pub async fn create_room(ws: &mut Ws) -> String {
    send_json(ws, serde_json::json!({ "type": "create_room" })).await;
    let reply = recv_json(ws).await;
    assert_eq!(reply["type"], "room_created", "unexpected reply {reply}");
    reply["data"]["code"].as_str().unwrap().to_string()
}

pub async fn join_room(ws: &mut Ws, code: &str) -> serde_json::Value {
    send_json(
        ws,
        serde_json::json!({ "type": "join_room", "data": { "code": code } }),
    )
    .await;
    recv_json(ws).await
}

pub async fn send_peer_id(ws: &mut Ws, code: &str, peer_id: &str, role: &str) {
    send_json(
        ws,
        serde_json::json!({
            "type": "send_peer_id",
            "data": { "code": code, "peerId": peer_id, "role": role }
        }),
    )
    .await;
}
