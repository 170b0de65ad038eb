use dashmap::DashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, watch};

use super::error::SessionError;
use super::transport::{DataChannel, IncomingCall, MediaStream, PeerTransport};

const INCOMING_CAPACITY: usize = 8;

/// In-process peer network. Endpoints reach each other by identifier and a
/// call hands the caller's stream straight to the callee.
#[derive(Clone, Default)]
pub struct LoopbackNetwork {
    endpoints: Arc<DashMap<String, mpsc::Sender<IncomingCall>>>,
}

impl LoopbackNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// A new endpoint without an identifier; call [`LoopbackTransport::open`] to assign one.
    pub fn endpoint(&self) -> LoopbackTransport {
        let (id_tx, _) = watch::channel(None);
        let (incoming_tx, incoming_rx) = mpsc::channel(INCOMING_CAPACITY);
        LoopbackTransport {
            network: self.clone(),
            id_tx,
            incoming_tx,
            incoming_rx: Mutex::new(Some(incoming_rx)),
        }
    }

    fn lookup(&self, remote: &str) -> Result<mpsc::Sender<IncomingCall>, SessionError> {
        self.endpoints
            .get(remote)
            .map(|tx| tx.clone())
            .ok_or_else(|| SessionError::PeerConnectFailure(format!("unknown peer {remote}")))
    }
}

pub struct LoopbackTransport {
    network: LoopbackNetwork,
    id_tx: watch::Sender<Option<String>>,
    incoming_tx: mpsc::Sender<IncomingCall>,
    incoming_rx: Mutex<Option<mpsc::Receiver<IncomingCall>>>,
}

impl LoopbackTransport {
    /// Register on the network under a fresh identifier. Idempotent.
    pub fn open(&self) -> String {
        if let Some(id) = self.id_tx.borrow().clone() {
            return id;
        }
        let id = uuid::Uuid::new_v4().to_string();
        self.network
            .endpoints
            .insert(id.clone(), self.incoming_tx.clone());
        self.id_tx.send_replace(Some(id.clone()));
        tracing::debug!("loopback endpoint {id} open");
        id
    }
}

impl Drop for LoopbackTransport {
    fn drop(&mut self) {
        if let Some(id) = self.id_tx.borrow().as_ref() {
            self.network.endpoints.remove(id);
        }
    }
}

impl PeerTransport for LoopbackTransport {
    fn local_id(&self) -> watch::Receiver<Option<String>> {
        self.id_tx.subscribe()
    }

    async fn connect(&self, remote: &str) -> Result<DataChannel, SessionError> {
        self.network.lookup(remote)?;
        Ok(DataChannel {
            remote_peer_id: remote.to_string(),
        })
    }

    async fn call(&self, remote: &str, stream: MediaStream) -> Result<(), SessionError> {
        let callee = self.network.lookup(remote)?;
        let from = self
            .id_tx
            .borrow()
            .clone()
            .ok_or_else(|| SessionError::PeerConnectFailure("endpoint not open".to_string()))?;

        let (call, pending) = IncomingCall::new(from);
        callee
            .send(call)
            .await
            .map_err(|_| SessionError::PeerConnectFailure(format!("peer {remote} went away")))?;
        // A callee that drops the call without answering simply never sees the stream.
        let _ = pending.stream_tx.send(stream);
        Ok(())
    }

    fn take_incoming(&self) -> Option<mpsc::Receiver<IncomingCall>> {
        self.incoming_rx
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
    }
}
