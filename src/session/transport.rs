use std::future::Future;
use tokio::sync::{mpsc, oneshot, watch};

use super::error::SessionError;

/// Opaque handle to a live audio/video stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaStream {
    pub id: String,
    pub label: String,
}

impl MediaStream {
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
        }
    }
}

/// An open bidirectional data channel to a remote endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataChannel {
    pub remote_peer_id: String,
}

/// A call offered by a remote endpoint.
#[derive(Debug)]
pub struct IncomingCall {
    pub from: String,
    answer_tx: oneshot::Sender<Option<MediaStream>>,
    stream_rx: oneshot::Receiver<MediaStream>,
}

/// Transport-side half of an [`IncomingCall`].
#[derive(Debug)]
pub struct PendingCall {
    /// Resolves with the callee's local media once the call is answered.
    pub answer_rx: oneshot::Receiver<Option<MediaStream>>,
    /// Deliver the caller's stream to the callee.
    pub stream_tx: oneshot::Sender<MediaStream>,
}

impl IncomingCall {
    pub fn new(from: impl Into<String>) -> (Self, PendingCall) {
        let (answer_tx, answer_rx) = oneshot::channel();
        let (stream_tx, stream_rx) = oneshot::channel();
        (
            Self {
                from: from.into(),
                answer_tx,
                stream_rx,
            },
            PendingCall {
                answer_rx,
                stream_tx,
            },
        )
    }

    /// Accept the call, optionally offering local media, and wait for the
    /// caller's stream.
    pub async fn answer(self, local: Option<MediaStream>) -> Result<MediaStream, SessionError> {
        // The caller may have stopped listening for our answer; its stream can still arrive.
        let _ = self.answer_tx.send(local);
        self.stream_rx.await.map_err(|_| {
            SessionError::PeerConnectFailure(format!("call from {} ended without a stream", self.from))
        })
    }
}

/// Peer-to-peer media/data endpoint. Negotiation stays behind this trait.
pub trait PeerTransport: Send + Sync + 'static {
    /// This endpoint's identifier; `None` until the transport broker assigns one.
    fn local_id(&self) -> watch::Receiver<Option<String>>;

    /// Open a data channel to `remote`.
    fn connect(&self, remote: &str) -> impl Future<Output = Result<DataChannel, SessionError>> + Send;

    /// Place a media call carrying `stream`. Returns once the call is offered.
    fn call(
        &self,
        remote: &str,
        stream: MediaStream,
    ) -> impl Future<Output = Result<(), SessionError>> + Send;

    /// Inbound calls. Yields `Some` only on the first call.
    fn take_incoming(&self) -> Option<mpsc::Receiver<IncomingCall>>;
}
