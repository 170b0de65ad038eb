pub mod client;
pub mod media;
pub mod target;

use tokio::sync::broadcast;

use crate::session::{SessionError, SessionEvent};

pub use client::run_client_mode;
pub use media::{CameraConstraints, CameraSource, Facing, FrameSource, SceneSink};
pub use target::{TargetMode, Workspace};

/// Next session event, skipping over lag. A closed control channel is an error.
pub(crate) async fn next_event(
    events: &mut broadcast::Receiver<SessionEvent>,
) -> Result<SessionEvent, SessionError> {
    loop {
        match events.recv().await {
            Ok(SessionEvent::Disconnected) | Err(broadcast::error::RecvError::Closed) => {
                return Err(SessionError::ControlChannel("connection closed".to_string()))
            }
            Ok(event) => return Ok(event),
            Err(broadcast::error::RecvError::Lagged(n)) => {
                tracing::warn!("mode event stream lagged by {n}");
            }
        }
    }
}
