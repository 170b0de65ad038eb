use super::media::{CameraConstraints, CameraSource};
use super::next_event;
use crate::gateway::events::Role;
use crate::session::{PeerTransport, SessionClient, SessionError, SessionEvent};

/// Join room `code` with the rear camera and call the target as soon as its
/// peer identifier arrives. Returns the identifier that was called.
pub async fn run_client_mode<T: PeerTransport>(
    session: &SessionClient<T>,
    camera: &impl CameraSource,
    code: &str,
) -> Result<String, SessionError> {
    let stream = camera.open(CameraConstraints::CLIENT).await?;
    tracing::info!("client camera acquired: {}", stream.id);

    // Subscribe first: a target identifier stored in the room arrives right after the join reply.
    let mut events = session.subscribe();
    session.join_room(code).await?;
    session.send_identity().await?;

    loop {
        match next_event(&mut events).await? {
            SessionEvent::PeerIdReceived {
                peer_id,
                from: Role::Target,
            } => {
                tracing::info!("target id received, calling with stream {}", stream.id);
                session.call_peer(&peer_id, stream).await?;
                return Ok(peer_id);
            }
            SessionEvent::PeerLeft(Role::Target) => {
                return Err(SessionError::PeerConnectFailure(
                    "target left before sharing its identifier".to_string(),
                ))
            }
            SessionEvent::Error(message) => return Err(SessionError::from_wire(&message)),
            _ => {}
        }
    }
}
