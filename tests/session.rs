mod common;

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

use auraserver::gateway::events::Role;
use auraserver::modes::{run_client_mode, CameraConstraints, CameraSource, TargetMode};
use auraserver::session::loopback::{LoopbackNetwork, LoopbackTransport};
use auraserver::session::{MediaStream, SessionClient, SessionError, SessionEvent};

struct TestCamera {
    allow: bool,
}

impl CameraSource for TestCamera {
    async fn open(&self, constraints: CameraConstraints) -> Result<MediaStream, SessionError> {
        if !self.allow {
            return Err(SessionError::MediaAccessDenied("permission denied".into()));
        }
        Ok(MediaStream::new(
            format!("cam-{}x{}", constraints.width, constraints.height),
            "test camera",
        ))
    }
}

async fn session(url: &str, network: &LoopbackNetwork) -> SessionClient<LoopbackTransport> {
    let session = SessionClient::connect(url, network.endpoint()).await.unwrap();
    session.transport().open();
    session
}

async fn expect_event(
    events: &mut broadcast::Receiver<SessionEvent>,
    pick: impl Fn(&SessionEvent) -> bool,
) -> SessionEvent {
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            let event = events.recv().await.unwrap();
            if pick(&event) {
                return event;
            }
        }
    })
    .await
    .expect("timed out waiting for session event")
}

#[tokio::test]
async fn test_identities_exchanged_end_to_end() {
    let url = common::TestServer::new().spawn().await;
    let network = LoopbackNetwork::new();
    let target = session(&url, &network).await;
    let client = session(&url, &network).await;
    let mut target_events = target.subscribe();
    let mut client_events = client.subscribe();

    let code = target.create_room().await.unwrap();
    assert_eq!(target.role(), Some(Role::Target));
    assert_eq!(target.room_code().as_deref(), Some(code.as_str()));

    client.join_room(&code).await.unwrap();
    expect_event(&mut target_events, |e| *e == SessionEvent::ClientConnected).await;

    let target_id = target.send_identity().await.unwrap();
    let client_id = client.send_identity().await.unwrap();

    let got = expect_event(&mut target_events, |e| {
        matches!(e, SessionEvent::PeerIdReceived { .. })
    })
    .await;
    assert_eq!(
        got,
        SessionEvent::PeerIdReceived {
            peer_id: client_id.clone(),
            from: Role::Client
        }
    );
    let got = expect_event(&mut client_events, |e| {
        matches!(e, SessionEvent::PeerIdReceived { .. })
    })
    .await;
    assert_eq!(
        got,
        SessionEvent::PeerIdReceived {
            peer_id: target_id,
            from: Role::Target
        }
    );

    // The target opens its data channel as soon as the client's id arrives.
    let opened = expect_event(&mut target_events, |e| {
        matches!(e, SessionEvent::DataChannelOpen { .. })
    })
    .await;
    assert_eq!(
        opened,
        SessionEvent::DataChannelOpen {
            remote_peer_id: client_id
        }
    );
}

#[tokio::test]
async fn test_second_client_is_told_room_full() {
    let url = common::TestServer::new().spawn().await;
    let network = LoopbackNetwork::new();
    let target = session(&url, &network).await;
    let first = session(&url, &network).await;
    let second = session(&url, &network).await;

    let code = target.create_room().await.unwrap();
    first.join_room(&code).await.unwrap();
    assert_eq!(second.join_room(&code).await, Err(SessionError::RoomFull));
    assert_eq!(second.role(), None);
    assert_eq!(second.room_code(), None);
}

#[tokio::test]
async fn test_unknown_code_is_room_not_found() {
    let url = common::TestServer::new().spawn().await;
    let network = LoopbackNetwork::new();
    let client = session(&url, &network).await;
    assert_eq!(
        client.join_room("1000").await,
        Err(SessionError::RoomNotFound)
    );

    // A refused join leaves the session free to try again.
    let target = session(&url, &network).await;
    let code = target.create_room().await.unwrap();
    client.join_room(&code).await.unwrap();
}

#[tokio::test]
async fn test_role_scoped_actions() {
    let url = common::TestServer::new().spawn().await;
    let network = LoopbackNetwork::new();
    let target = session(&url, &network).await;
    let client = session(&url, &network).await;

    assert_eq!(client.send_identity().await, Err(SessionError::NoRoom));

    let code = target.create_room().await.unwrap();
    assert_eq!(
        target.join_room(&code).await,
        Err(SessionError::RoleAlreadyAssigned)
    );
    client.join_room(&code).await.unwrap();

    assert_eq!(
        client.connect_to_peer("anyone").await,
        Err(SessionError::WrongRole {
            required: Role::Target
        })
    );
    assert_eq!(
        target
            .call_peer("anyone", MediaStream::new("s", "l"))
            .await,
        Err(SessionError::WrongRole {
            required: Role::Client
        })
    );

    client.send_identity().await.unwrap();
    assert_eq!(
        client.send_identity().await,
        Err(SessionError::IdentityAlreadySent)
    );
}

#[tokio::test]
async fn test_signal_round_trip() {
    let url = common::TestServer::new().spawn().await;
    let network = LoopbackNetwork::new();
    let target = session(&url, &network).await;
    let client = session(&url, &network).await;
    let mut target_events = target.subscribe();

    let code = target.create_room().await.unwrap();
    client.join_room(&code).await.unwrap();
    client.signal(serde_json::json!({ "ice": "candidate" })).unwrap();

    let got = expect_event(&mut target_events, |e| matches!(e, SessionEvent::Signal(_))).await;
    assert_eq!(
        got,
        SessionEvent::Signal(serde_json::json!({ "ice": "candidate" }))
    );
}

#[tokio::test]
async fn test_dropped_client_is_reported_to_target() {
    let url = common::TestServer::new().spawn().await;
    let network = LoopbackNetwork::new();
    let target = session(&url, &network).await;
    let client = session(&url, &network).await;
    let mut target_events = target.subscribe();

    let code = target.create_room().await.unwrap();
    client.join_room(&code).await.unwrap();
    drop(client);

    let got = expect_event(&mut target_events, |e| matches!(e, SessionEvent::PeerLeft(_))).await;
    assert_eq!(got, SessionEvent::PeerLeft(Role::Client));
}

#[tokio::test]
async fn test_modes_link_client_camera_to_target() {
    let url = common::TestServer::new().spawn().await;
    let network = LoopbackNetwork::new();
    let target_session = Arc::new(session(&url, &network).await);
    let client_session = session(&url, &network).await;

    let mut target = TargetMode::start(target_session.clone(), &TestCamera { allow: true })
        .await
        .unwrap();
    assert_eq!(target.local_stream().id, "cam-1280x720");

    let code = target.code().to_string();
    let client = tokio::spawn(async move {
        let called = run_client_mode(&client_session, &TestCamera { allow: true }, &code).await;
        (client_session, called)
    });

    let stream = tokio::time::timeout(Duration::from_secs(2), target.wait_for_link())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stream.id, "cam-1920x1080");
    assert_eq!(target_session.remote_stream(), Some(stream));

    let (_client_session, called) = client.await.unwrap();
    assert_eq!(called.unwrap(), target_session.transport().open());
}

#[tokio::test]
async fn test_camera_denial_is_typed_and_creates_no_room() {
    let server = common::TestServer::new();
    let url = server.spawn().await;
    let network = LoopbackNetwork::new();
    let target_session = Arc::new(session(&url, &network).await);

    let result = TargetMode::start(target_session.clone(), &TestCamera { allow: false }).await;
    assert!(matches!(result, Err(SessionError::MediaAccessDenied(_))));
    assert_eq!(server.state.registry.room_count(), 0);
    assert_eq!(target_session.role(), None);
}
