use clap::Parser;
use std::error::Error;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;

use auraserver::calibration::CalibrationSample;
use auraserver::config::Config;
use auraserver::modes::target::CalibrationTask;
use auraserver::modes::{
    run_client_mode, CameraConstraints, CameraSource, FrameSource, SceneSink, TargetMode,
    Workspace,
};
use auraserver::session::loopback::LoopbackNetwork;
use auraserver::session::{MediaStream, SessionClient, SessionError};
use auraserver::tracking::landmarks::{
    HeadPose, Landmark, Vec3, HAND_LANDMARK_COUNT, INDEX_TIP, LEFT_CHEEK, NOSE_TIP, RIGHT_CHEEK,
    THUMB_TIP,
};
use auraserver::tracking::{LandmarkExtractor, LandmarkPublisher, TrackingAdapter, VideoFrame};

const LINK_TIMEOUT: Duration = Duration::from_secs(10);

/// Pairs a target and a client through a running signaling server over the
/// in-process loopback transport, and optionally drives a synthetic
/// calibration pass on the target.
#[derive(Parser, Debug)]
#[command(name = "aura-pair", about = "Pair two loopback sessions through a signaling server", version)]
struct Cli {
    /// Control-channel URL. Defaults to AURA_SERVER_URL or ws://localhost:3000/ws.
    #[arg(long)]
    server: Option<String>,

    /// Run a calibration pass with a synthetic hand that pinches periodically.
    #[arg(long)]
    calibrate: bool,

    /// Render tick in milliseconds.
    #[arg(long, default_value_t = 16)]
    tick_ms: u64,

    /// Frames per open/closed half of the synthetic pinch cycle.
    #[arg(long, default_value_t = 20)]
    pinch_frames: u64,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "auraserver=info,aura_pair=info".into()),
        )
        .init();

    if let Err(e) = run(Cli::parse()).await {
        tracing::error!("{e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn Error>> {
    let server = cli.server.unwrap_or_else(|| Config::from_env().server_url);

    let network = LoopbackNetwork::new();
    let target_session = Arc::new(SessionClient::connect(&server, network.endpoint()).await?);
    let client_session = SessionClient::connect(&server, network.endpoint()).await?;
    target_session.transport().open();
    client_session.transport().open();

    let mut target = TargetMode::start(target_session.clone(), &SyntheticCamera("front")).await?;
    let code = target.code().to_string();
    println!("room code: {code}");

    let client = tokio::spawn(async move {
        let called = run_client_mode(&client_session, &SyntheticCamera("rear"), &code).await;
        (client_session, called)
    });

    let stream = tokio::time::timeout(LINK_TIMEOUT, target.wait_for_link())
        .await
        .map_err(|_| SessionError::PeerConnectFailure("no stream before timeout".to_string()))??;
    let (_client_session, called) = client.await?;
    println!("linked: target received {} from {}", stream.label, called?);

    if cli.calibrate {
        let tracking = TrackingAdapter::new(
            Box::new(SyntheticFace),
            Box::new(SyntheticHand {
                frame: 0,
                half_cycle: cli.pinch_frames.max(1),
            }),
        );
        let (workspace, task) = target.activate(tracking, ConsoleScene);
        let samples = calibrate(workspace, task, Duration::from_millis(cli.tick_ms.max(1))).await?;
        println!("calibration complete: {} samples", samples.len());
        println!("{}", serde_json::to_string_pretty(&samples)?);
    }

    Ok(())
}

/// Tick the workspace until the calibration task finishes, then return its samples.
async fn calibrate<S: SceneSink>(
    workspace: Workspace<S>,
    task: CalibrationTask,
    tick: Duration,
) -> Result<Vec<CalibrationSample>, Box<dyn Error>> {
    let (done_tx, done_rx) = oneshot::channel::<()>();
    let calibration = tokio::spawn(async move {
        let result = task.await;
        let _ = done_tx.send(());
        result
    });

    let mut workspace = workspace
        .run(SyntheticFrames { next_ts: 0 }, tick, async {
            let _ = done_rx.await;
        })
        .await;
    // Apply the final directives emitted just before the runner returned.
    workspace.tick(None, None);

    // Outer join, inner join, then the runner's own result.
    let samples = calibration.await???;
    Ok(samples)
}

struct SyntheticCamera(&'static str);

impl CameraSource for SyntheticCamera {
    async fn open(&self, constraints: CameraConstraints) -> Result<MediaStream, SessionError> {
        Ok(MediaStream::new(
            uuid::Uuid::new_v4().to_string(),
            format!("{} camera {}x{}", self.0, constraints.width, constraints.height),
        ))
    }
}

struct SyntheticFrames {
    next_ts: u64,
}

impl FrameSource for SyntheticFrames {
    fn local_frame(&mut self) -> Option<VideoFrame> {
        self.next_ts += 16;
        Some(VideoFrame {
            width: 1280,
            height: 720,
            timestamp_ms: self.next_ts,
            pixels: Arc::from(Vec::new()),
        })
    }

    fn remote_frame(&mut self) -> Option<VideoFrame> {
        None
    }
}

/// A face looking straight at the screen.
struct SyntheticFace;

impl LandmarkExtractor for SyntheticFace {
    fn send(&mut self, _frame: &VideoFrame, results: &LandmarkPublisher) {
        let mut face = vec![Landmark::new(0.5, 0.5, 0.0); RIGHT_CHEEK + 1];
        face[LEFT_CHEEK].x = 0.35;
        face[RIGHT_CHEEK].x = 0.65;
        face[NOSE_TIP].x = 0.5;
        results.publish(face);
    }
}

/// A hand that alternates between open and pinched every `half_cycle` frames.
struct SyntheticHand {
    frame: u64,
    half_cycle: u64,
}

impl LandmarkExtractor for SyntheticHand {
    fn send(&mut self, _frame: &VideoFrame, results: &LandmarkPublisher) {
        let pinched = (self.frame / self.half_cycle) % 2 == 1;
        self.frame += 1;

        let gap = if pinched { 0.01 } else { 0.12 };
        let mut hand = vec![Landmark::new(0.5, 0.6, 0.0); HAND_LANDMARK_COUNT];
        hand[THUMB_TIP] = Landmark::new(0.45, 0.5, 0.0);
        hand[INDEX_TIP] = Landmark::new(0.45 + gap, 0.5, 0.0);
        results.publish(hand);
    }
}

struct ConsoleScene;

impl SceneSink for ConsoleScene {
    fn set_status(&mut self, text: &str) {
        println!("status: {text}");
    }

    fn show_workspace(&mut self) {
        println!("workspace shown");
    }

    fn update_head_pose(&mut self, _pose: &HeadPose) {}

    fn set_hand_joints(&mut self, _joints: &[Vec3]) {}

    fn move_cursor(&mut self, _x: f32, _y: f32, _pinching: bool) {}

    fn show_dots(&mut self, positions: &[Vec3]) {
        println!("showing {} dots", positions.len());
    }

    fn highlight_dot(&mut self, index: usize, active: bool) {
        if active {
            println!("dot {} active", index + 1);
        }
    }

    fn calibration_complete(&mut self, samples: &[CalibrationSample]) {
        println!("scene received {} samples", samples.len());
    }
}
