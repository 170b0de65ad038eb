use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use super::media::{CameraConstraints, CameraSource, FrameSource, SceneSink};
use super::next_event;
use crate::calibration::grid::DOT_POSITIONS;
use crate::calibration::{
    runner, CalibrationDirective, CalibrationError, CalibrationInputs, CalibrationSample,
    PinchEdge, PinchOutcome,
};
use crate::session::{MediaStream, PeerTransport, SessionClient, SessionError, SessionEvent};
use crate::tracking::landmarks::{Vec3, INDEX_TIP};
use crate::tracking::pinch::PinchDetector;
use crate::tracking::{TrackingAdapter, VideoFrame};

pub const STATUS_LINKED: &str = "Dual-Camera Linked";

pub type CalibrationTask = JoinHandle<Result<Vec<CalibrationSample>, CalibrationError>>;

/// The host side: owns the room and receives the client's camera.
pub struct TargetMode<T: PeerTransport> {
    session: Arc<SessionClient<T>>,
    events: broadcast::Receiver<SessionEvent>,
    code: String,
    local_stream: MediaStream,
}

impl<T: PeerTransport> TargetMode<T> {
    /// Open the local camera, create a room and publish our peer identifier.
    pub async fn start(
        session: Arc<SessionClient<T>>,
        camera: &impl CameraSource,
    ) -> Result<Self, SessionError> {
        let events = session.subscribe();
        let local_stream = camera.open(CameraConstraints::TARGET).await?;
        tracing::info!("local camera active: {}", local_stream.id);

        let code = session.create_room().await?;
        tracing::info!("room {code} ready, waiting for client");
        session.send_identity().await?;

        Ok(Self {
            session,
            events,
            code,
            local_stream,
        })
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn local_stream(&self) -> &MediaStream {
        &self.local_stream
    }

    pub fn session(&self) -> &Arc<SessionClient<T>> {
        &self.session
    }

    /// Wait until the client's stream arrives on an answered call.
    pub async fn wait_for_link(&mut self) -> Result<MediaStream, SessionError> {
        if let Some(stream) = self.session.remote_stream() {
            return Ok(stream);
        }
        loop {
            match next_event(&mut self.events).await? {
                SessionEvent::Stream(stream) => return Ok(stream),
                SessionEvent::ClientConnected => tracing::info!("client joined room {}", self.code),
                SessionEvent::Error(message) => return Err(SessionError::from_wire(&message)),
                _ => {}
            }
        }
    }

    /// Switch to the workspace and start calibration.
    pub fn activate<S: SceneSink>(
        &self,
        tracking: TrackingAdapter,
        mut scene: S,
    ) -> (Workspace<S>, CalibrationTask) {
        scene.show_workspace();
        scene.set_status(STATUS_LINKED);
        let (workspace, runner) = Workspace::new(tracking, scene);
        let task = tokio::spawn(runner.run());
        (workspace, task)
    }
}

/// Per-frame state of the target workspace.
pub struct Workspace<S: SceneSink> {
    tracking: TrackingAdapter,
    detector: PinchDetector,
    inputs: CalibrationInputs,
    directives: mpsc::UnboundedReceiver<CalibrationDirective>,
    scene: S,
}

impl<S: SceneSink> Workspace<S> {
    pub fn new(tracking: TrackingAdapter, scene: S) -> (Self, runner::CalibrationRunner) {
        let (inputs, runner, directives) = runner::channel();
        (
            Self {
                tracking,
                detector: PinchDetector::default(),
                inputs,
                directives,
                scene,
            },
            runner,
        )
    }

    pub fn scene(&self) -> &S {
        &self.scene
    }

    /// One render tick: feed the trackers, update the overlay, detect pinches
    /// and apply whatever the calibration asked for since the last tick.
    pub fn tick(&mut self, local: Option<&VideoFrame>, remote: Option<&VideoFrame>) {
        self.tracking.process_frame(local, remote);
        let result = self.tracking.latest_result();

        if let Some(pose) = &result.head_pose {
            self.scene.update_head_pose(pose);
        }

        if let Some(hand) = result.hand.clone() {
            self.inputs.set_hand_detected();

            let joints: Vec<Vec3> = hand.iter().map(|lm| lm.to_scene()).collect();
            self.scene.set_hand_joints(&joints);

            let update = self.detector.update_hand(Some(&hand[..]));
            if update.edge {
                match self.inputs.pinch(PinchEdge { tracking: result }) {
                    PinchOutcome::Busy => {
                        tracing::debug!("pinch edge dropped, previous edge not consumed yet")
                    }
                    PinchOutcome::Queued | PinchOutcome::Finished => {}
                }
            }

            if let Some(tip) = hand.get(INDEX_TIP) {
                self.scene.move_cursor(1.0 - tip.x, tip.y, update.pinching);
            }
        }

        while let Ok(directive) = self.directives.try_recv() {
            self.apply(directive);
        }
    }

    fn apply(&mut self, directive: CalibrationDirective) {
        match directive {
            CalibrationDirective::Status(text) => self.scene.set_status(&text),
            CalibrationDirective::ShowDots => self.scene.show_dots(&DOT_POSITIONS),
            CalibrationDirective::HighlightDot { index, active } => {
                self.scene.highlight_dot(index, active)
            }
            CalibrationDirective::Complete(samples) => {
                tracing::info!("collected {} calibration samples", samples.len());
                self.scene.calibration_complete(&samples);
            }
        }
    }

    /// Tick every `period` until `shutdown` resolves. Ticks never overlap.
    pub async fn run(
        mut self,
        mut frames: impl FrameSource,
        period: Duration,
        shutdown: impl std::future::Future<Output = ()>,
    ) -> Self {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = interval.tick() => {
                    let local = frames.local_frame();
                    let remote = frames.remote_frame();
                    self.tick(local.as_ref(), remote.as_ref());
                }
            }
        }
        self
    }
}
