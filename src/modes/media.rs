use std::future::Future;

use crate::calibration::CalibrationSample;
use crate::session::{MediaStream, SessionError};
use crate::tracking::landmarks::{HeadPose, Vec3};
use crate::tracking::VideoFrame;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Facing {
    User,
    Environment,
}

/// Preferred capture settings. Devices may deliver less.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CameraConstraints {
    pub width: u32,
    pub height: u32,
    pub frame_rate: Option<u32>,
    pub facing: Facing,
}

impl CameraConstraints {
    /// Front camera of the machine running the workspace.
    pub const TARGET: CameraConstraints = CameraConstraints {
        width: 1280,
        height: 720,
        frame_rate: None,
        facing: Facing::User,
    };

    /// Rear camera of the phone acting as the second viewpoint.
    pub const CLIENT: CameraConstraints = CameraConstraints {
        width: 1920,
        height: 1080,
        frame_rate: Some(60),
        facing: Facing::Environment,
    };
}

pub trait CameraSource: Send + Sync {
    /// Acquire a live stream. Permission refusal is [`SessionError::MediaAccessDenied`].
    fn open(
        &self,
        constraints: CameraConstraints,
    ) -> impl Future<Output = Result<MediaStream, SessionError>> + Send;
}

/// Latest decodable frames of the local camera and the linked remote stream.
pub trait FrameSource: Send {
    fn local_frame(&mut self) -> Option<VideoFrame>;
    fn remote_frame(&mut self) -> Option<VideoFrame>;
}

/// The 3D overlay and HUD of the target workspace.
pub trait SceneSink: Send {
    fn set_status(&mut self, text: &str);
    /// Swap the waiting room for the workspace.
    fn show_workspace(&mut self);
    fn update_head_pose(&mut self, pose: &HeadPose);
    /// Hand joints in scene space, in landmark order.
    fn set_hand_joints(&mut self, joints: &[Vec3]);
    /// Cursor in normalized screen coordinates, already mirrored.
    fn move_cursor(&mut self, x: f32, y: f32, pinching: bool);
    fn show_dots(&mut self, positions: &[Vec3]);
    fn highlight_dot(&mut self, index: usize, active: bool);
    fn calibration_complete(&mut self, _samples: &[CalibrationSample]) {}
}
