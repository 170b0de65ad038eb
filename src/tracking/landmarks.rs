use serde::{Deserialize, Serialize};

/// Face-mesh index of the nose tip.
pub const NOSE_TIP: usize = 1;
/// Face-mesh indices of the outer cheek points.
pub const LEFT_CHEEK: usize = 234;
pub const RIGHT_CHEEK: usize = 454;
/// Multiplier from normalized nose offset to yaw radians.
pub const YAW_SCALE: f32 = 5.0;
/// Below this absolute yaw the head counts as facing the screen.
pub const ALIGNED_YAW: f32 = 0.2;

pub const HAND_LANDMARK_COUNT: usize = 21;
pub const THUMB_TIP: usize = 4;
pub const INDEX_TIP: usize = 8;

/// Half-extent of the scene cube normalized coordinates are stretched over.
pub const SCENE_SCALE: f32 = 10.0;

/// A landmark in normalized image coordinates (x, y in `[0, 1]`, z relative depth).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Landmark {
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Planar distance, ignoring depth.
    pub fn distance_2d(&self, other: &Landmark) -> f32 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    /// Position in scene space: mirrored horizontally, y up, depth toward the camera.
    pub fn to_scene(&self) -> Vec3 {
        Vec3 {
            x: (0.5 - self.x) * SCENE_SCALE,
            y: (0.5 - self.y) * SCENE_SCALE,
            z: -self.z * SCENE_SCALE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

/// Rough head orientation. Only yaw is estimated.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct HeadPose {
    pub rotation: Vec3,
    pub translation: Vec3,
}

impl HeadPose {
    /// Yaw from the nose tip's horizontal offset to the midpoint of the cheeks.
    /// `None` when the mesh is too short to hold the reference points.
    pub fn estimate(face: &[Landmark]) -> Option<HeadPose> {
        let nose = face.get(NOSE_TIP)?;
        let left = face.get(LEFT_CHEEK)?;
        let right = face.get(RIGHT_CHEEK)?;

        let mid_x = (left.x + right.x) / 2.0;
        let yaw = (nose.x - mid_x) * YAW_SCALE;

        Some(HeadPose {
            rotation: Vec3 {
                x: 0.0,
                y: yaw,
                z: 0.0,
            },
            translation: Vec3::default(),
        })
    }

    pub fn yaw(&self) -> f32 {
        self.rotation.y
    }

    pub fn is_aligned(&self) -> bool {
        self.yaw().abs() < ALIGNED_YAW
    }
}
