use crate::tracking::landmarks::Vec3;

pub const DOT_COUNT: usize = 9;

const fn at(x: f32, y: f32) -> Vec3 {
    Vec3 { x, y, z: 0.0 }
}

/// Scene-space dot positions, left to right then top to bottom.
pub const DOT_POSITIONS: [Vec3; DOT_COUNT] = [
    at(-4.0, 3.0),
    at(0.0, 3.0),
    at(4.0, 3.0),
    at(-4.0, 0.0),
    at(0.0, 0.0),
    at(4.0, 0.0),
    at(-4.0, -3.0),
    at(0.0, -3.0),
    at(4.0, -3.0),
];

pub fn dot_position(index: usize) -> Option<Vec3> {
    DOT_POSITIONS.get(index).copied()
}
