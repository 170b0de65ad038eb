use serde::Serialize;

use super::grid::{dot_position, DOT_COUNT};
use crate::tracking::landmarks::{HeadPose, Vec3, INDEX_TIP};
use crate::tracking::TrackingResult;

pub const STATUS_AWAITING_HANDS: &str = "Show your hands to begin";
pub const STATUS_LOOK_AND_PINCH: &str = "Look at the dots and pinch";
pub const STATUS_COMPLETE: &str = "Calibration Complete";

pub fn dot_status(index: usize) -> String {
    format!("Calibrating Dot {}/{DOT_COUNT}", index + 1)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibrationState {
    AwaitingHands,
    CalibratingDot(usize),
    Complete,
}

/// What was observed when a dot was confirmed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CalibrationSample {
    pub dot_index: usize,
    pub dot_position: Vec3,
    pub head_pose: Option<HeadPose>,
    /// Index fingertip in scene space.
    pub fingertip: Option<Vec3>,
    pub remote_head_pose: Option<HeadPose>,
}

/// A pinch rising edge together with the tracking state at that instant.
#[derive(Debug, Clone, Default)]
pub struct PinchEdge {
    pub tracking: TrackingResult,
}

/// Instructions for the scene, applied by the render loop.
#[derive(Debug, Clone, PartialEq)]
pub enum CalibrationDirective {
    Status(String),
    ShowDots,
    HighlightDot { index: usize, active: bool },
    Complete(Vec<CalibrationSample>),
}

/// Pure calibration state machine. Time and input delivery are the runner's job.
#[derive(Debug)]
pub struct CalibrationMachine {
    state: CalibrationState,
    settling: bool,
    samples: Vec<CalibrationSample>,
}

impl Default for CalibrationMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl CalibrationMachine {
    pub fn new() -> Self {
        Self {
            state: CalibrationState::AwaitingHands,
            settling: false,
            samples: Vec::with_capacity(DOT_COUNT),
        }
    }

    pub fn state(&self) -> CalibrationState {
        self.state
    }

    /// True while dots are on screen.
    pub fn is_active(&self) -> bool {
        matches!(self.state, CalibrationState::CalibratingDot(_))
    }

    pub fn current_dot(&self) -> Option<usize> {
        match self.state {
            CalibrationState::CalibratingDot(i) => Some(i),
            _ => None,
        }
    }

    /// True between a confirmed pinch and the following `advance`.
    pub fn is_settling(&self) -> bool {
        self.settling
    }

    pub fn samples(&self) -> &[CalibrationSample] {
        &self.samples
    }

    pub fn start(&self) -> Vec<CalibrationDirective> {
        vec![CalibrationDirective::Status(STATUS_AWAITING_HANDS.to_string())]
    }

    pub fn on_hands_detected(&mut self) -> Vec<CalibrationDirective> {
        if self.state != CalibrationState::AwaitingHands {
            return Vec::new();
        }
        self.state = CalibrationState::CalibratingDot(0);
        tracing::info!("hands detected, starting dot calibration");
        vec![
            CalibrationDirective::Status(STATUS_LOOK_AND_PINCH.to_string()),
            CalibrationDirective::ShowDots,
            CalibrationDirective::HighlightDot {
                index: 0,
                active: true,
            },
            CalibrationDirective::Status(dot_status(0)),
        ]
    }

    /// Confirm the current dot. Ignored outside a dot stage or while settling.
    pub fn on_pinch(&mut self, edge: &PinchEdge) -> Vec<CalibrationDirective> {
        let CalibrationState::CalibratingDot(index) = self.state else {
            return Vec::new();
        };
        if self.settling {
            return Vec::new();
        }
        self.settling = true;
        self.samples.push(sample(index, &edge.tracking));
        tracing::debug!("dot {} confirmed", index + 1);
        vec![CalibrationDirective::HighlightDot {
            index,
            active: false,
        }]
    }

    /// Move past a confirmed dot once its settle delay has elapsed.
    pub fn advance(&mut self) -> Vec<CalibrationDirective> {
        let CalibrationState::CalibratingDot(index) = self.state else {
            return Vec::new();
        };
        if !self.settling {
            return Vec::new();
        }
        self.settling = false;

        let next = index + 1;
        if next < DOT_COUNT {
            self.state = CalibrationState::CalibratingDot(next);
            vec![
                CalibrationDirective::HighlightDot {
                    index: next,
                    active: true,
                },
                CalibrationDirective::Status(dot_status(next)),
            ]
        } else {
            self.state = CalibrationState::Complete;
            tracing::info!("calibration complete with {} samples", self.samples.len());
            vec![
                CalibrationDirective::Status(STATUS_COMPLETE.to_string()),
                CalibrationDirective::Complete(self.samples.clone()),
            ]
        }
    }
}

fn sample(dot_index: usize, tracking: &TrackingResult) -> CalibrationSample {
    CalibrationSample {
        dot_index,
        dot_position: dot_position(dot_index).unwrap_or_default(),
        head_pose: tracking.head_pose,
        fingertip: tracking
            .hand
            .as_deref()
            .and_then(|hand| hand.get(INDEX_TIP))
            .map(|tip| tip.to_scene()),
        remote_head_pose: tracking.remote_head_pose,
    }
}
