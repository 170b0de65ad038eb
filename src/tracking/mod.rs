pub mod landmarks;
pub mod pinch;

use std::sync::Arc;
use tokio::sync::watch;

use landmarks::{HeadPose, Landmark};

/// One decoded video frame. Pixel layout belongs to the extractor.
#[derive(Debug, Clone)]
pub struct VideoFrame {
    pub width: u32,
    pub height: u32,
    pub timestamp_ms: u64,
    pub pixels: Arc<[u8]>,
}

pub type Landmarks = Arc<[Landmark]>;

/// Write side of a landmark slot, handed to extractors.
#[derive(Debug, Clone)]
pub struct LandmarkPublisher {
    tx: Arc<watch::Sender<Option<Landmarks>>>,
}

impl LandmarkPublisher {
    fn channel() -> (Self, watch::Receiver<Option<Landmarks>>) {
        let (tx, rx) = watch::channel(None);
        (Self { tx: Arc::new(tx) }, rx)
    }

    /// Replace the current snapshot. An empty set clears it.
    pub fn publish(&self, landmarks: Vec<Landmark>) {
        let next = if landmarks.is_empty() {
            None
        } else {
            Some(Landmarks::from(landmarks))
        };
        self.tx.send_replace(next);
    }
}

/// A black-box landmark model (face mesh or hand tracker).
pub trait LandmarkExtractor: Send {
    /// Submit a frame. Must not block; results go to `results` whenever ready.
    fn send(&mut self, frame: &VideoFrame, results: &LandmarkPublisher);
}

/// Latest raw landmarks.
#[derive(Debug, Clone, Default)]
pub struct LandmarkSnapshot {
    pub face: Option<Landmarks>,
    pub hand: Option<Landmarks>,
}

/// Derived view consumed by the workspace and calibration.
#[derive(Debug, Clone, Default)]
pub struct TrackingResult {
    pub head_pose: Option<HeadPose>,
    pub hand: Option<Landmarks>,
    /// Head pose seen by the remote (client) camera, when a remote extractor is attached.
    pub remote_head_pose: Option<HeadPose>,
}

struct Slot {
    publisher: LandmarkPublisher,
    latest: watch::Receiver<Option<Landmarks>>,
}

impl Slot {
    fn new() -> Self {
        let (publisher, latest) = LandmarkPublisher::channel();
        Self { publisher, latest }
    }

    fn get(&self) -> Option<Landmarks> {
        self.latest.borrow().clone()
    }
}

/// Hands frames to the extractors; results arrive later through each slot's
/// [`LandmarkPublisher`].
pub struct TrackingAdapter {
    face: Box<dyn LandmarkExtractor>,
    hands: Box<dyn LandmarkExtractor>,
    remote_face: Option<Box<dyn LandmarkExtractor>>,
    face_slot: Slot,
    hand_slot: Slot,
    remote_face_slot: Slot,
}

impl TrackingAdapter {
    pub fn new(face: Box<dyn LandmarkExtractor>, hands: Box<dyn LandmarkExtractor>) -> Self {
        Self {
            face,
            hands,
            remote_face: None,
            face_slot: Slot::new(),
            hand_slot: Slot::new(),
            remote_face_slot: Slot::new(),
        }
    }

    /// Track the remote camera's face with a second, independent extractor.
    pub fn with_remote_face(mut self, extractor: Box<dyn LandmarkExtractor>) -> Self {
        self.remote_face = Some(extractor);
        self
    }

    /// Hand the current frames to the extractors. `None` means the source has
    /// no decodable frame yet and is skipped.
    pub fn process_frame(&mut self, local: Option<&VideoFrame>, remote: Option<&VideoFrame>) {
        if let Some(frame) = local {
            self.face.send(frame, &self.face_slot.publisher);
            self.hands.send(frame, &self.hand_slot.publisher);
        }
        if let (Some(frame), Some(extractor)) = (remote, self.remote_face.as_mut()) {
            extractor.send(frame, &self.remote_face_slot.publisher);
        }
    }

    pub fn latest_snapshot(&self) -> LandmarkSnapshot {
        LandmarkSnapshot {
            face: self.face_slot.get(),
            hand: self.hand_slot.get(),
        }
    }

    pub fn latest_result(&self) -> TrackingResult {
        let snapshot = self.latest_snapshot();
        TrackingResult {
            head_pose: snapshot.face.as_deref().and_then(HeadPose::estimate),
            hand: snapshot.hand,
            remote_head_pose: self
                .remote_face_slot
                .get()
                .as_deref()
                .and_then(HeadPose::estimate),
        }
    }
}
