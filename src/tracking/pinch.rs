use super::landmarks::{Landmark, INDEX_TIP, THUMB_TIP};

/// Fingertip distance (normalized image units) below which the hand is pinching.
pub const PINCH_THRESHOLD: f32 = 0.04;

/// Thumb-tip to index-tip distance, if the hand has both points.
pub fn pinch_distance(hand: &[Landmark]) -> Option<f32> {
    let index = hand.get(INDEX_TIP)?;
    let thumb = hand.get(THUMB_TIP)?;
    Some(index.distance_2d(thumb))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PinchUpdate {
    pub pinching: bool,
    /// True only on the tick the distance first drops below the threshold.
    pub edge: bool,
}

/// Rising-edge detector over a stream of fingertip distances.
#[derive(Debug, Clone)]
pub struct PinchDetector {
    threshold: f32,
    was_pinching: bool,
}

impl Default for PinchDetector {
    fn default() -> Self {
        Self::new(PINCH_THRESHOLD)
    }
}

impl PinchDetector {
    pub fn new(threshold: f32) -> Self {
        Self {
            threshold,
            was_pinching: false,
        }
    }

    pub fn is_pinching(&self) -> bool {
        self.was_pinching
    }

    /// Feed one tick. A tick without a hand keeps the previous pinch state.
    pub fn update(&mut self, distance: Option<f32>) -> PinchUpdate {
        let Some(distance) = distance else {
            return PinchUpdate::default();
        };
        let pinching = distance < self.threshold;
        let edge = pinching && !self.was_pinching;
        self.was_pinching = pinching;
        PinchUpdate { pinching, edge }
    }

    pub fn update_hand(&mut self, hand: Option<&[Landmark]>) -> PinchUpdate {
        self.update(hand.and_then(pinch_distance))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edges_fire_only_on_entry_below_threshold() {
        let mut detector = PinchDetector::new(0.04);
        let edges: Vec<usize> = [0.1, 0.02, 0.02, 0.05, 0.01]
            .into_iter()
            .enumerate()
            .filter(|(_, d)| detector.update(Some(*d)).edge)
            .map(|(i, _)| i)
            .collect();
        assert_eq!(edges, vec![1, 4]);
    }

    #[test]
    fn test_missing_hand_keeps_state() {
        let mut detector = PinchDetector::default();
        assert!(detector.update(Some(0.01)).edge);
        assert_eq!(detector.update(None), PinchUpdate::default());
        assert!(detector.is_pinching());
        assert!(!detector.update(Some(0.01)).edge);
    }

    #[test]
    fn test_distance_uses_thumb_and_index_tips() {
        let mut hand = vec![Landmark::default(); 21];
        hand[THUMB_TIP] = Landmark::new(0.40, 0.50, 0.0);
        hand[INDEX_TIP] = Landmark::new(0.43, 0.54, 0.3);
        let d = pinch_distance(&hand).unwrap();
        assert!((d - 0.05).abs() < 1e-6);
        assert!(pinch_distance(&hand[..5]).is_none());
    }

    #[test]
    fn test_threshold_is_exclusive() {
        let mut detector = PinchDetector::new(0.04);
        assert!(!detector.update(Some(0.04)).pinching);
    }
}
