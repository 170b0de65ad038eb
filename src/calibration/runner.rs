use std::fmt;
use std::time::Duration;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};

use super::machine::{
    CalibrationDirective, CalibrationMachine, CalibrationSample, CalibrationState, PinchEdge,
};

/// Pause after each confirmed dot before the next one lights up.
pub const SETTLE_DELAY: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CalibrationError {
    /// The render loop dropped its input handles before calibration finished.
    InputClosed,
}

impl fmt::Display for CalibrationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CalibrationError::InputClosed => write!(f, "calibration input closed"),
        }
    }
}

impl std::error::Error for CalibrationError {}

/// Producer side, owned by the render loop.
#[derive(Debug, Clone)]
pub struct CalibrationInputs {
    hands: watch::Sender<bool>,
    pinches: mpsc::Sender<PinchEdge>,
}

impl CalibrationInputs {
    pub fn set_hand_detected(&self) {
        self.hands.send_if_modified(|detected| {
            let changed = !*detected;
            *detected = true;
            changed
        });
    }

    /// Offer a pinch edge. Dropped if an unconsumed edge is already waiting.
    pub fn pinch(&self, edge: PinchEdge) -> PinchOutcome {
        match self.pinches.try_send(edge) {
            Ok(()) => PinchOutcome::Queued,
            Err(TrySendError::Full(_)) => PinchOutcome::Busy,
            Err(TrySendError::Closed(_)) => PinchOutcome::Finished,
        }
    }
}

/// What happened to an offered pinch edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinchOutcome {
    Queued,
    /// The previous edge has not been consumed yet.
    Busy,
    /// No runner is listening anymore.
    Finished,
}

pub struct CalibrationRunner {
    hands: watch::Receiver<bool>,
    pinches: mpsc::Receiver<PinchEdge>,
    directives: mpsc::UnboundedSender<CalibrationDirective>,
    settle: Duration,
}

/// Wire up a runner, its inputs and the directive stream for the scene.
pub fn channel() -> (
    CalibrationInputs,
    CalibrationRunner,
    mpsc::UnboundedReceiver<CalibrationDirective>,
) {
    let (hands_tx, hands_rx) = watch::channel(false);
    let (pinch_tx, pinch_rx) = mpsc::channel(1);
    let (directive_tx, directive_rx) = mpsc::unbounded_channel();
    (
        CalibrationInputs {
            hands: hands_tx,
            pinches: pinch_tx,
        },
        CalibrationRunner {
            hands: hands_rx,
            pinches: pinch_rx,
            directives: directive_tx,
            settle: SETTLE_DELAY,
        },
        directive_rx,
    )
}

impl CalibrationRunner {
    pub fn with_settle_delay(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }

    /// Drive one calibration pass to completion and return the samples.
    pub async fn run(mut self) -> Result<Vec<CalibrationSample>, CalibrationError> {
        let mut machine = CalibrationMachine::new();
        self.emit(machine.start());

        self.hands
            .wait_for(|detected| *detected)
            .await
            .map_err(|_| CalibrationError::InputClosed)?;
        self.drain_pinches();
        self.emit(machine.on_hands_detected());

        while let CalibrationState::CalibratingDot(index) = machine.state() {
            loop {
                let edge = self
                    .pinches
                    .recv()
                    .await
                    .ok_or(CalibrationError::InputClosed)?;
                let directives = machine.on_pinch(&edge);
                if !directives.is_empty() {
                    self.emit(directives);
                    break;
                }
            }
            tracing::debug!("dot {} settling", index + 1);
            tokio::time::sleep(self.settle).await;

            // Edges that arrived while settling belong to the previous dot.
            self.drain_pinches();
            self.emit(machine.advance());
        }

        Ok(machine.samples().to_vec())
    }

    fn drain_pinches(&mut self) {
        let mut stale = 0;
        while self.pinches.try_recv().is_ok() {
            stale += 1;
        }
        if stale > 0 {
            tracing::debug!("discarded {stale} stale pinch edge(s)");
        }
    }

    fn emit(&self, directives: Vec<CalibrationDirective>) {
        for directive in directives {
            // The scene may be gone; calibration still runs to completion.
            let _ = self.directives.send(directive);
        }
    }
}
