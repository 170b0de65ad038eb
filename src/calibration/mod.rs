pub mod grid;
pub mod machine;
pub mod runner;

pub use machine::{
    CalibrationDirective, CalibrationMachine, CalibrationSample, CalibrationState, PinchEdge,
};
pub use runner::{
    CalibrationError, CalibrationInputs, CalibrationRunner, PinchOutcome, SETTLE_DELAY,
};
