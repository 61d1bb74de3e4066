//! # Calibration Procedures
//!
//! Operator-driven calibration state machines: radio channel range/reverse
//! detection and the ESC throttle range programming sequence.

pub mod radio;
pub mod throttle;

pub use radio::{RadioCalEvent, RadioCalibration};
pub use throttle::{AbortReason, AdvanceOutcome, ThrottleCalibration, ThrottleCycle};
