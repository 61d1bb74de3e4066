//! # Throttle Calibration Sequencer
//!
//! Drives the device through the ESC range-programming ritual: start,
//! hold max throttle, release to minimum, settle. Each cycle advances only
//! on an explicit operator action, and the first two transitions carry
//! safety interlocks (propellers off, flight battery unplugged).
//!
//! The waits here are deliberate and ordered with respect to the command
//! just sent; the sequencer is meant to run on its own task so they never
//! stall telemetry decoding.

use tokio::time::{sleep, Duration, Instant};
use tracing::{info, warn};

use crate::error::Result;
use crate::link::Command;
use crate::serial::port_trait::PortIO;

/// Wait after the final finish marker while the ESCs beep out confirmation
pub const FINISH_SETTLE: Duration = Duration::from_secs(5);

/// How long an abort locks out the next attempt, forcing the warning to be
/// read
pub const ABORT_LOCKOUT: Duration = Duration::from_secs(3);

/// Position in the calibration ritual
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThrottleCycle {
    /// Nothing in progress
    Idle,
    /// Device told to enter calibration mode
    Started,
    /// Max-throttle marker sent; operator plugs the battery in
    MaxThrottle,
    /// First finish marker sent; one more advance completes the ritual
    Finishing,
}

/// Why an advance was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    /// Operator has not confirmed the propellers are off
    PropellersNotConfirmed,
    /// Battery voltage telemetry is nonzero; the flight battery must be
    /// unplugged before entering calibration
    BatteryConnected,
}

/// Result of one operator-driven advance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvanceOutcome {
    /// Moved to the given cycle; `Idle` here means the ritual completed
    Advanced(ThrottleCycle),
    /// Safety interlock tripped; the session was reset
    Aborted(AbortReason),
    /// A previous abort's lockout has not elapsed yet
    LockedOut,
}

#[derive(Debug)]
pub struct ThrottleCalibration {
    cycle: ThrottleCycle,
    lockout_until: Option<Instant>,
}

impl Default for ThrottleCalibration {
    fn default() -> Self {
        Self::new()
    }
}

impl ThrottleCalibration {
    pub fn new() -> Self {
        Self {
            cycle: ThrottleCycle::Idle,
            lockout_until: None,
        }
    }

    pub fn cycle(&self) -> ThrottleCycle {
        self.cycle
    }

    /// True while the ritual is in progress. The owner suppresses
    /// heartbeats while this holds: the device is interpreting single
    /// bytes, and a heartbeat would be read as throttle control data.
    pub fn is_active(&self) -> bool {
        self.cycle != ThrottleCycle::Idle
    }

    fn locked_out(&self) -> bool {
        self.lockout_until
            .is_some_and(|until| Instant::now() < until)
    }

    fn abort(&mut self, reason: AbortReason) -> AdvanceOutcome {
        warn!(?reason, "throttle calibration aborted");
        self.cycle = ThrottleCycle::Idle;
        self.lockout_until = Some(Instant::now() + ABORT_LOCKOUT);
        AdvanceOutcome::Aborted(reason)
    }

    /// Advance one cycle on an explicit operator action.
    ///
    /// `propellers_confirmed` is the operator's acknowledgment that the
    /// propellers are removed; `battery_volts` is the latest battery
    /// telemetry reading.
    pub async fn advance<P: PortIO>(
        &mut self,
        port: &mut P,
        propellers_confirmed: bool,
        battery_volts: i16,
    ) -> Result<AdvanceOutcome> {
        if self.locked_out() {
            return Ok(AdvanceOutcome::LockedOut);
        }

        let outcome = match self.cycle {
            ThrottleCycle::Idle => {
                if !propellers_confirmed {
                    self.abort(AbortReason::PropellersNotConfirmed)
                } else {
                    port.write_all(&Command::StartThrottleCalibration.encode())
                        .await?;
                    self.cycle = ThrottleCycle::Started;
                    info!("throttle calibration started");
                    AdvanceOutcome::Advanced(self.cycle)
                }
            }
            ThrottleCycle::Started => {
                if battery_volts != 0 {
                    // Escape so the device leaves calibration mode too
                    port.write_all(&Command::ThrottleFinish.encode()).await?;
                    self.abort(AbortReason::BatteryConnected)
                } else {
                    port.write_all(&Command::ThrottleMax.encode()).await?;
                    self.cycle = ThrottleCycle::MaxThrottle;
                    AdvanceOutcome::Advanced(self.cycle)
                }
            }
            ThrottleCycle::MaxThrottle => {
                port.write_all(&Command::ThrottleFinish.encode()).await?;
                self.cycle = ThrottleCycle::Finishing;
                AdvanceOutcome::Advanced(self.cycle)
            }
            ThrottleCycle::Finishing => {
                port.write_all(&Command::ThrottleFinish.encode()).await?;
                // Hold here while the ESCs beep out their confirmation
                sleep(FINISH_SETTLE).await;
                self.cycle = ThrottleCycle::Idle;
                info!("throttle calibration complete");
                AdvanceOutcome::Advanced(self.cycle)
            }
        };

        Ok(outcome)
    }

    /// Drop out of the ritual immediately, telling the device to escape.
    pub async fn cancel<P: PortIO>(&mut self, port: &mut P) -> Result<()> {
        if self.cycle == ThrottleCycle::Idle {
            return Ok(());
        }
        port.write_all(&Command::ThrottleFinish.encode()).await?;
        self.cycle = ThrottleCycle::Idle;
        info!("throttle calibration cancelled");
        Ok(())
    }
}
