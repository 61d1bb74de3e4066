//! # Radio Calibration State Machine
//!
//! Measures each radio channel's travel while the operator sweeps the
//! sticks, then derives per-channel scale and center values.
//!
//! The session is tick-driven: the owner advances it once per tick with the
//! freshest decoded channel values. The first stretch of the sampling window
//! is a settle period that flushes stale device-side scaled packets before
//! the start values are captured.

use tracing::{debug, info, warn};

use crate::link::packet::NUM_CHANNELS;
use crate::prefs::Preferences;

/// Ticks at the head of the sampling window before start values are captured
pub const CAPTURE_SETTLE_TICKS: u32 = 50;

/// Ideal full channel travel in raw units; scale maps measured travel onto it
const FULL_RANGE: f64 = 2048.0;

/// Unity channel scale in the device's fixed-point convention
const UNITY_SCALE: f64 = 1024.0;

/// Per-channel travel observed during one sampling session
#[derive(Debug, Clone, Copy, Default)]
struct ChannelSample {
    min: i16,
    max: i16,
    start: i16,
    moved: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    Reset,
    Sampling { remaining: u32 },
    Apply,
}

/// What the owner should do after a tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RadioCalEvent {
    /// Tell the device to clear its own scale/offset so sampling sees raw
    /// channel values
    RequestRawChannels,
    /// The session finished and wrote results into the live record; the
    /// record should be uploaded
    Applied { updated_channels: usize },
}

/// One radio calibration session.
///
/// Starting a new session cancels any prior one outright.
#[derive(Debug)]
pub struct RadioCalibration {
    state: State,
    samples: [ChannelSample; NUM_CHANNELS],
    sample_ticks: u32,
    move_threshold: i16,
}

impl RadioCalibration {
    pub fn new(sample_ticks: u32, move_threshold: i16) -> Self {
        Self {
            state: State::Idle,
            samples: [ChannelSample::default(); NUM_CHANNELS],
            sample_ticks,
            move_threshold,
        }
    }

    /// Begin a session, discarding any in-progress one
    pub fn start(&mut self) {
        if self.state != State::Idle {
            debug!("radio calibration restarted, discarding prior session");
        }
        self.state = State::Reset;
    }

    /// Abandon the session without touching the live record
    pub fn cancel(&mut self) {
        if self.state != State::Idle {
            info!("radio calibration cancelled");
        }
        self.state = State::Idle;
    }

    pub fn is_active(&self) -> bool {
        self.state != State::Idle
    }

    /// Sampling ticks left, for progress display
    pub fn remaining_ticks(&self) -> u32 {
        match self.state {
            State::Sampling { remaining } => remaining,
            _ => 0,
        }
    }

    /// Advance the session by one tick using the freshest channel values.
    pub fn tick(
        &mut self,
        channels: &[i16; NUM_CHANNELS],
        prefs: &mut Preferences,
    ) -> Option<RadioCalEvent> {
        match self.state {
            State::Idle => None,
            State::Reset => {
                self.samples = [ChannelSample::default(); NUM_CHANNELS];
                self.state = State::Sampling {
                    remaining: self.sample_ticks,
                };
                info!(
                    ticks = self.sample_ticks,
                    "radio calibration sampling started"
                );
                Some(RadioCalEvent::RequestRawChannels)
            }
            State::Sampling { remaining } => {
                let remaining = remaining - 1;
                let capture_tick = self.sample_ticks - CAPTURE_SETTLE_TICKS;

                if remaining == capture_tick {
                    for (sample, &value) in self.samples.iter_mut().zip(channels) {
                        sample.start = value;
                        sample.min = value;
                        sample.max = value;
                    }
                } else if remaining < capture_tick {
                    for (sample, &value) in self.samples.iter_mut().zip(channels) {
                        let delta = i32::from(value) - i32::from(sample.start);
                        if delta.abs() > i32::from(self.move_threshold) {
                            sample.moved = true;
                        }
                        sample.min = sample.min.min(value);
                        sample.max = sample.max.max(value);
                    }
                }

                self.state = if remaining == 0 {
                    State::Apply
                } else {
                    State::Sampling { remaining }
                };
                None
            }
            State::Apply => {
                let updated_channels = self.apply(prefs);
                self.state = State::Idle;
                info!(updated_channels, "radio calibration applied");
                Some(RadioCalEvent::Applied { updated_channels })
            }
        }
    }

    /// Write measured scale/center into the live record. Channels the
    /// operator never moved keep their existing calibration.
    fn apply(&self, prefs: &mut Preferences) -> usize {
        let mut updated = 0;

        for (i, sample) in self.samples.iter().enumerate() {
            if !sample.moved {
                continue;
            }

            let range = i32::from(sample.max) - i32::from(sample.min);
            if range == 0 {
                warn!(channel = i, "moved channel measured zero range, skipping");
                continue;
            }

            let magnitude = (UNITY_SCALE * FULL_RANGE / f64::from(range)).round() as i32;
            let magnitude = magnitude.min(i32::from(i16::MAX)) as i16;

            // Reversed channels stay reversed
            let scale = if prefs.channel_reversed(i) {
                -magnitude
            } else {
                magnitude
            };

            prefs.channel_scale[i] = scale;
            prefs.channel_center[i] =
                ((i32::from(sample.min) + i32::from(sample.max)) / 2) as i16;
            updated += 1;
        }

        updated
    }
}
