//! # Preferences Codec
//!
//! The complete device-tunable settings record exchanged between the ground
//! station and the flight controller, with its byte-level wire layout and
//! checksum.
//!
//! The layout is a versioned contract: both ends must serialize the same
//! fields in the same order and compute the same checksum bit-for-bit.
//! The firmware version that defines the layout travels in the debug frame.

pub mod transfer;

use crate::error::{FcLinkError, Result};
use crate::link::packet::NUM_CHANNELS;

/// Serialized size of [`Preferences`] in bytes. Must stay a multiple of 4:
/// the upload protocol sends 4-byte chunks and the checksum runs over
/// 32-bit words.
pub const PREFS_SIZE: usize = 180;

/// Checksum seed
const CHECKSUM_SEED: u32 = 0x5555_5555;

/// The full device configuration record ("preferences").
///
/// A single in-memory copy represents the last known good device state.
/// It is replaced wholesale when a checksum-valid settings frame arrives,
/// and mutated locally by staged edits that are then uploaded.
#[derive(Debug, Clone, PartialEq)]
pub struct Preferences {
    // Gyro drift compensation
    pub drift_scale: [i32; 3],
    pub drift_offset: [i32; 3],

    // Accelerometer / magnetometer calibration
    pub accel_offset: [i32; 3],
    pub mag_offset: [i32; 3],
    pub mag_scale: [i32; 3],

    // Mounting-angle correction
    pub roll_correct_sin: f32,
    pub roll_correct_cos: f32,
    pub pitch_correct_sin: f32,
    pub pitch_correct_cos: f32,

    // Flight rates (radians per update, stored as the device uses them)
    pub auto_level_roll_pitch: f32,
    pub auto_level_yaw_rate: f32,
    pub manual_roll_pitch_rate: f32,
    pub manual_yaw_rate: f32,

    // Control gains
    pub pitch_gain: u8,
    pub roll_gain: u8,
    pub yaw_gain: u8,
    pub ascent_gain: u8,
    pub alti_gain: u8,
    pub pitch_roll_locked: u8,
    pub use_advanced_pid: u8,

    // System setup
    pub receiver_type: u8,
    pub use_batt_mon: u8,
    pub disable_motors: u8,
    pub low_voltage_alarm: u8,
    pub accel_correction_strength: u8,
    pub low_voltage_ascent_limit: i16,
    pub throttle_test: i16,
    pub min_throttle: i16,
    pub max_throttle: i16,
    pub center_throttle: i16,
    pub min_throttle_armed: i16,
    pub arm_delay: i16,
    pub disarm_delay: i16,
    pub thrust_correction_scale: i16,
    pub accel_correction_filter: i16,
    pub voltage_offset: i16,
    pub low_voltage_alarm_threshold: i16,

    // Flight mode switch mapping (down, middle, up)
    pub flight_mode: [u8; 3],

    // Stick response curves
    pub aile_expo: u8,
    pub elev_expo: u8,
    pub rudd_expo: u8,

    // Radio channel assignment and scaling; a negative scale means the
    // channel is reversed
    pub channel_index: [u8; NUM_CHANNELS],
    pub channel_scale: [i16; NUM_CHANNELS],
    pub channel_center: [i16; NUM_CHANNELS],

    /// Checksum over every other field; see [`Preferences::calculate_checksum`]
    pub checksum: u32,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            drift_scale: [0; 3],
            drift_offset: [0; 3],
            accel_offset: [0; 3],
            mag_offset: [0; 3],
            mag_scale: [0; 3],
            roll_correct_sin: 0.0,
            roll_correct_cos: 1.0,
            pitch_correct_sin: 0.0,
            pitch_correct_cos: 1.0,
            auto_level_roll_pitch: 0.0,
            auto_level_yaw_rate: 0.0,
            manual_roll_pitch_rate: 0.0,
            manual_yaw_rate: 0.0,
            pitch_gain: 0,
            roll_gain: 0,
            yaw_gain: 0,
            ascent_gain: 0,
            alti_gain: 0,
            pitch_roll_locked: 0,
            use_advanced_pid: 0,
            receiver_type: 0,
            use_batt_mon: 0,
            disable_motors: 0,
            low_voltage_alarm: 0,
            accel_correction_strength: 0,
            low_voltage_ascent_limit: 0,
            throttle_test: 0,
            min_throttle: 0,
            max_throttle: 0,
            center_throttle: 0,
            min_throttle_armed: 0,
            arm_delay: 250,
            disarm_delay: 250,
            thrust_correction_scale: 0,
            accel_correction_filter: 0,
            voltage_offset: 0,
            low_voltage_alarm_threshold: 0,
            flight_mode: [0; 3],
            aile_expo: 0,
            elev_expo: 0,
            rudd_expo: 0,
            channel_index: [0, 1, 2, 3, 4, 5, 6, 7],
            channel_scale: [1024; NUM_CHANNELS],
            channel_center: [0; NUM_CHANNELS],
            checksum: 0,
        }
    }
}

struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    fn new() -> Self {
        Self {
            buf: Vec::with_capacity(PREFS_SIZE),
        }
    }

    fn u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    fn i16(&mut self, v: i16) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn i32(&mut self, v: i32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn f32(&mut self, v: f32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn u8(&mut self) -> u8 {
        let v = self.buf[self.pos];
        self.pos += 1;
        v
    }

    fn i16(&mut self) -> i16 {
        let v = i16::from_le_bytes([self.buf[self.pos], self.buf[self.pos + 1]]);
        self.pos += 2;
        v
    }

    fn i32(&mut self) -> i32 {
        let v = i32::from_le_bytes(self.buf[self.pos..self.pos + 4].try_into().unwrap());
        self.pos += 4;
        v
    }

    fn u32(&mut self) -> u32 {
        let v = u32::from_le_bytes(self.buf[self.pos..self.pos + 4].try_into().unwrap());
        self.pos += 4;
        v
    }

    fn f32(&mut self) -> f32 {
        let v = f32::from_le_bytes(self.buf[self.pos..self.pos + 4].try_into().unwrap());
        self.pos += 4;
        v
    }
}

impl Preferences {
    /// Serialize into the device's wire layout (little-endian, fixed order)
    pub fn to_bytes(&self) -> [u8; PREFS_SIZE] {
        let mut w = Writer::new();

        for v in self.drift_scale {
            w.i32(v);
        }
        for v in self.drift_offset {
            w.i32(v);
        }
        for v in self.accel_offset {
            w.i32(v);
        }
        for v in self.mag_offset {
            w.i32(v);
        }
        for v in self.mag_scale {
            w.i32(v);
        }

        w.f32(self.roll_correct_sin);
        w.f32(self.roll_correct_cos);
        w.f32(self.pitch_correct_sin);
        w.f32(self.pitch_correct_cos);

        w.f32(self.auto_level_roll_pitch);
        w.f32(self.auto_level_yaw_rate);
        w.f32(self.manual_roll_pitch_rate);
        w.f32(self.manual_yaw_rate);

        w.u8(self.pitch_gain);
        w.u8(self.roll_gain);
        w.u8(self.yaw_gain);
        w.u8(self.ascent_gain);
        w.u8(self.alti_gain);
        w.u8(self.pitch_roll_locked);
        w.u8(self.use_advanced_pid);
        w.u8(self.receiver_type);
        w.u8(self.use_batt_mon);
        w.u8(self.disable_motors);
        w.u8(self.low_voltage_alarm);
        w.u8(self.accel_correction_strength);

        w.i16(self.low_voltage_ascent_limit);
        w.i16(self.throttle_test);
        w.i16(self.min_throttle);
        w.i16(self.max_throttle);
        w.i16(self.center_throttle);
        w.i16(self.min_throttle_armed);
        w.i16(self.arm_delay);
        w.i16(self.disarm_delay);
        w.i16(self.thrust_correction_scale);
        w.i16(self.accel_correction_filter);
        w.i16(self.voltage_offset);
        w.i16(self.low_voltage_alarm_threshold);

        for v in self.flight_mode {
            w.u8(v);
        }
        w.u8(self.aile_expo);
        w.u8(self.elev_expo);
        w.u8(self.rudd_expo);
        w.u8(0);
        w.u8(0); // pad to keep the channel tables word-aligned

        for v in self.channel_index {
            w.u8(v);
        }
        for v in self.channel_scale {
            w.i16(v);
        }
        for v in self.channel_center {
            w.i16(v);
        }

        w.u32(self.checksum);

        debug_assert_eq!(w.buf.len(), PREFS_SIZE);
        w.buf.try_into().expect("preferences layout size")
    }

    /// Deserialize from exactly [`PREFS_SIZE`] bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != PREFS_SIZE {
            return Err(FcLinkError::Protocol(format!(
                "preferences record must be {} bytes, got {}",
                PREFS_SIZE,
                bytes.len()
            )));
        }

        let mut r = Reader::new(bytes);
        let read3 = |r: &mut Reader<'_>| [r.i32(), r.i32(), r.i32()];

        let drift_scale = read3(&mut r);
        let drift_offset = read3(&mut r);
        let accel_offset = read3(&mut r);
        let mag_offset = read3(&mut r);
        let mag_scale = read3(&mut r);

        let roll_correct_sin = r.f32();
        let roll_correct_cos = r.f32();
        let pitch_correct_sin = r.f32();
        let pitch_correct_cos = r.f32();

        let auto_level_roll_pitch = r.f32();
        let auto_level_yaw_rate = r.f32();
        let manual_roll_pitch_rate = r.f32();
        let manual_yaw_rate = r.f32();

        let pitch_gain = r.u8();
        let roll_gain = r.u8();
        let yaw_gain = r.u8();
        let ascent_gain = r.u8();
        let alti_gain = r.u8();
        let pitch_roll_locked = r.u8();
        let use_advanced_pid = r.u8();
        let receiver_type = r.u8();
        let use_batt_mon = r.u8();
        let disable_motors = r.u8();
        let low_voltage_alarm = r.u8();
        let accel_correction_strength = r.u8();

        let low_voltage_ascent_limit = r.i16();
        let throttle_test = r.i16();
        let min_throttle = r.i16();
        let max_throttle = r.i16();
        let center_throttle = r.i16();
        let min_throttle_armed = r.i16();
        let arm_delay = r.i16();
        let disarm_delay = r.i16();
        let thrust_correction_scale = r.i16();
        let accel_correction_filter = r.i16();
        let voltage_offset = r.i16();
        let low_voltage_alarm_threshold = r.i16();

        let flight_mode = [r.u8(), r.u8(), r.u8()];
        let aile_expo = r.u8();
        let elev_expo = r.u8();
        let rudd_expo = r.u8();
        let _ = r.u8();
        let _ = r.u8(); // pad

        let mut channel_index = [0u8; NUM_CHANNELS];
        for v in channel_index.iter_mut() {
            *v = r.u8();
        }

        let mut channel_scale = [0i16; NUM_CHANNELS];
        for v in channel_scale.iter_mut() {
            *v = r.i16();
        }
        let mut channel_center = [0i16; NUM_CHANNELS];
        for v in channel_center.iter_mut() {
            *v = r.i16();
        }

        let checksum = r.u32();

        Ok(Self {
            drift_scale,
            drift_offset,
            accel_offset,
            mag_offset,
            mag_scale,
            roll_correct_sin,
            roll_correct_cos,
            pitch_correct_sin,
            pitch_correct_cos,
            auto_level_roll_pitch,
            auto_level_yaw_rate,
            manual_roll_pitch_rate,
            manual_yaw_rate,
            pitch_gain,
            roll_gain,
            yaw_gain,
            ascent_gain,
            alti_gain,
            pitch_roll_locked,
            use_advanced_pid,
            receiver_type,
            use_batt_mon,
            disable_motors,
            low_voltage_alarm,
            accel_correction_strength,
            low_voltage_ascent_limit,
            throttle_test,
            min_throttle,
            max_throttle,
            center_throttle,
            min_throttle_armed,
            arm_delay,
            disarm_delay,
            thrust_correction_scale,
            accel_correction_filter,
            voltage_offset,
            low_voltage_alarm_threshold,
            flight_mode,
            aile_expo,
            elev_expo,
            rudd_expo,
            channel_index,
            channel_scale,
            channel_center,
            checksum,
        })
    }

    /// Build a record from a settings-frame payload of any length.
    ///
    /// Copies at most `PREFS_SIZE` bytes into a zeroed staging buffer, which
    /// defends against protocol-version skew where the device-side record
    /// grew or shrank. The caller still has to checksum-gate the result.
    pub fn from_wire(payload: &[u8]) -> Self {
        let mut staging = [0u8; PREFS_SIZE];
        let to_copy = payload.len().min(PREFS_SIZE);
        staging[..to_copy].copy_from_slice(&payload[..to_copy]);

        // Staging buffer is exactly PREFS_SIZE, so this cannot fail
        Self::from_bytes(&staging).expect("staging buffer is layout-sized")
    }

    /// Checksum over every 32-bit word except the trailing checksum word.
    ///
    /// Seeded rotate-and-xor; must match the device's computation
    /// bit-for-bit.
    pub fn calculate_checksum(&self) -> u32 {
        let bytes = self.to_bytes();
        let mut r = CHECKSUM_SEED;
        for word in bytes[..PREFS_SIZE - 4].chunks_exact(4) {
            r = r.rotate_left(7) ^ u32::from_le_bytes(word.try_into().unwrap());
        }
        r
    }

    /// Stamp the checksum field from the current contents
    pub fn stamp_checksum(&mut self) {
        self.checksum = self.calculate_checksum();
    }

    /// True when the stored checksum matches the record contents
    pub fn validate_checksum(&self) -> bool {
        self.checksum == self.calculate_checksum()
    }

    /// Restore the default per-channel mapping and scaling
    pub fn reset_channels(&mut self) {
        for i in 0..NUM_CHANNELS {
            self.channel_index[i] = i as u8;
            self.channel_scale[i] = 1024;
            self.channel_center[i] = 0;
        }
    }

    /// True when the channel is configured reversed (negative scale)
    pub fn channel_reversed(&self, channel: usize) -> bool {
        self.channel_scale[channel] < 0
    }

    /// Set or clear a channel's reversed flag, preserving its magnitude.
    ///
    /// Returns `false` when the stored value is already correct, so callers
    /// can skip a pointless upload.
    pub fn set_channel_reversed(&mut self, channel: usize, reversed: bool) -> bool {
        let magnitude = self.channel_scale[channel].abs();
        let scale = if reversed { -magnitude } else { magnitude };

        if self.channel_scale[channel] == scale {
            return false;
        }
        self.channel_scale[channel] = scale;
        true
    }

    /// Map a logical channel slot to a physical receiver channel
    pub fn set_channel_mapping(&mut self, dest: usize, source: u8) {
        if dest < NUM_CHANNELS && (source as usize) < NUM_CHANNELS {
            self.channel_index[dest] = source;
        }
    }
}
