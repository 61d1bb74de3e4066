//! # Packet Types and Decoders
//!
//! Typed records for each packet mode the flight controller emits, and the
//! decoders that produce them from raw payload bytes.

use crate::error::{FcLinkError, Result};

/// Number of radio channels
pub const NUM_CHANNELS: usize = 8;

/// Radio frame payload size (8 channels + battery volts, i16 each)
pub const RADIO_PAYLOAD_SIZE: usize = 18;

/// Sensor frame payload size (gyro + accel + mag + temp, i16 each)
pub const SENSOR_PAYLOAD_SIZE: usize = 20;

/// Quaternion payload size (4 × f32)
pub const QUATERNION_PAYLOAD_SIZE: usize = 16;

/// Computed/estimator payload size (6 × i32)
pub const COMPUTED_PAYLOAD_SIZE: usize = 24;

/// Motor frame payload size (6 × i16 + layout flag + pad)
pub const MOTOR_PAYLOAD_SIZE: usize = 14;

/// Debug frame payload size (4 × u16)
pub const DEBUG_PAYLOAD_SIZE: usize = 8;

/// GPS frame payload size (4 × i32 + 2 × u8)
pub const GPS_PAYLOAD_SIZE: usize = 18;

/// One mode-tagged, length-bounded unit of the wire protocol.
///
/// Constructed by the framer, consumed immediately by the dispatcher,
/// then discarded.
#[derive(Debug, Clone)]
pub struct Packet {
    /// Mode tag selecting the decoder
    pub mode: u8,
    /// Payload bytes, already bounded by the frame's length field
    pub payload: Vec<u8>,
}

/// Closed set of packet modes this ground station understands.
///
/// Unknown tags decode to `None` and are dropped by the dispatcher, so the
/// device is free to grow new packet kinds without breaking older stations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketMode {
    Radio,
    Sensors,
    Quaternion,
    Computed,
    Motors,
    TargetQuaternion,
    Debug,
    Gps,
    Settings,
}

impl PacketMode {
    /// Decode a wire mode tag. Unknown tags return `None`.
    pub fn from_wire(mode: u8) -> Option<Self> {
        match mode {
            1 => Some(Self::Radio),
            2 => Some(Self::Sensors),
            3 => Some(Self::Quaternion),
            4 => Some(Self::Computed),
            5 => Some(Self::Motors),
            6 => Some(Self::TargetQuaternion),
            7 => Some(Self::Debug),
            8 => Some(Self::Gps),
            0x18 => Some(Self::Settings),
            _ => None,
        }
    }
}

/// Live radio channel values plus battery telemetry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RadioFrame {
    /// Raw channel values: Thro, Aile, Elev, Rudd, Gear, Aux1, Aux2, Aux3
    pub channels: [i16; NUM_CHANNELS],

    /// Battery voltage in centi-volts
    pub battery_volts: i16,
}

/// Raw IMU sample
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SensorFrame {
    pub gyro: [i16; 3],
    pub accel: [i16; 3],
    pub mag: [i16; 3],
    pub temp: i16,
}

/// Orientation quaternion (x, y, z, w)
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct QuaternionFrame {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub w: f32,
}

/// Estimator outputs and control power values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ComputedFrame {
    pub pitch: i32,
    pub roll: i32,
    pub yaw: i32,

    /// Raw pressure altitude in mm
    pub alt: i32,
    /// Altitude estimate in mm
    pub alti_est: i32,
    /// Ground height in mm
    pub ground_height: i32,
}

/// Per-motor output values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MotorFrame {
    pub fl: i16,
    pub fr: i16,
    pub br: i16,
    pub bl: i16,
    pub cr: i16,
    pub cl: i16,

    /// Device is wired as a hexacopter (center motors active)
    pub is_hex: bool,
}

/// Diagnostic frame carrying the firmware version and loop timing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DebugFrame {
    /// Packed firmware version: major nibble-pair, minor nibble, patch nibble
    pub version: u16,
    pub min_cycles: u16,
    pub max_cycles: u16,
    pub avg_cycles: u16,
}

impl DebugFrame {
    /// Firmware version as (major, minor, patch)
    pub fn version_triplet(&self) -> (u8, u8, u8) {
        (
            (self.version >> 8) as u8,
            ((self.version >> 4) & 0xF) as u8,
            (self.version & 0xF) as u8,
        )
    }
}

/// GPS fix and home-target coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GpsFrame {
    /// Latitude in degrees × 10^7
    pub latitude: i32,
    /// Longitude in degrees × 10^7
    pub longitude: i32,
    pub target_lat: i32,
    pub target_lon: i32,
    pub sat_count: u8,
    /// Horizontal dilution × 10
    pub dilution: u8,
}

/// One decoded packet, exactly one emitted per frame processed
#[derive(Debug, Clone)]
pub enum TelemetryEvent {
    Radio(RadioFrame),
    Sensors(SensorFrame),
    Orientation(QuaternionFrame),
    Computed(ComputedFrame),
    Motors(MotorFrame),
    TargetOrientation(QuaternionFrame),
    Debug(DebugFrame),
    Gps(GpsFrame),
    /// Settings frame; payload handed to the preferences layer for the
    /// checksum-gated acceptance check
    Settings(Vec<u8>),
}

fn check_len(payload: &[u8], want: usize, what: &str) -> Result<()> {
    if payload.len() < want {
        return Err(FcLinkError::Protocol(format!(
            "{} payload too short: {} bytes, expected {}",
            what,
            payload.len(),
            want
        )));
    }
    Ok(())
}

fn i16_at(payload: &[u8], offset: usize) -> i16 {
    i16::from_le_bytes([payload[offset], payload[offset + 1]])
}

fn u16_at(payload: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([payload[offset], payload[offset + 1]])
}

fn i32_at(payload: &[u8], offset: usize) -> i32 {
    i32::from_le_bytes([
        payload[offset],
        payload[offset + 1],
        payload[offset + 2],
        payload[offset + 3],
    ])
}

fn f32_at(payload: &[u8], offset: usize) -> f32 {
    f32::from_le_bytes([
        payload[offset],
        payload[offset + 1],
        payload[offset + 2],
        payload[offset + 3],
    ])
}

/// Decode a radio frame payload
pub fn decode_radio(payload: &[u8]) -> Result<RadioFrame> {
    check_len(payload, RADIO_PAYLOAD_SIZE, "radio")?;

    let mut channels = [0i16; NUM_CHANNELS];
    for (i, ch) in channels.iter_mut().enumerate() {
        *ch = i16_at(payload, i * 2);
    }

    Ok(RadioFrame {
        channels,
        battery_volts: i16_at(payload, 16),
    })
}

/// Decode a sensor frame payload
pub fn decode_sensors(payload: &[u8]) -> Result<SensorFrame> {
    check_len(payload, SENSOR_PAYLOAD_SIZE, "sensor")?;

    let read3 = |base: usize| [i16_at(payload, base), i16_at(payload, base + 2), i16_at(payload, base + 4)];

    Ok(SensorFrame {
        gyro: read3(0),
        accel: read3(6),
        mag: read3(12),
        temp: i16_at(payload, 18),
    })
}

/// Decode a quaternion payload (orientation or target orientation)
pub fn decode_quaternion(payload: &[u8]) -> Result<QuaternionFrame> {
    check_len(payload, QUATERNION_PAYLOAD_SIZE, "quaternion")?;

    Ok(QuaternionFrame {
        x: f32_at(payload, 0),
        y: f32_at(payload, 4),
        z: f32_at(payload, 8),
        w: f32_at(payload, 12),
    })
}

/// Decode a computed/estimator payload
pub fn decode_computed(payload: &[u8]) -> Result<ComputedFrame> {
    check_len(payload, COMPUTED_PAYLOAD_SIZE, "computed")?;

    Ok(ComputedFrame {
        pitch: i32_at(payload, 0),
        roll: i32_at(payload, 4),
        yaw: i32_at(payload, 8),
        alt: i32_at(payload, 12),
        alti_est: i32_at(payload, 16),
        ground_height: i32_at(payload, 20),
    })
}

/// Decode a motor output payload
pub fn decode_motors(payload: &[u8]) -> Result<MotorFrame> {
    check_len(payload, MOTOR_PAYLOAD_SIZE, "motor")?;

    Ok(MotorFrame {
        fl: i16_at(payload, 0),
        fr: i16_at(payload, 2),
        br: i16_at(payload, 4),
        bl: i16_at(payload, 6),
        cr: i16_at(payload, 8),
        cl: i16_at(payload, 10),
        is_hex: payload[12] != 0,
    })
}

/// Decode a debug/diagnostic payload
pub fn decode_debug(payload: &[u8]) -> Result<DebugFrame> {
    check_len(payload, DEBUG_PAYLOAD_SIZE, "debug")?;

    Ok(DebugFrame {
        version: u16_at(payload, 0),
        min_cycles: u16_at(payload, 2),
        max_cycles: u16_at(payload, 4),
        avg_cycles: u16_at(payload, 6),
    })
}

/// Decode a GPS payload
pub fn decode_gps(payload: &[u8]) -> Result<GpsFrame> {
    check_len(payload, GPS_PAYLOAD_SIZE, "gps")?;

    Ok(GpsFrame {
        latitude: i32_at(payload, 0),
        longitude: i32_at(payload, 4),
        target_lat: i32_at(payload, 8),
        target_lon: i32_at(payload, 12),
        sat_count: payload[16],
        dilution: payload[17],
    })
}

/// Decode one packet into its telemetry event.
///
/// Returns `Ok(None)` for unknown modes, which the dispatcher drops for
/// forward compatibility.
pub fn decode_packet(packet: &Packet) -> Result<Option<TelemetryEvent>> {
    let Some(mode) = PacketMode::from_wire(packet.mode) else {
        return Ok(None);
    };

    let event = match mode {
        PacketMode::Radio => TelemetryEvent::Radio(decode_radio(&packet.payload)?),
        PacketMode::Sensors => TelemetryEvent::Sensors(decode_sensors(&packet.payload)?),
        PacketMode::Quaternion => TelemetryEvent::Orientation(decode_quaternion(&packet.payload)?),
        PacketMode::Computed => TelemetryEvent::Computed(decode_computed(&packet.payload)?),
        PacketMode::Motors => TelemetryEvent::Motors(decode_motors(&packet.payload)?),
        PacketMode::TargetQuaternion => {
            TelemetryEvent::TargetOrientation(decode_quaternion(&packet.payload)?)
        }
        PacketMode::Debug => TelemetryEvent::Debug(decode_debug(&packet.payload)?),
        PacketMode::Gps => TelemetryEvent::Gps(decode_gps(&packet.payload)?),
        PacketMode::Settings => TelemetryEvent::Settings(packet.payload.clone()),
    };

    Ok(Some(event))
}
