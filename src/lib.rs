//! # FC Link
//!
//! Ground-station link layer for an Elev-8 style flight controller.
//!
//! This library provides the core functionality for talking to the device
//! over its serial protocol: framing and decoding telemetry packets,
//! synchronizing the checksummed preferences record, and running the
//! operator-driven radio and throttle calibration procedures.

pub mod angle;
pub mod calibration;
pub mod config;
pub mod error;
pub mod link;
pub mod prefs;
pub mod serial;
pub mod station;
