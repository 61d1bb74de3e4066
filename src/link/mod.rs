//! # Link Module
//!
//! The wire protocol between the ground station and the flight controller.
//!
//! This module handles:
//! - Framing the inbound byte stream into mode-tagged packets
//! - Decoding each packet into a typed telemetry record
//! - Encoding outbound command tokens

pub mod command;
pub mod framer;
pub mod packet;

pub use command::Command;
pub use framer::Framer;
pub use packet::{Packet, PacketMode, TelemetryEvent};
