//! # Packet Framer
//!
//! Turns the inbound byte stream into discrete mode-tagged packets.
//!
//! The transport is assumed reliable and ordered, so a frame is simply a
//! 3-byte header (`mode: u8`, `length: u16` little-endian) followed by
//! `length` payload bytes. Bytes may arrive in arbitrary fragments; the
//! framer accumulates them and never blocks the caller.

use bytes::{Buf, BytesMut};

use super::packet::Packet;

/// Frame header size: mode byte + 16-bit length
const HEADER_SIZE: usize = 3;

/// Upper bound on a sane payload length. Anything larger means the stream
/// is corrupt beyond local repair; the framer discards its buffer and lets
/// subsequent traffic re-frame.
const MAX_PAYLOAD_SIZE: usize = 1024;

/// Accumulating packet framer.
///
/// Feed raw bytes with [`Framer::extend`], then drain complete frames with
/// [`Framer::next_packet`] until it returns `None`.
#[derive(Debug, Default)]
pub struct Framer {
    buf: BytesMut,
}

impl Framer {
    pub fn new() -> Self {
        Self {
            buf: BytesMut::with_capacity(2048),
        }
    }

    /// Append newly received bytes to the frame buffer
    pub fn extend(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Number of buffered bytes not yet consumed
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    /// Pop the next complete packet, or `None` if a full frame has not
    /// arrived yet. Non-blocking.
    pub fn next_packet(&mut self) -> Option<Packet> {
        if self.buf.len() < HEADER_SIZE {
            return None;
        }

        let mode = self.buf[0];
        let length = u16::from_le_bytes([self.buf[1], self.buf[2]]) as usize;

        if length > MAX_PAYLOAD_SIZE {
            tracing::warn!(mode, length, "implausible frame length, discarding buffer");
            self.buf.clear();
            return None;
        }

        if self.buf.len() < HEADER_SIZE + length {
            return None;
        }

        self.buf.advance(HEADER_SIZE);
        let payload = self.buf.split_to(length).to_vec();

        Some(Packet { mode, payload })
    }
}
