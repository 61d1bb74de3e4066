//! # Preferences Transfer Protocol
//!
//! Paced upload and checksum-gated download of the preferences record.
//!
//! The device has no flow control and only a small receive buffer, so the
//! upload sends the record in 4-byte chunks with a short delay after each
//! one. There is no acknowledgment frame: the upload is known to have taken
//! only when the device echoes a settings frame whose checksum matches.

use tokio::time::{sleep, Duration};
use tracing::{debug, warn};

use super::Preferences;
use crate::error::Result;
use crate::link::Command;
use crate::serial::port_trait::PortIO;

/// Delay after the update command so the device can set up its receive buffer
pub const UPLOAD_SETTLE: Duration = Duration::from_millis(10);

/// Bytes per upload chunk; the record size is a multiple of this
pub const CHUNK_SIZE: usize = 4;

/// Delay between chunks so the device can commit each one
pub const CHUNK_DELAY: Duration = Duration::from_millis(5);

/// Upload the record to the device.
///
/// Stamps the checksum, switches the device into preferences-receive mode,
/// streams the body in paced chunks, then asks the device to echo its
/// current preferences so the checksum-gated round trip can confirm the
/// upload. The chunk pacing is mandatory, not an optimization.
pub async fn upload_preferences<P: PortIO>(port: &mut P, prefs: &mut Preferences) -> Result<()> {
    prefs.stamp_checksum();

    port.write_all(&Command::UpdatePreferences.encode()).await?;
    sleep(UPLOAD_SETTLE).await;

    let bytes = prefs.to_bytes();
    for chunk in bytes.chunks(CHUNK_SIZE) {
        port.write_all(chunk).await?;
        sleep(CHUNK_DELAY).await;
    }

    port.write_all(&Command::QueryPreferences.encode()).await?;
    debug!("preferences upload complete ({} bytes)", bytes.len());
    Ok(())
}

/// What happened to an inbound settings frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingsOutcome {
    /// Checksum matched; the live record was replaced
    Accepted,
    /// Checksum failed; the live record is untouched and a re-query was sent
    Requeried,
}

/// Checksum gate for settings frames arriving from the device.
///
/// Transport noise is expected and self-heals: a bad frame never touches
/// the live record, and the device is simply asked to send it again. There
/// is no retry cap; each re-query is driven by the device actually emitting
/// a frame, so the loop cannot spin on its own.
#[derive(Debug, Default)]
pub struct PrefsSync {
    mismatches: u64,
}

impl PrefsSync {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of checksum mismatches seen so far
    pub fn mismatches(&self) -> u64 {
        self.mismatches
    }

    /// Gate one settings-frame payload against the live record.
    ///
    /// Emits exactly one re-query command per rejected frame.
    pub async fn handle_settings_frame<P: PortIO>(
        &mut self,
        port: &mut P,
        live: &mut Preferences,
        payload: &[u8],
    ) -> Result<SettingsOutcome> {
        let staged = Preferences::from_wire(payload);

        if staged.validate_checksum() {
            *live = staged;
            debug!("accepted settings frame from device");
            Ok(SettingsOutcome::Accepted)
        } else {
            self.mismatches += 1;
            warn!(
                mismatches = self.mismatches,
                "settings frame failed checksum, re-querying"
            );
            port.write_all(&Command::QueryPreferences.encode()).await?;
            Ok(SettingsOutcome::Requeried)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prefs::PREFS_SIZE;
    use crate::serial::port_trait::mocks::MockPort;

    #[tokio::test(start_paused = true)]
    async fn test_upload_write_order() {
        let mut port = MockPort::new();
        let mut prefs = Preferences::default();

        upload_preferences(&mut port, &mut prefs).await.unwrap();

        let writes = port.get_written_data();
        // Command, body chunks, echo request
        assert_eq!(writes.len(), 1 + PREFS_SIZE / CHUNK_SIZE + 1);
        assert_eq!(writes[0], b"UPrf");
        assert_eq!(writes[writes.len() - 1], b"QPRF");
        for chunk in &writes[1..writes.len() - 1] {
            assert_eq!(chunk.len(), CHUNK_SIZE);
        }

        // The body on the wire is the stamped record
        let body: Vec<u8> = writes[1..writes.len() - 1].concat();
        assert_eq!(body, prefs.to_bytes().to_vec());
        assert!(prefs.validate_checksum(), "upload must stamp the checksum");
    }

    #[tokio::test(start_paused = true)]
    async fn test_upload_write_error_propagates() {
        let mut port = MockPort::new();
        port.set_write_error(std::io::ErrorKind::BrokenPipe);
        let mut prefs = Preferences::default();

        let result = upload_preferences(&mut port, &mut prefs).await;
        assert!(matches!(result, Err(crate::error::FcLinkError::Io(_))));
        assert!(port.get_written_data().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_valid_settings_frame_accepted() {
        let mut port = MockPort::new();
        let mut live = Preferences::default();
        let mut sync = PrefsSync::new();

        let mut incoming = Preferences {
            max_throttle: 16000,
            ..Default::default()
        };
        incoming.stamp_checksum();

        let outcome = sync
            .handle_settings_frame(&mut port, &mut live, &incoming.to_bytes())
            .await
            .unwrap();

        assert_eq!(outcome, SettingsOutcome::Accepted);
        assert_eq!(live, incoming);
        assert!(port.get_written_data().is_empty(), "no re-query on success");
    }

    #[tokio::test(start_paused = true)]
    async fn test_corrupt_settings_frame_requeries_once() {
        let mut port = MockPort::new();
        let mut live = Preferences::default();
        let before = live.clone();
        let mut sync = PrefsSync::new();

        let mut incoming = Preferences {
            min_throttle: 8500,
            ..Default::default()
        };
        incoming.stamp_checksum();
        let mut payload = incoming.to_bytes();
        payload[8] ^= 0xFF;
        payload[9] ^= 0xFF;
        payload[20] ^= 0xFF; // 3 corrupted bytes

        let outcome = sync
            .handle_settings_frame(&mut port, &mut live, &payload)
            .await
            .unwrap();

        assert_eq!(outcome, SettingsOutcome::Requeried);
        assert_eq!(live, before, "live record must not be touched");
        assert_eq!(sync.mismatches(), 1);

        let writes = port.get_written_data();
        assert_eq!(writes.len(), 1, "exactly one re-query per bad frame");
        assert_eq!(writes[0], b"QPRF");
    }

    #[tokio::test(start_paused = true)]
    async fn test_truncated_settings_frame_requeries() {
        let mut port = MockPort::new();
        let mut live = Preferences::default();
        let mut sync = PrefsSync::new();

        let outcome = sync
            .handle_settings_frame(&mut port, &mut live, &[0u8; 12])
            .await
            .unwrap();

        assert_eq!(outcome, SettingsOutcome::Requeried);
        assert_eq!(port.get_written_data().len(), 1);
    }
}
