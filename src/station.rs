//! # Ground Station Core
//!
//! Owns the link to the flight controller and runs the tick loop: drain
//! every buffered packet, route decoded telemetry, advance any calibration
//! session, then emit the heartbeat on its cadence.
//!
//! All shared mutable state (the live preferences record and the two
//! calibration sessions) is owned here and touched only by the tick loop
//! and the operator entry points, so there are no concurrent writers.

use tokio::time::{timeout, Duration};
use tracing::{debug, info, trace, warn};

use crate::angle::atan2_brad;
use crate::calibration::{AdvanceOutcome, RadioCalEvent, RadioCalibration, ThrottleCalibration};
use crate::config::Config;
use crate::error::Result;
use crate::link::packet::{decode_packet, DebugFrame, GpsFrame, RadioFrame, NUM_CHANNELS};
use crate::link::{Command, Framer, TelemetryEvent};
use crate::prefs::transfer::{upload_preferences, PrefsSync};
use crate::prefs::Preferences;
use crate::serial::port_trait::PortIO;

/// Read buffer size for one drain pass
const READ_CHUNK: usize = 512;

/// [`atan2_brad`] inputs must stay below roughly ±2^18
const ATAN_INPUT_BOUND: i64 = 1 << 18;

/// The ground-station side of the link.
pub struct Station<P: PortIO> {
    port: P,
    framer: Framer,

    /// Last known good device configuration
    prefs: Preferences,
    prefs_sync: PrefsSync,

    radio_cal: RadioCalibration,
    throttle_cal: ThrottleCalibration,

    /// Freshest radio frame; feeds calibration channel values and the
    /// battery interlock
    last_radio: RadioFrame,
    last_debug: Option<DebugFrame>,
    last_gps: Option<GpsFrame>,

    heartbeat_ticks: u32,
    tick_count: u32,
}

impl<P: PortIO> Station<P> {
    pub fn new(port: P, config: &Config) -> Self {
        Self {
            port,
            framer: Framer::new(),
            prefs: Preferences::default(),
            prefs_sync: PrefsSync::new(),
            radio_cal: RadioCalibration::new(
                config.calibration.sample_ticks,
                config.calibration.move_threshold,
            ),
            throttle_cal: ThrottleCalibration::new(),
            last_radio: RadioFrame::default(),
            last_debug: None,
            last_gps: None,
            heartbeat_ticks: config.link.heartbeat_ticks,
            tick_count: 0,
        }
    }

    /// One pass of the tick loop. Runs at the configured tick rate.
    pub async fn tick(&mut self) -> Result<()> {
        self.drain_reads().await?;
        self.dispatch_packets().await?;

        // Calibration always sees this tick's freshest channel values
        let channels = self.last_radio.channels;
        if let Some(event) = self.radio_cal.tick(&channels, &mut self.prefs) {
            match event {
                RadioCalEvent::RequestRawChannels => {
                    self.port
                        .write_all(&Command::ResetRadioScaling.encode())
                        .await?;
                }
                RadioCalEvent::Applied { updated_channels } => {
                    if updated_channels > 0 {
                        upload_preferences(&mut self.port, &mut self.prefs).await?;
                    }
                }
            }
        }

        self.tick_count += 1;
        if self.tick_count % self.heartbeat_ticks == 0 {
            // While throttle calibration runs the device reads single
            // bytes as throttle control data, so the heartbeat must stay
            // quiet
            if self.throttle_cal.is_active() {
                trace!("heartbeat suppressed during throttle calibration");
            } else {
                self.port.write_all(&Command::Heartbeat.encode()).await?;
            }
        }

        Ok(())
    }

    /// Pull everything the port has buffered right now without blocking
    async fn drain_reads(&mut self) -> Result<()> {
        let mut buf = [0u8; READ_CHUNK];
        loop {
            match timeout(Duration::ZERO, self.port.read(&mut buf)).await {
                Ok(Ok(0)) => break,
                Ok(Ok(n)) => self.framer.extend(&buf[..n]),
                Ok(Err(e)) => return Err(e.into()),
                Err(_) => break, // nothing ready this tick
            }
        }
        Ok(())
    }

    async fn dispatch_packets(&mut self) -> Result<()> {
        while let Some(packet) = self.framer.next_packet() {
            let event = match decode_packet(&packet) {
                Ok(Some(event)) => event,
                Ok(None) => {
                    debug!(mode = packet.mode, "dropping unknown packet mode");
                    continue;
                }
                Err(e) => {
                    warn!(mode = packet.mode, "bad packet payload: {}", e);
                    continue;
                }
            };

            match event {
                TelemetryEvent::Radio(frame) => self.last_radio = frame,
                TelemetryEvent::Debug(frame) => self.last_debug = Some(frame),
                TelemetryEvent::Gps(frame) => self.last_gps = Some(frame),
                TelemetryEvent::Settings(payload) => {
                    self.prefs_sync
                        .handle_settings_frame(&mut self.port, &mut self.prefs, &payload)
                        .await?;
                }
                other => trace!(?other, "telemetry"),
            }
        }
        Ok(())
    }

    // Operator entry points

    /// Ask the device for its current preferences
    pub async fn query_preferences(&mut self) -> Result<()> {
        self.port
            .write_all(&Command::QueryPreferences.encode())
            .await
            .map_err(Into::into)
    }

    /// Restore factory defaults on the device, then fetch the result
    pub async fn factory_reset(&mut self) -> Result<()> {
        info!("requesting factory reset");
        self.port
            .write_all(&Command::WipePreferences.encode())
            .await?;
        self.port
            .write_all(&Command::QueryPreferences.encode())
            .await?;
        Ok(())
    }

    /// Restore the default channel mapping and scaling, then upload
    pub async fn reset_receiver(&mut self) -> Result<()> {
        self.prefs.reset_channels();
        upload_preferences(&mut self.port, &mut self.prefs).await
    }

    /// Set or clear a channel's reversed flag. Skips the upload when the
    /// stored value already matches.
    pub async fn set_channel_reversed(&mut self, channel: usize, reversed: bool) -> Result<()> {
        if channel >= NUM_CHANNELS {
            return Ok(());
        }
        if self.prefs.set_channel_reversed(channel, reversed) {
            upload_preferences(&mut self.port, &mut self.prefs).await?;
        }
        Ok(())
    }

    /// Map a logical channel slot to a physical receiver channel and upload
    pub async fn set_channel_mapping(&mut self, dest: usize, source: u8) -> Result<()> {
        self.prefs.set_channel_mapping(dest, source);
        upload_preferences(&mut self.port, &mut self.prefs).await
    }

    /// Begin a radio calibration session, discarding any prior one
    pub fn start_radio_calibration(&mut self) {
        self.radio_cal.start();
    }

    /// Zero the gyro calibration for a fresh measurement session
    pub async fn zero_gyro_calibration(&mut self) -> Result<()> {
        self.port
            .write_all(&Command::ZeroGyroCalibration.encode())
            .await
            .map_err(Into::into)
    }

    /// Zero the accelerometer calibration for a fresh measurement session
    pub async fn zero_accel_calibration(&mut self) -> Result<()> {
        self.port
            .write_all(&Command::ZeroAccelCalibration.encode())
            .await
            .map_err(Into::into)
    }

    /// Advance the throttle calibration ritual one cycle.
    ///
    /// The battery interlock reads the freshest radio frame's voltage.
    pub async fn advance_throttle_calibration(
        &mut self,
        propellers_confirmed: bool,
    ) -> Result<AdvanceOutcome> {
        let battery_volts = self.last_radio.battery_volts;
        self.throttle_cal
            .advance(&mut self.port, propellers_confirmed, battery_volts)
            .await
    }

    /// Leaving the calibration view: cancel whatever is in progress and
    /// tell the device to go back to its own drift-compensated calibration.
    pub async fn leave_calibration_view(&mut self) -> Result<()> {
        self.radio_cal.cancel();
        self.throttle_cal.cancel(&mut self.port).await?;
        self.port
            .write_all(&Command::RevertGyroCalibration.encode())
            .await?;
        self.port
            .write_all(&Command::RevertAccelCalibration.encode())
            .await?;
        Ok(())
    }

    /// Spin one motor at test throttle.
    ///
    /// Any in-progress throttle calibration is cancelled first, so the
    /// device never reads the command bytes as throttle control data.
    pub async fn motor_test(&mut self, index: u8) -> Result<()> {
        self.throttle_cal.cancel(&mut self.port).await?;
        self.port
            .write_all(&Command::MotorTest(index).encode())
            .await
            .map_err(Into::into)
    }

    /// Sound the beeper (bench test)
    pub async fn beeper_test(&mut self) -> Result<()> {
        self.throttle_cal.cancel(&mut self.port).await?;
        self.port
            .write_all(&Command::BeeperTest.encode())
            .await
            .map_err(Into::into)
    }

    /// Flash the LED (bench test)
    pub async fn led_test(&mut self) -> Result<()> {
        self.throttle_cal.cancel(&mut self.port).await?;
        self.port
            .write_all(&Command::LedTest.encode())
            .await
            .map_err(Into::into)
    }

    /// Last known good device configuration
    pub fn preferences(&self) -> &Preferences {
        &self.prefs
    }

    /// Freshest radio frame
    pub fn latest_radio(&self) -> &RadioFrame {
        &self.last_radio
    }

    /// True while either calibration session is in progress
    pub fn calibrating(&self) -> bool {
        self.radio_cal.is_active() || self.throttle_cal.is_active()
    }

    /// Firmware version from the debug frame, once one has arrived
    pub fn firmware_version(&self) -> Option<(u8, u8, u8)> {
        self.last_debug.map(|frame| frame.version_triplet())
    }

    /// Bearing from the current GPS fix to the home target, in brad units.
    ///
    /// Measured from east, counter-clockwise, the same convention the
    /// device uses for its heading values. Coordinates are degrees × 10^7,
    /// so the deltas can span the full ±3.6e9 longitude circle; they are
    /// scaled down together to fit the solver's input bound.
    pub fn home_bearing_brad(&self) -> Option<u16> {
        self.last_gps.map(|gps| {
            let mut east = i64::from(gps.target_lon) - i64::from(gps.longitude);
            let mut north = i64::from(gps.target_lat) - i64::from(gps.latitude);
            while east.abs() >= ATAN_INPUT_BOUND || north.abs() >= ATAN_INPUT_BOUND {
                east >>= 1;
                north >>= 1;
            }
            atan2_brad(east as i32, north as i32)
        })
    }

    /// Settings-frame checksum failures seen so far
    pub fn settings_mismatches(&self) -> u64 {
        self.prefs_sync.mismatches()
    }
}

impl<P: PortIO> std::fmt::Debug for Station<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Station")
            .field("tick_count", &self.tick_count)
            .field("calibrating", &self.calibrating())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prefs::PREFS_SIZE;
    use crate::serial::port_trait::mocks::MockPort;

    fn station() -> (Station<MockPort>, MockPort) {
        let port = MockPort::new();
        let station = Station::new(port.clone(), &Config::default());
        (station, port)
    }

    fn frame(mode: u8, payload: &[u8]) -> Vec<u8> {
        let mut out = vec![mode];
        out.extend_from_slice(&(payload.len() as u16).to_le_bytes());
        out.extend_from_slice(payload);
        out
    }

    fn radio_frame(channels: [i16; NUM_CHANNELS], battery_volts: i16) -> Vec<u8> {
        let mut payload = Vec::new();
        for ch in channels {
            payload.extend_from_slice(&ch.to_le_bytes());
        }
        payload.extend_from_slice(&battery_volts.to_le_bytes());
        frame(1, &payload)
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_cadence() {
        let (mut station, port) = station();

        for _ in 0..40 {
            station.tick().await.unwrap();
        }

        let writes = port.get_written_data();
        assert_eq!(writes.len(), 2, "one heartbeat per 20 ticks");
        assert!(writes.iter().all(|w| w == b"BEAT"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_suppressed_during_throttle_calibration() {
        let (mut station, port) = station();

        let outcome = station.advance_throttle_calibration(true).await.unwrap();
        assert!(matches!(outcome, AdvanceOutcome::Advanced(_)));

        for _ in 0..40 {
            station.tick().await.unwrap();
        }

        // Only the start command went out, no heartbeats
        assert_eq!(port.written_bytes(), b"TCAL");
    }

    #[tokio::test(start_paused = true)]
    async fn test_valid_settings_frame_replaces_preferences() {
        let (mut station, port) = station();

        let mut incoming = Preferences {
            max_throttle: 16000,
            ..Default::default()
        };
        incoming.stamp_checksum();
        port.queue_read(&frame(0x18, &incoming.to_bytes()));

        station.tick().await.unwrap();
        assert_eq!(station.preferences(), &incoming);
        assert_eq!(station.settings_mismatches(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_corrupt_settings_frame_requeries() {
        let (mut station, port) = station();
        let before = station.preferences().clone();

        let mut incoming = Preferences::default();
        incoming.stamp_checksum();
        let mut payload = incoming.to_bytes();
        payload[PREFS_SIZE / 2] ^= 0xFF;
        port.queue_read(&frame(0x18, &payload));

        station.tick().await.unwrap();

        assert_eq!(station.preferences(), &before);
        assert_eq!(station.settings_mismatches(), 1);
        let writes = port.get_written_data();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0], b"QPRF");
    }

    #[tokio::test(start_paused = true)]
    async fn test_radio_calibration_session_uploads_results() {
        let port = MockPort::new();
        let mut config = Config::default();
        config.calibration.sample_ticks = 60; // keep the loop short
        let mut station = Station::new(port.clone(), &config);

        station.start_radio_calibration();
        assert!(station.calibrating());

        // Reset tick sends the raw-channels request
        station.tick().await.unwrap();
        assert_eq!(port.get_written_data().last().unwrap(), b"Rrad");

        // Sweep channel 0 across its travel for the rest of the window
        for i in 0..61u32 {
            let mut channels = [0i16; NUM_CHANNELS];
            if i > 15 {
                channels[0] = if i % 2 == 0 { -1000 } else { 1000 };
            }
            port.queue_read(&radio_frame(channels, 0));
            station.tick().await.unwrap();
        }

        assert!(!station.calibrating());
        assert_eq!(station.preferences().channel_scale[0], 1049);
        assert_eq!(station.preferences().channel_center[0], 0);

        // Applied results go straight to the device
        let bytes = port.written_bytes();
        assert!(bytes.windows(4).any(|w| w == b"UPrf"));
        assert!(bytes.windows(4).any(|w| w == b"QPRF"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_battery_interlock_reads_telemetry() {
        let (mut station, port) = station();

        // Battery frame shows 11.3V: the flight battery is still plugged in
        port.queue_read(&radio_frame([0; NUM_CHANNELS], 1130));
        station.tick().await.unwrap();

        station.advance_throttle_calibration(true).await.unwrap();
        let outcome = station.advance_throttle_calibration(true).await.unwrap();
        assert!(matches!(outcome, AdvanceOutcome::Aborted(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_channel_reversed_skips_noop_upload() {
        let (mut station, port) = station();

        // Already forward: nothing to do, nothing sent
        station.set_channel_reversed(2, false).await.unwrap();
        assert!(port.get_written_data().is_empty());

        station.set_channel_reversed(2, true).await.unwrap();
        assert!(station.preferences().channel_reversed(2));
        assert!(port.written_bytes().windows(4).any(|w| w == b"UPrf"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_factory_reset_wipes_then_queries() {
        let (mut station, port) = station();

        station.factory_reset().await.unwrap();
        let writes = port.get_written_data();
        assert_eq!(writes, vec![b"WIPE".to_vec(), b"QPRF".to_vec()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_motor_test_cancels_throttle_calibration_first() {
        let (mut station, port) = station();

        station.advance_throttle_calibration(true).await.unwrap();
        station.motor_test(3).await.unwrap();

        // Escape byte drops the calibration, then the command goes out
        assert!(!station.calibrating());
        assert_eq!(port.written_bytes(), b"TCAL\x00M3t3");
    }

    #[tokio::test(start_paused = true)]
    async fn test_bench_tests_send_directly_when_idle() {
        let (mut station, port) = station();

        station.beeper_test().await.unwrap();
        station.led_test().await.unwrap();

        // No throttle session, so no escape byte precedes either command
        assert_eq!(port.written_bytes(), b"MBZZMLED");
    }

    #[tokio::test(start_paused = true)]
    async fn test_leave_calibration_view_reverts_device() {
        let (mut station, port) = station();

        station.start_radio_calibration();
        station.advance_throttle_calibration(true).await.unwrap();

        station.leave_calibration_view().await.unwrap();
        assert!(!station.calibrating());

        // Throttle escape, then both revert commands
        assert_eq!(port.written_bytes(), b"TCAL\x00RGyrRAcl");
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_packet_modes_are_dropped() {
        let (mut station, port) = station();

        port.queue_read(&frame(0x7F, &[1, 2, 3]));
        port.queue_read(&radio_frame([5; NUM_CHANNELS], 0));

        station.tick().await.unwrap();
        assert_eq!(station.latest_radio().channels, [5; NUM_CHANNELS]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_home_bearing_from_gps_fix() {
        let (mut station, port) = station();
        assert_eq!(station.home_bearing_brad(), None);

        // Home is due north of the current fix
        let mut payload = Vec::new();
        for v in [377_749_000i32, -1_224_194_000, 377_750_000, -1_224_194_000] {
            payload.extend_from_slice(&v.to_le_bytes());
        }
        payload.push(9);
        payload.push(11);
        port.queue_read(&frame(8, &payload));

        station.tick().await.unwrap();
        let bearing = station.home_bearing_brad().unwrap();
        let quarter_turn = i32::from(crate::angle::BRAD_HPI);
        assert!((i32::from(bearing) - quarter_turn).abs() <= 6, "bearing {}", bearing);
    }

    #[tokio::test(start_paused = true)]
    async fn test_home_bearing_across_antimeridian() {
        let (mut station, port) = station();

        // Fix and home sit on opposite sides of the ±180° meridian, so the
        // raw longitude delta is nearly the full circle
        let mut payload = Vec::new();
        for v in [100_000i32, -1_799_999_000, 100_000, 1_799_999_000] {
            payload.extend_from_slice(&v.to_le_bytes());
        }
        payload.push(8);
        payload.push(10);
        port.queue_read(&frame(8, &payload));

        station.tick().await.unwrap();
        // Home is due east of the fix
        assert_eq!(station.home_bearing_brad(), Some(0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_firmware_version_from_debug_frame() {
        let (mut station, port) = station();
        assert_eq!(station.firmware_version(), None);

        let mut payload = Vec::new();
        for v in [0x0312u16, 100, 200, 150] {
            payload.extend_from_slice(&v.to_le_bytes());
        }
        port.queue_read(&frame(7, &payload));

        station.tick().await.unwrap();
        assert_eq!(station.firmware_version(), Some((3, 1, 2)));
    }
}
