//! # Command Encoder
//!
//! Encodes the short outbound command tokens the flight controller
//! understands: 4-byte ASCII verbs plus the single-byte throttle
//! calibration control markers.

/// Single byte telling the device to enter its max-throttle state
pub const THROTTLE_MAX_BYTE: u8 = 0xFF;

/// Single byte finishing (or escaping) the throttle calibration ritual
pub const THROTTLE_FINISH_BYTE: u8 = 0x00;

/// Outbound command tokens
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Connection heartbeat, sent periodically by the tick loop
    Heartbeat,
    /// Ask the device to re-send its current preferences
    QueryPreferences,
    /// Put the device into preferences-receive mode
    UpdatePreferences,
    /// Restore factory-default preferences on the device
    WipePreferences,
    /// Clear device-side radio scale/offset so calibration sees raw values
    ResetRadioScaling,
    /// Revert to the previous (drift-compensated) gyro calibration
    RevertGyroCalibration,
    /// Revert to the previous accelerometer calibration
    RevertAccelCalibration,
    /// Zero gyro calibration for a fresh measurement session
    ZeroGyroCalibration,
    /// Zero accelerometer calibration for a fresh measurement session
    ZeroAccelCalibration,
    /// Begin the ESC throttle range programming ritual
    StartThrottleCalibration,
    /// Sound the beeper (bench test)
    BeeperTest,
    /// Flash the LED (bench test)
    LedTest,
    /// Spin one motor at test throttle; index is 1-based
    MotorTest(u8),
    /// Max-throttle marker during throttle calibration
    ThrottleMax,
    /// Finish/escape marker during throttle calibration
    ThrottleFinish,
}

impl Command {
    /// Encode the command into the bytes sent on the wire
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Self::Heartbeat => b"BEAT".to_vec(),
            Self::QueryPreferences => b"QPRF".to_vec(),
            Self::UpdatePreferences => b"UPrf".to_vec(),
            Self::WipePreferences => b"WIPE".to_vec(),
            Self::ResetRadioScaling => b"Rrad".to_vec(),
            Self::RevertGyroCalibration => b"RGyr".to_vec(),
            Self::RevertAccelCalibration => b"RAcl".to_vec(),
            Self::ZeroGyroCalibration => b"ZrGr".to_vec(),
            Self::ZeroAccelCalibration => b"ZeAc".to_vec(),
            Self::StartThrottleCalibration => b"TCAL".to_vec(),
            Self::BeeperTest => b"MBZZ".to_vec(),
            Self::LedTest => b"MLED".to_vec(),
            Self::MotorTest(index) => {
                let digit = b'0' + (*index).min(9);
                vec![b'M', digit, b't', digit]
            }
            Self::ThrottleMax => vec![THROTTLE_MAX_BYTE],
            Self::ThrottleFinish => vec![THROTTLE_FINISH_BYTE],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verb_commands_are_four_bytes() {
        let verbs = [
            Command::Heartbeat,
            Command::QueryPreferences,
            Command::UpdatePreferences,
            Command::WipePreferences,
            Command::ResetRadioScaling,
            Command::RevertGyroCalibration,
            Command::RevertAccelCalibration,
            Command::ZeroGyroCalibration,
            Command::ZeroAccelCalibration,
            Command::StartThrottleCalibration,
            Command::BeeperTest,
            Command::LedTest,
        ];
        for verb in verbs {
            assert_eq!(verb.encode().len(), 4, "{:?}", verb);
        }
    }

    #[test]
    fn test_known_verbs() {
        assert_eq!(Command::Heartbeat.encode(), b"BEAT");
        assert_eq!(Command::QueryPreferences.encode(), b"QPRF");
        assert_eq!(Command::UpdatePreferences.encode(), b"UPrf");
        assert_eq!(Command::ResetRadioScaling.encode(), b"Rrad");
    }

    #[test]
    fn test_motor_test_is_parameterized() {
        assert_eq!(Command::MotorTest(1).encode(), b"M1t1");
        assert_eq!(Command::MotorTest(6).encode(), b"M6t6");
    }

    #[test]
    fn test_throttle_control_bytes() {
        assert_eq!(Command::ThrottleMax.encode(), vec![0xFF]);
        assert_eq!(Command::ThrottleFinish.encode(), vec![0x00]);
    }
}
