//! # Error Types
//!
//! Custom error types for fc-link using `thiserror`.

use thiserror::Error;

/// Main error type for fc-link
#[derive(Debug, Error)]
pub enum FcLinkError {
    /// Link protocol errors (malformed frames, bad payload sizes)
    #[error("link protocol error: {0}")]
    Protocol(String),

    /// Serial port errors
    #[error("serial error: {0}")]
    Serial(String),

    /// No usable serial device found
    #[error("no flight controller found on: {0}")]
    SerialPortNotFound(String),

    /// Configuration errors
    #[error("configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// Configuration parsed but holds unusable values
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for fc-link
pub type Result<T> = std::result::Result<T, FcLinkError>;
