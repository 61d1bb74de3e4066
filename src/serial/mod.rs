//! # Serial Communication Module
//!
//! Handles the serial connection to the flight controller.
//!
//! This module handles:
//! - Probing candidate device paths and opening the first that responds
//! - Async read/write of the raw byte stream
//! - 8N1, no flow control (the pacing in the preferences upload exists
//!   precisely because the transport has none)

pub mod port_trait;

use async_trait::async_trait;
use std::io;
use tokio_serial::SerialPortBuilderExt;
use tracing::{debug, info, warn};

use crate::error::{FcLinkError, Result};
use port_trait::PortIO;

/// Serial port handler for the flight controller link
pub struct FcSerial {
    /// Serial port handle
    port: tokio_serial::SerialStream,
    /// Device path (e.g., /dev/ttyUSB0)
    device_path: String,
}

impl std::fmt::Debug for FcSerial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FcSerial")
            .field("device_path", &self.device_path)
            .finish_non_exhaustive()
    }
}

impl FcSerial {
    /// Open a connection, trying each candidate path in order.
    ///
    /// # Errors
    ///
    /// Returns [`FcLinkError::SerialPortNotFound`] when no path opens.
    pub fn open_with_paths(paths: &[String], baud_rate: u32) -> Result<Self> {
        for path in paths {
            debug!("trying to open serial port: {}", path);

            match Self::open_port(path, baud_rate) {
                Ok(port) => {
                    info!("opened flight controller link at {}", path);
                    return Ok(Self {
                        port,
                        device_path: path.clone(),
                    });
                }
                Err(e) => {
                    warn!("failed to open {}: {}", path, e);
                    continue;
                }
            }
        }

        Err(FcLinkError::SerialPortNotFound(paths.join(", ")))
    }

    fn open_port(path: &str, baud_rate: u32) -> Result<tokio_serial::SerialStream> {
        let port = tokio_serial::new(path, baud_rate)
            .data_bits(tokio_serial::DataBits::Eight)
            .parity(tokio_serial::Parity::None)
            .stop_bits(tokio_serial::StopBits::One)
            .flow_control(tokio_serial::FlowControl::None)
            .open_native_async()
            .map_err(|e| FcLinkError::Serial(format!("failed to open {}: {}", path, e)))?;

        Ok(port)
    }

    /// Get the device path of the opened serial port
    pub fn device_path(&self) -> &str {
        &self.device_path
    }
}

#[async_trait]
impl PortIO for FcSerial {
    async fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        use tokio::io::AsyncWriteExt;
        self.port.write_all(data).await?;
        self.port.flush().await
    }

    async fn flush(&mut self) -> io::Result<()> {
        use tokio::io::AsyncWriteExt;
        self.port.flush().await
    }

    async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        use tokio::io::AsyncReadExt;
        self.port.read(buf).await
    }
}
