//! Serial bridge for E3K communication
//!
//! Handles the USB UART link to the ESP32. Bluetooth SPP links exposed by the
//! operating system as serial devices (`/dev/rfcomm0`, `COM5`) go through the
//! same path.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::{StreamTransport, TransportError};

/// Baud rate the E3K firmware uses.
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Read timeout for frame reads.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(100);

/// Serial transport to an E3K device.
pub type SerialTransport = StreamTransport<Box<dyn serialport::SerialPort>>;

/// Serial port parameters.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerialSettings {
    /// Serial port name (e.g., "/dev/ttyUSB0" or "COM3")
    pub port: String,
    /// Baud rate
    pub baud_rate: u32,
    /// Read timeout
    pub timeout: Duration,
}

impl SerialSettings {
    /// Settings for `port` with the firmware's baud rate and default timeout.
    #[must_use]
    pub fn new(port: impl Into<String>) -> Self {
        Self {
            port: port.into(),
            baud_rate: DEFAULT_BAUD_RATE,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl StreamTransport<Box<dyn serialport::SerialPort>> {
    /// Open a serial connection to the E3K device
    ///
    /// # Errors
    ///
    /// Returns error if port cannot be opened
    pub fn open_serial(settings: &SerialSettings) -> Result<Self, TransportError> {
        let port = serialport::new(&settings.port, settings.baud_rate)
            .timeout(settings.timeout)
            .open()?;

        tracing::info!("Opened {} at {} baud", settings.port, settings.baud_rate);
        Ok(Self::new(port))
    }
}

/// List available serial ports
#[must_use]
pub fn list_ports() -> Vec<String> {
    serialport::available_ports()
        .map(|ports| ports.into_iter().map(|p| p.port_name).collect())
        .unwrap_or_default()
}
