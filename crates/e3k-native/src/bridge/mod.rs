//! Communication bridges to the E3K device
//!
//! This module provides the transports the acquisition loop talks through:
//! - [`stream`]: Any `Read + Write` byte stream, including TCP for Wi-Fi mode
//! - [`serial`]: USB serial ports and Bluetooth SPP ports (requires `serial` feature)
//! - [`simulated`]: In-process device for tests and hardware-free runs
//!
//! Every transport implements [`Transport`]: send a control word, read up to
//! one frame of bytes.
//!
//! ```rust,ignore
//! use e3k_native::bridge::{StreamTransport, Transport};
//!
//! let mut transport = StreamTransport::open_serial(&SerialSettings::new("/dev/ttyUSB0"))?;
//! transport.send_control(config.control_word())?;
//! let frame = transport.read_frame(9)?;
//! ```

#[cfg(feature = "serial")]
pub mod serial;

pub mod simulated;
pub mod stream;

use e3k_core::protocol::ControlWord;
use thiserror::Error;

// Re-export key types
pub use simulated::SimulatedDevice;
pub use stream::StreamTransport;

#[cfg(feature = "serial")]
pub use serial::{list_ports, SerialSettings, SerialTransport};

// ============================================================================
// Error Types
// ============================================================================

/// Errors raised by a transport.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Link is closed or the device went away
    #[error("Link closed")]
    Closed,

    /// I/O error on the underlying stream
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serial port error
    #[cfg(feature = "serial")]
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),
}

impl TransportError {
    /// Map an I/O error, folding the "peer is gone" kinds into [`Closed`](Self::Closed).
    pub(crate) fn from_io(err: std::io::Error) -> Self {
        use std::io::ErrorKind;

        match err.kind() {
            ErrorKind::BrokenPipe
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::NotConnected
            | ErrorKind::UnexpectedEof => Self::Closed,
            _ => Self::Io(err),
        }
    }
}

// ============================================================================
// Transport
// ============================================================================

/// Byte link to an E3K device.
pub trait Transport {
    /// Send a control word.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] if the link is closed or the write fails.
    fn send_control(&mut self, word: ControlWord) -> Result<(), TransportError>;

    /// Read up to `size` bytes of one frame.
    ///
    /// Blocks until `size` bytes arrived or the read timeout elapsed; a short
    /// read on timeout is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] if the link is closed or the read fails.
    fn read_frame(&mut self, size: usize) -> Result<Vec<u8>, TransportError>;
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn send_control(&mut self, word: ControlWord) -> Result<(), TransportError> {
        (**self).send_control(word)
    }

    fn read_frame(&mut self, size: usize) -> Result<Vec<u8>, TransportError> {
        (**self).read_frame(size)
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn send_control(&mut self, word: ControlWord) -> Result<(), TransportError> {
        (**self).send_control(word)
    }

    fn read_frame(&mut self, size: usize) -> Result<Vec<u8>, TransportError> {
        (**self).read_frame(size)
    }
}
