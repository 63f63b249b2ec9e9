//! Byte-stream transport
//!
//! Wraps anything that is `Read + Write`: a serial port, a TCP socket, a
//! Bluetooth SPP device node, or the simulated device.

use std::io::{ErrorKind, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use e3k_core::protocol::ControlWord;

use super::{Transport, TransportError};

/// Transport over a blocking byte stream.
///
/// Control words go out as decimal ASCII. Frame reads loop until the
/// requested size is reached or the stream reports a timeout.
pub struct StreamTransport<S> {
    stream: S,
    bytes_sent: u64,
    bytes_received: u64,
}

impl<S: Read + Write> StreamTransport<S> {
    /// Wrap a stream.
    ///
    /// The stream should have a read timeout configured; otherwise a missing
    /// frame blocks forever.
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            bytes_sent: 0,
            bytes_received: 0,
        }
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &S {
        &self.stream
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut S {
        &mut self.stream
    }

    /// Unwrap the underlying stream.
    pub fn into_inner(self) -> S {
        self.stream
    }

    /// Total bytes written.
    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent
    }

    /// Total bytes read.
    pub fn bytes_received(&self) -> u64 {
        self.bytes_received
    }
}

impl StreamTransport<TcpStream> {
    /// Connect to a device in Wi-Fi mode.
    ///
    /// # Errors
    ///
    /// Returns error if the connection cannot be established.
    pub fn connect_tcp(
        addr: impl ToSocketAddrs,
        read_timeout: Duration,
    ) -> Result<Self, TransportError> {
        let stream = TcpStream::connect(addr)?;
        stream.set_read_timeout(Some(read_timeout))?;
        stream.set_nodelay(true)?;

        tracing::info!("Connected to {}", stream.peer_addr()?);
        Ok(Self::new(stream))
    }
}

impl<S: Read + Write> Transport for StreamTransport<S> {
    fn send_control(&mut self, word: ControlWord) -> Result<(), TransportError> {
        let text = word.to_ascii();

        self.stream.write_all(text.as_bytes()).map_err(TransportError::from_io)?;
        self.stream.flush().map_err(TransportError::from_io)?;

        self.bytes_sent += text.as_bytes().len() as u64;
        tracing::debug!("Sent control word {} as {:?}", word, text);
        Ok(())
    }

    fn read_frame(&mut self, size: usize) -> Result<Vec<u8>, TransportError> {
        let mut frame = vec![0u8; size];
        let mut filled = 0;

        while filled < size {
            match self.stream.read(&mut frame[filled..]) {
                Ok(0) if filled == 0 => return Err(TransportError::Closed),
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => break,
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(TransportError::from_io(e)),
            }
        }

        if filled < size {
            tracing::debug!("Short read: got {}/{} bytes", filled, size);
        }

        frame.truncate(filled);
        self.bytes_received += filled as u64;
        Ok(frame)
    }
}

// ============================================================================
// Tests
// ============================================================================
