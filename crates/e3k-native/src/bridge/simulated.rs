//! Simulated E3K device
//!
//! A byte-level stand-in for the firmware. Control words written to it are
//! parsed on `flush`, and while the stream bit is on every read serves the
//! next encoded frame. Wrap it in a [`StreamTransport`](super::StreamTransport)
//! to exercise the whole host path without hardware.
//!
//! Reads report [`ErrorKind::TimedOut`] when there is nothing to send, the
//! same way a serial port with a read timeout does.

use std::collections::VecDeque;
use std::io::{self, ErrorKind, Read, Write};

use e3k_core::protocol::{encode_readings, ControlWord, MAX_FRAME_BYTES};
use e3k_core::types::{
    AdcChannel, ChannelMask, CommMode, Configuration, DataRate, MAX_CHANNELS, SAMPLE_MAX,
};

/// In-process E3K device.
#[derive(Debug)]
pub struct SimulatedDevice {
    config: Configuration,
    inbox: Vec<u8>,
    outbox: VecDeque<u8>,
    timeout_pending: bool,
    frames_generated: u64,
    truncate_every: Option<u64>,
    received: Vec<ControlWord>,
    connected: bool,
}

impl Default for SimulatedDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedDevice {
    /// Create a device in its power-on state: stream off, serial mode, no channels.
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: Configuration {
                stream_on: false,
                mode: CommMode::Serial,
                rate: DataRate::Hz100,
                channels: ChannelMask::NONE,
            },
            inbox: Vec::new(),
            outbox: VecDeque::new(),
            timeout_pending: false,
            frames_generated: 0,
            truncate_every: None,
            received: Vec::new(),
            connected: true,
        }
    }

    /// Cut every `n`-th frame in half, followed by a read timeout.
    #[must_use]
    pub fn with_truncated_frames(mut self, every: u64) -> Self {
        self.truncate_every = (every > 0).then_some(every);
        self
    }

    /// ADC reading the device reports for `channel` in frame `frame_index`.
    ///
    /// Each channel is a sawtooth with its own phase, so every value fits in
    /// 12 bits and neighbouring channels never repeat each other.
    #[must_use]
    pub fn reading(frame_index: u64, channel: AdcChannel) -> u16 {
        let phase = channel.index() as u64 * 683;
        ((frame_index * 41 + phase) % (u64::from(SAMPLE_MAX) + 1)) as u16
    }

    /// Configuration decoded from the last control word.
    #[must_use]
    pub fn configuration(&self) -> &Configuration {
        &self.config
    }

    /// Control words received so far, oldest first.
    #[must_use]
    pub fn received_controls(&self) -> &[ControlWord] {
        &self.received
    }

    /// Number of frames generated, including truncated ones.
    #[must_use]
    pub fn frames_generated(&self) -> u64 {
        self.frames_generated
    }

    /// Drop the link: reads hit end-of-stream and writes fail.
    pub fn disconnect(&mut self) {
        self.connected = false;
    }

    fn apply_control(&mut self) {
        let text = std::mem::take(&mut self.inbox);
        match ControlWord::parse_ascii(&text) {
            Ok(word) => {
                self.config = word.decode();
                self.received.push(word);
                self.outbox.clear();
                self.timeout_pending = false;
                tracing::debug!("Simulated device configured: {:?}", self.config);
            }
            Err(e) => tracing::warn!("Simulated device ignored control text {:?}: {}", text, e),
        }
    }

    fn generate_frame(&mut self) {
        let index = self.frames_generated;
        self.frames_generated += 1;

        let mut readings = [0u16; MAX_CHANNELS];
        for ch in AdcChannel::ALL {
            readings[ch.index()] = Self::reading(index, ch);
        }

        let mut frame = [0u8; MAX_FRAME_BYTES];
        let Ok(size) = encode_readings(self.config.channels, &readings, &mut frame) else {
            return;
        };

        let truncate = self.truncate_every.is_some_and(|n| (index + 1) % n == 0);
        let size = if truncate {
            self.timeout_pending = true;
            size / 2
        } else {
            size
        };

        self.outbox.extend(&frame[..size]);
    }
}

impl Read for SimulatedDevice {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if !self.connected {
            return Ok(0);
        }

        if self.outbox.is_empty() {
            if self.timeout_pending {
                self.timeout_pending = false;
                return Err(io::Error::new(ErrorKind::TimedOut, "frame cut short"));
            }
            if !self.config.stream_on || self.config.channels.is_empty() {
                return Err(io::Error::new(ErrorKind::TimedOut, "stream is off"));
            }
            self.generate_frame();
        }

        let n = buf.len().min(self.outbox.len());
        for (dst, src) in buf.iter_mut().zip(self.outbox.drain(..n)) {
            *dst = src;
        }
        Ok(n)
    }
}

impl Write for SimulatedDevice {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if !self.connected {
            return Err(io::Error::from(ErrorKind::BrokenPipe));
        }
        self.inbox.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if !self.connected {
            return Err(io::Error::from(ErrorKind::BrokenPipe));
        }
        if !self.inbox.is_empty() {
            self.apply_control();
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use e3k_core::protocol::decode_frame;

    use super::*;

    fn configure(device: &mut SimulatedDevice, config: &Configuration) {
        device.write_all(config.control_word().to_ascii().as_bytes()).unwrap();
        device.flush().unwrap();
    }

    #[test]
    fn test_power_on_state_is_silent() {
        let mut device = SimulatedDevice::new();
        let mut buf = [0u8; 9];
        let err = device.read(&mut buf).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TimedOut);
    }

    #[test]
    fn test_parses_control_word_on_flush() {
        let mut device = SimulatedDevice::new();
        let config = Configuration::new(CommMode::Bluetooth, DataRate::Hz1000, ChannelMask::ALL);

        configure(&mut device, &config);

        assert_eq!(device.configuration(), &config);
        assert_eq!(device.received_controls(), &[ControlWord::from_bits(0xBFE0)]);
    }

    #[test]
    fn test_streams_decodable_frames() {
        let mut device = SimulatedDevice::new();
        let mask = ChannelMask::from_channels(&[AdcChannel::A0, AdcChannel::A3, AdcChannel::A5]);
        configure(&mut device, &Configuration::new(CommMode::Serial, DataRate::Hz10, mask));

        for index in 0..3 {
            let mut frame = [0u8; 5];
            assert_eq!(device.read(&mut frame).unwrap(), 5);

            let sample = decode_frame(&frame, 3).unwrap();
            assert_eq!(
                sample.values(),
                &[
                    SimulatedDevice::reading(index, AdcChannel::A0),
                    SimulatedDevice::reading(index, AdcChannel::A3),
                    SimulatedDevice::reading(index, AdcChannel::A5),
                ]
            );
        }
    }

    #[test]
    fn test_stop_word_ends_stream() {
        let mut device = SimulatedDevice::new();
        configure(&mut device, &Configuration::default());

        let mut buf = [0u8; 2];
        assert!(device.read(&mut buf).is_ok());

        device.write_all(b"0").unwrap();
        device.flush().unwrap();

        assert!(!device.configuration().stream_on);
        assert_eq!(device.read(&mut buf).unwrap_err().kind(), ErrorKind::TimedOut);
    }

    #[test]
    fn test_truncated_frame_then_timeout() {
        let mut device = SimulatedDevice::new().with_truncated_frames(2);
        configure(&mut device, &Configuration::default());

        let mut buf = [0u8; 9];
        assert_eq!(device.read(&mut buf).unwrap(), 9);
        assert_eq!(device.read(&mut buf).unwrap(), 4);
        assert_eq!(device.read(&mut buf).unwrap_err().kind(), ErrorKind::TimedOut);
        assert_eq!(device.read(&mut buf).unwrap(), 9);
        assert_eq!(device.frames_generated(), 3);
    }

    #[test]
    fn test_ignores_garbage_control_text() {
        let mut device = SimulatedDevice::new();
        device.write_all(b"on please").unwrap();
        device.flush().unwrap();
        assert!(device.received_controls().is_empty());
        assert!(!device.configuration().stream_on);
    }

    #[test]
    fn test_disconnect() {
        let mut device = SimulatedDevice::new();
        device.disconnect();

        let mut buf = [0u8; 2];
        assert_eq!(device.read(&mut buf).unwrap(), 0);
        assert_eq!(device.write(b"0").unwrap_err().kind(), ErrorKind::BrokenPipe);
    }
}
