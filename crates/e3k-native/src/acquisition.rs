//! Acquisition loop
//!
//! Runs one acquisition: configure the device, wait for it to settle, read
//! and decode a fixed number of frames, then turn the stream off again.
//!
//! Frames that fail to decode are skipped and counted; the run keeps going.
//! Transport failures end the run, and the stop word is still attempted.
//!
//! # Example
//!
//! ```rust
//! use e3k_core::types::{ChannelMask, CommMode, Configuration, DataRate};
//! use e3k_native::acquisition::{Acquisition, AcquisitionSettings};
//! use e3k_native::bridge::{SimulatedDevice, StreamTransport};
//! use std::time::Duration;
//!
//! let transport = StreamTransport::new(SimulatedDevice::new());
//! let settings = AcquisitionSettings { settle_delay: Duration::ZERO, ..Default::default() };
//! let mut acquisition = Acquisition::new(transport).with_settings(settings);
//!
//! let config = Configuration::new(CommMode::Bluetooth, DataRate::Hz1000, ChannelMask::ALL);
//! let buffer = acquisition.run(&config, 10)?;
//! assert_eq!(buffer.len(), 10);
//! # Ok::<(), e3k_native::acquisition::AcquisitionError>(())
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use e3k_core::error::ConfigError;
use e3k_core::protocol::{decode_frame, frame_bytes, ControlWord};
use e3k_core::types::{AdcChannel, ChannelMask, ChannelSample, Configuration};

use crate::bridge::{Transport, TransportError};

// ============================================================================
// Error Types
// ============================================================================

/// Errors that end an acquisition run.
#[derive(Debug, Error)]
pub enum AcquisitionError {
    /// Configuration cannot be acquired with
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// Configuring the device failed; nothing was read
    #[error("Failed to configure device: {0}")]
    Transport(#[from] TransportError),

    /// A frame read failed part-way through the run
    #[error("Read failed after {} samples: {source}", .partial.len())]
    ReadFailed {
        /// Transport error that ended the run
        #[source]
        source: TransportError,
        /// Samples collected before the failure
        partial: SampleBuffer,
    },
}

/// Result type for acquisition runs.
pub type AcquisitionResult<T> = Result<T, AcquisitionError>;

// ============================================================================
// Pacing
// ============================================================================

/// Blocking delay primitive.
pub trait Pacer {
    /// Block for `duration`.
    fn pause(&mut self, duration: Duration);
}

/// Pacer that sleeps the calling thread.
#[derive(Clone, Copy, Debug, Default)]
pub struct ThreadPacer;

impl Pacer for ThreadPacer {
    fn pause(&mut self, duration: Duration) {
        if !duration.is_zero() {
            std::thread::sleep(duration);
        }
    }
}

impl<P: Pacer + ?Sized> Pacer for &mut P {
    fn pause(&mut self, duration: Duration) {
        (**self).pause(duration);
    }
}

/// How reads are spaced out.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Pacing {
    /// Serial mode waits one rate interval between reads; wireless modes
    /// rely on the link's flow control
    #[default]
    Auto,
    /// Always wait this long between reads
    Fixed(Duration),
    /// Never wait between reads
    Off,
}

impl Pacing {
    /// Delay between reads for `config`, if any.
    #[must_use]
    pub fn interval(self, config: &Configuration) -> Option<Duration> {
        match self {
            Self::Auto if config.mode.needs_host_pacing() => Some(config.rate.pacing_interval()),
            Self::Auto | Self::Off => None,
            Self::Fixed(interval) => Some(interval),
        }
    }
}

/// Acquisition loop settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcquisitionSettings {
    /// Wait after sending the configuration before the first read
    pub settle_delay: Duration,
    /// Spacing between reads
    pub pacing: Pacing,
}

impl Default for AcquisitionSettings {
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_secs(1),
            pacing: Pacing::Auto,
        }
    }
}

// ============================================================================
// Sample Buffer
// ============================================================================

/// Upper bound on the samples reserved up front; larger runs grow on demand.
const PREALLOCATED_SAMPLES: usize = 4096;

/// Samples collected by one acquisition run.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SampleBuffer {
    channels: ChannelMask,
    requested: usize,
    skipped: usize,
    samples: Vec<ChannelSample>,
}

impl SampleBuffer {
    /// Create an empty buffer for a run over `channels`.
    #[must_use]
    pub fn new(channels: ChannelMask, requested: usize) -> Self {
        Self {
            channels,
            requested,
            skipped: 0,
            samples: Vec::with_capacity(requested.min(PREALLOCATED_SAMPLES)),
        }
    }

    /// Append a decoded sample.
    pub fn push(&mut self, sample: ChannelSample) {
        self.samples.push(sample);
    }

    /// Count a frame that was dropped.
    pub fn record_skip(&mut self) {
        self.skipped += 1;
    }

    /// Channels the samples were acquired with.
    #[must_use]
    pub fn channels(&self) -> ChannelMask {
        self.channels
    }

    /// Number of samples requested.
    #[must_use]
    pub fn requested(&self) -> usize {
        self.requested
    }

    /// Number of frames skipped because they failed to decode.
    #[must_use]
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    /// Number of samples collected.
    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Check if no sample was collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Check if every requested sample was collected.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.samples.len() == self.requested
    }

    /// Collected samples in arrival order.
    #[must_use]
    pub fn samples(&self) -> &[ChannelSample] {
        &self.samples
    }

    /// Iterate over the collected samples.
    pub fn iter(&self) -> std::slice::Iter<'_, ChannelSample> {
        self.samples.iter()
    }

    /// Values of one hardware channel across all samples.
    ///
    /// Returns `None` if the channel was not active during the run.
    #[must_use]
    pub fn channel_series(&self, channel: AdcChannel) -> Option<Vec<u16>> {
        let position = self.channels.position_of(channel)?;
        Some(self.samples.iter().filter_map(|s| s.get(position)).collect())
    }
}

impl<'a> IntoIterator for &'a SampleBuffer {
    type Item = &'a ChannelSample;
    type IntoIter = std::slice::Iter<'a, ChannelSample>;

    fn into_iter(self) -> Self::IntoIter {
        self.samples.iter()
    }
}

// ============================================================================
// Acquisition
// ============================================================================

/// Acquisition runner bound to one transport.
///
/// Runs are sequential and blocking; the transport is borrowed mutably for
/// the whole run.
pub struct Acquisition<T, P = ThreadPacer> {
    transport: T,
    pacer: P,
    settings: AcquisitionSettings,
    cancel: Option<Arc<AtomicBool>>,
}

impl<T: Transport> Acquisition<T> {
    /// Create a runner that sleeps the calling thread for delays.
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            pacer: ThreadPacer,
            settings: AcquisitionSettings::default(),
            cancel: None,
        }
    }
}

impl<T: Transport, P: Pacer> Acquisition<T, P> {
    /// Replace the delay primitive.
    pub fn with_pacer<Q: Pacer>(self, pacer: Q) -> Acquisition<T, Q> {
        Acquisition {
            transport: self.transport,
            pacer,
            settings: self.settings,
            cancel: self.cancel,
        }
    }

    /// Replace the settings.
    #[must_use]
    pub fn with_settings(mut self, settings: AcquisitionSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Stop runs early when `flag` is set; checked before every read.
    #[must_use]
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    /// Current settings.
    pub fn settings(&self) -> &AcquisitionSettings {
        &self.settings
    }

    /// Borrow the transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Mutably borrow the transport.
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Borrow the pacer.
    pub fn pacer(&self) -> &P {
        &self.pacer
    }

    /// Release the transport.
    pub fn into_transport(self) -> T {
        self.transport
    }

    /// Acquire `sample_count` samples with `config`.
    ///
    /// The returned buffer may hold fewer samples than requested when frames
    /// were skipped or the run was cancelled.
    ///
    /// # Errors
    ///
    /// - [`AcquisitionError::Config`] if no channel is active
    /// - [`AcquisitionError::Transport`] if the configuration cannot be sent
    /// - [`AcquisitionError::ReadFailed`] if a read fails mid-run; the
    ///   samples collected so far travel with the error
    pub fn run(
        &mut self,
        config: &Configuration,
        sample_count: usize,
    ) -> AcquisitionResult<SampleBuffer> {
        let active = config.active_count();
        if active == 0 {
            return Err(ConfigError::NoActiveChannels.into());
        }

        let word = config.control_word();
        let frame_size = frame_bytes(active);
        let interval = self.settings.pacing.interval(config);

        tracing::info!(
            "Starting acquisition: {} samples, control word {} ({} mode, {}, channels {})",
            sample_count,
            word,
            config.mode,
            config.rate,
            config.channels
        );
        if !config.stream_on {
            tracing::warn!("Stream bit is off; the device will not send frames");
        }

        self.transport.send_control(word)?;
        self.pacer.pause(self.settings.settle_delay);

        let mut buffer = SampleBuffer::new(config.channels, sample_count);
        let mut failure = None;

        for index in 0..sample_count {
            if self.is_cancelled() {
                tracing::info!("Acquisition cancelled after {} samples", buffer.len());
                break;
            }

            if index > 0 {
                if let Some(interval) = interval {
                    self.pacer.pause(interval);
                }
            }

            let frame = match self.transport.read_frame(frame_size) {
                Ok(frame) => frame,
                Err(e) => {
                    tracing::error!("Read failed at sample {}: {}", index, e);
                    failure = Some(e);
                    break;
                }
            };

            match decode_frame(&frame, active) {
                Ok(sample) => {
                    tracing::trace!("Sample {}: {:?}", index, sample);
                    buffer.push(sample);
                }
                Err(e) => {
                    tracing::warn!("Skipping frame {}: {}", index, e);
                    buffer.record_skip();
                }
            }
        }

        self.send_stop();

        if let Some(source) = failure {
            return Err(AcquisitionError::ReadFailed { source, partial: buffer });
        }

        tracing::info!(
            "Acquisition finished: {}/{} samples, {} skipped",
            buffer.len(),
            sample_count,
            buffer.skipped()
        );
        Ok(buffer)
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|flag| flag.load(Ordering::Relaxed))
    }

    /// Best effort: the device may already be unreachable.
    fn send_stop(&mut self) {
        if let Err(e) = self.transport.send_control(ControlWord::STOP) {
            tracing::warn!("Failed to send stop word: {}", e);
        }
    }
}

/// Run one acquisition over `transport` with default settings.
///
/// # Errors
///
/// See [`Acquisition::run`].
pub fn acquire<T: Transport + ?Sized>(
    config: &Configuration,
    sample_count: usize,
    transport: &mut T,
) -> AcquisitionResult<SampleBuffer> {
    Acquisition::new(transport).run(config, sample_count)
}

// ============================================================================
// Tests
// ============================================================================
