//! Core types for the E3K acquisition device
//!
//! This module provides the data model shared by the host and the device:
//! - Hardware ADC channel identifiers and the 6-bit channel mask
//! - Communication mode and data rate enumerations
//! - The device [`Configuration`]
//! - Decoded multi-channel samples

use core::fmt;
use core::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

// ============================================================================
// Protocol Constants
// ============================================================================

/// Number of hardware ADC channels on the device.
pub const MAX_CHANNELS: usize = 6;

/// Bit width of one ADC sample.
pub const SAMPLE_BITS: u32 = 12;

/// Largest value a 12-bit sample can take (4095).
pub const SAMPLE_MAX: u16 = (1 << SAMPLE_BITS) - 1;

// ============================================================================
// ADC Channels
// ============================================================================

/// Hardware ADC channel of the E3K board.
///
/// The declaration order is the hardware index order used by the channel
/// mask and by the frame packing: `A0` is always packed first.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum AdcChannel {
    /// Channel 0 (GPIO 32)
    A0 = 0,
    /// Channel 1 (GPIO 39)
    A1 = 1,
    /// Channel 2 (GPIO 36)
    A2 = 2,
    /// Channel 3 (GPIO 33)
    A3 = 3,
    /// Channel 4 (GPIO 35)
    A4 = 4,
    /// Channel 5 (GPIO 34)
    A5 = 5,
}

impl AdcChannel {
    /// All channels in hardware index order.
    pub const ALL: [Self; MAX_CHANNELS] = [
        Self::A0,
        Self::A1,
        Self::A2,
        Self::A3,
        Self::A4,
        Self::A5,
    ];

    /// Hardware index (0..5).
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Create from a hardware index.
    #[must_use]
    pub const fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(Self::A0),
            1 => Some(Self::A1),
            2 => Some(Self::A2),
            3 => Some(Self::A3),
            4 => Some(Self::A4),
            5 => Some(Self::A5),
            _ => None,
        }
    }

    /// ESP32 GPIO pin the channel is sampled from.
    #[must_use]
    pub const fn gpio(self) -> u8 {
        match self {
            Self::A0 => 32,
            Self::A1 => 39,
            Self::A2 => 36,
            Self::A3 => 33,
            Self::A4 => 35,
            Self::A5 => 34,
        }
    }
}

impl fmt::Display for AdcChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "A{}", self.index())
    }
}

// ============================================================================
// Channel Mask
// ============================================================================

/// Set of active hardware channels.
///
/// Bit `i` of the inner value is set when channel `i` is active.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct ChannelMask(u8);

impl ChannelMask {
    /// No channels active
    pub const NONE: Self = Self(0);

    /// All six channels active
    pub const ALL: Self = Self(0b0011_1111);

    /// Create from raw bits (bit `i` = channel `i`).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidChannelBits`] if a bit above channel 5 is set.
    pub const fn from_bits(bits: u8) -> Result<Self, ConfigError> {
        if bits & !Self::ALL.0 != 0 {
            return Err(ConfigError::InvalidChannelBits { bits });
        }
        Ok(Self(bits))
    }

    /// Create from per-channel on/off flags, channel 0 first.
    ///
    /// Fewer than six flags leave the remaining channels off.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::TooManyChannels`] for more than six flags.
    pub fn from_flags(flags: &[bool]) -> Result<Self, ConfigError> {
        if flags.len() > MAX_CHANNELS {
            return Err(ConfigError::TooManyChannels { count: flags.len() });
        }

        let bits = flags
            .iter()
            .enumerate()
            .filter(|(_, &on)| on)
            .fold(0u8, |acc, (i, _)| acc | (1 << i));

        Ok(Self(bits))
    }

    /// Create from a list of channels.
    #[must_use]
    pub fn from_channels(channels: &[AdcChannel]) -> Self {
        channels.iter().fold(Self::NONE, |mask, &ch| mask.with(ch))
    }

    /// Raw bits (bit `i` = channel `i`).
    #[inline]
    #[must_use]
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Return a copy with `channel` enabled.
    #[must_use]
    pub const fn with(self, channel: AdcChannel) -> Self {
        Self(self.0 | (1 << channel as u8))
    }

    /// Check whether `channel` is active.
    #[inline]
    #[must_use]
    pub const fn is_active(self, channel: AdcChannel) -> bool {
        self.0 & (1 << channel as u8) != 0
    }

    /// Number of active channels (0..=6).
    #[inline]
    #[must_use]
    pub const fn active_count(self) -> usize {
        self.0.count_ones() as usize
    }

    /// Check if no channel is active.
    #[inline]
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Active channels in ascending hardware index order.
    pub fn active_channels(self) -> impl Iterator<Item = AdcChannel> {
        AdcChannel::ALL.into_iter().filter(move |&ch| self.is_active(ch))
    }

    /// Position of `channel` among the active channels.
    ///
    /// This is the index of the channel's value inside a decoded
    /// [`ChannelSample`]; `None` if the channel is inactive.
    #[must_use]
    pub const fn position_of(self, channel: AdcChannel) -> Option<usize> {
        if !self.is_active(channel) {
            return None;
        }
        let below = self.0 & ((1 << channel as u8) - 1);
        Some(below.count_ones() as usize)
    }
}

impl TryFrom<u8> for ChannelMask {
    type Error = ConfigError;

    fn try_from(bits: u8) -> Result<Self, Self::Error> {
        Self::from_bits(bits)
    }
}

impl From<ChannelMask> for u8 {
    fn from(mask: ChannelMask) -> Self {
        mask.0
    }
}

impl fmt::Debug for ChannelMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChannelMask({:06b})", self.0)
    }
}

impl fmt::Display for ChannelMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, ch) in self.active_channels().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{ch}")?;
        }
        Ok(())
    }
}

// ============================================================================
// Communication Mode
// ============================================================================

/// Link the device streams over.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum CommMode {
    /// USB UART
    Serial = 0,
    /// Bluetooth classic (SPP)
    Bluetooth = 1,
    /// Wi-Fi socket
    WiFi = 2,
    /// Firmware default (falls back to serial)
    Default = 3,
}

impl CommMode {
    /// 2-bit wire code.
    #[inline]
    #[must_use]
    pub const fn code(self) -> u8 {
        self as u8
    }

    /// Decode a 2-bit wire code (upper bits are ignored).
    #[must_use]
    pub const fn from_code_bits(code: u8) -> Self {
        match code & 0b11 {
            0 => Self::Serial,
            1 => Self::Bluetooth,
            2 => Self::WiFi,
            _ => Self::Default,
        }
    }

    /// Whether the host must pace reads itself.
    ///
    /// Bluetooth and Wi-Fi links rely on the transport's flow control.
    #[must_use]
    pub const fn needs_host_pacing(self) -> bool {
        matches!(self, Self::Serial)
    }
}

impl TryFrom<u8> for CommMode {
    type Error = ConfigError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        if code > 3 {
            return Err(ConfigError::InvalidMode { code });
        }
        Ok(Self::from_code_bits(code))
    }
}

impl fmt::Display for CommMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Serial => "serial",
            Self::Bluetooth => "bluetooth",
            Self::WiFi => "wifi",
            Self::Default => "default",
        };
        f.write_str(name)
    }
}

// ============================================================================
// Data Rate
// ============================================================================

/// Streaming rate of the device.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum DataRate {
    /// 10 samples per second
    Hz10 = 0,
    /// 100 samples per second
    Hz100 = 1,
    /// 500 samples per second
    Hz500 = 2,
    /// 1000 samples per second
    Hz1000 = 3,
}

impl DataRate {
    /// All rates, slowest first.
    pub const ALL: [Self; 4] = [Self::Hz10, Self::Hz100, Self::Hz500, Self::Hz1000];

    /// 2-bit wire code.
    #[inline]
    #[must_use]
    pub const fn code(self) -> u8 {
        self as u8
    }

    /// Decode a 2-bit wire code (upper bits are ignored).
    #[must_use]
    pub const fn from_code_bits(code: u8) -> Self {
        match code & 0b11 {
            0 => Self::Hz10,
            1 => Self::Hz100,
            2 => Self::Hz500,
            _ => Self::Hz1000,
        }
    }

    /// Rate in Hz.
    #[must_use]
    pub const fn hz(self) -> u16 {
        match self {
            Self::Hz10 => 10,
            Self::Hz100 => 100,
            Self::Hz500 => 500,
            Self::Hz1000 => 1000,
        }
    }

    /// Look up a rate by its value in Hz.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnsupportedRate`] for anything but 10, 100, 500 or 1000.
    pub const fn from_hz(hz: u16) -> Result<Self, ConfigError> {
        match hz {
            10 => Ok(Self::Hz10),
            100 => Ok(Self::Hz100),
            500 => Ok(Self::Hz500),
            1000 => Ok(Self::Hz1000),
            _ => Err(ConfigError::UnsupportedRate { hz }),
        }
    }

    /// Host-side delay between serial reads at this rate.
    #[must_use]
    pub const fn pacing_interval(self) -> Duration {
        match self {
            Self::Hz10 => Duration::from_secs(1),
            Self::Hz100 => Duration::from_millis(100),
            Self::Hz500 => Duration::from_millis(10),
            Self::Hz1000 => Duration::from_millis(1),
        }
    }
}

impl TryFrom<u8> for DataRate {
    type Error = ConfigError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        if code > 3 {
            return Err(ConfigError::InvalidRate { code });
        }
        Ok(Self::from_code_bits(code))
    }
}

impl fmt::Display for DataRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} Hz", self.hz())
    }
}

// ============================================================================
// Device Configuration
// ============================================================================

/// Streaming configuration sent to the device as a control word.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Configuration {
    /// Data stream on (`true`) or off
    pub stream_on: bool,
    /// Communication mode
    pub mode: CommMode,
    /// Data rate
    pub rate: DataRate,
    /// Active ADC channels
    pub channels: ChannelMask,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            stream_on: true,
            mode: CommMode::Bluetooth,
            rate: DataRate::Hz10,
            channels: ChannelMask::ALL,
        }
    }
}

impl Configuration {
    /// Create a streaming configuration.
    #[must_use]
    pub const fn new(mode: CommMode, rate: DataRate, channels: ChannelMask) -> Self {
        Self { stream_on: true, mode, rate, channels }
    }

    /// Build from raw field values as a host API would receive them.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the mode or rate code is outside its
    /// 2-bit range or more than six channel flags are given.
    pub fn from_raw(
        stream_on: bool,
        mode: u8,
        rate: u8,
        channels: &[bool],
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            stream_on,
            mode: CommMode::try_from(mode)?,
            rate: DataRate::try_from(rate)?,
            channels: ChannelMask::from_flags(channels)?,
        })
    }

    /// Number of active channels.
    #[inline]
    #[must_use]
    pub const fn active_count(&self) -> usize {
        self.channels.active_count()
    }
}

// ============================================================================
// Decoded Sample
// ============================================================================

/// One decoded multi-channel sample.
///
/// Holds one 12-bit value per *active* channel. Value `i` belongs to the
/// `i`-th active channel in ascending hardware index order, not to hardware
/// channel `i`; use [`ChannelMask::position_of`] to map a hardware channel
/// to its position.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Default)]
pub struct ChannelSample {
    values: [u16; MAX_CHANNELS],
    len: u8,
}

impl ChannelSample {
    /// Create from decoded values.
    ///
    /// Returns `None` for more than six values or any value above 4095.
    #[must_use]
    pub fn from_values(values: &[u16]) -> Option<Self> {
        if values.len() > MAX_CHANNELS || values.iter().any(|&v| v > SAMPLE_MAX) {
            return None;
        }
        let mut sample = Self::default();
        sample.values[..values.len()].copy_from_slice(values);
        sample.len = values.len() as u8;
        Some(sample)
    }

    /// Values must already be masked to 12 bits.
    pub(crate) const fn from_parts(values: [u16; MAX_CHANNELS], len: usize) -> Self {
        Self { values, len: len as u8 }
    }

    /// Decoded values, one per active channel.
    #[inline]
    #[must_use]
    pub fn values(&self) -> &[u16] {
        &self.values[..self.len as usize]
    }

    /// Number of values.
    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len as usize
    }

    /// Check if the sample holds no values.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Value at a position among the active channels.
    #[must_use]
    pub fn get(&self, position: usize) -> Option<u16> {
        self.values().get(position).copied()
    }

    /// Value of a hardware channel, given the mask the sample was acquired with.
    #[must_use]
    pub fn channel(&self, mask: ChannelMask, channel: AdcChannel) -> Option<u16> {
        mask.position_of(channel).and_then(|pos| self.get(pos))
    }
}

impl fmt::Debug for ChannelSample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.values()).finish()
    }
}

impl Serialize for ChannelSample {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.values().serialize(serializer)
    }
}

// ============================================================================
// Tests
// ============================================================================
