//! Error types for the E3K protocol
//!
//! These errors work in `no_std` environments and carry enough context to
//! debug a bad configuration or a corrupted frame without heap allocation.

use core::fmt;

use serde::{Deserialize, Serialize};

// ============================================================================
// Configuration Errors
// ============================================================================

/// Invalid configuration field value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigError {
    /// Communication mode code outside 0..=3
    InvalidMode {
        /// Code that was given
        code: u8,
    },
    /// Data rate code outside 0..=3
    InvalidRate {
        /// Code that was given
        code: u8,
    },
    /// Data rate in Hz the device cannot stream at
    UnsupportedRate {
        /// Requested rate in Hz
        hz: u16,
    },
    /// More channel entries than hardware channels
    TooManyChannels {
        /// Number of entries given
        count: usize,
    },
    /// Channel mask with bits set above channel 5
    InvalidChannelBits {
        /// Raw mask bits
        bits: u8,
    },
    /// No channel is active, so there is nothing to read
    NoActiveChannels,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidMode { code } => write!(f, "Invalid communication mode code: {code}"),
            Self::InvalidRate { code } => write!(f, "Invalid data rate code: {code}"),
            Self::UnsupportedRate { hz } => {
                write!(f, "Unsupported data rate: {hz} Hz (expected 10, 100, 500 or 1000)")
            }
            Self::TooManyChannels { count } => {
                write!(f, "Too many channels: {count} given, device has 6")
            }
            Self::InvalidChannelBits { bits } => {
                write!(f, "Invalid channel mask: 0b{bits:08b}")
            }
            Self::NoActiveChannels => write!(f, "No active channels"),
        }
    }
}

// ============================================================================
// Protocol Errors
// ============================================================================

/// Errors while encoding or decoding wire data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProtocolError {
    /// Frame length does not match the active channel count
    FrameLength {
        /// Bytes received
        received: usize,
        /// Bytes expected for the active channel count
        expected: usize,
    },
    /// Byte arrived after all channels of the frame were decoded
    TrailingBytes {
        /// Number of channels already decoded
        decoded: usize,
    },
    /// Frame ended before all channels were decoded
    IncompleteFrame {
        /// Channels decoded so far
        decoded: usize,
        /// Channels expected
        expected: usize,
    },
    /// Active channel count outside 1..=6
    InvalidChannelCount {
        /// Requested channel count
        count: usize,
    },
    /// Sample value does not fit in 12 bits
    SampleOutOfRange {
        /// Offending value
        value: u16,
    },
    /// Output buffer too small
    BufferOverflow {
        /// Required size
        required: usize,
        /// Available size
        available: usize,
    },
    /// Control word text is not a decimal number in 0..=65535
    InvalidControlWord,
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FrameLength { received, expected } => {
                write!(f, "Frame length mismatch: got {received} bytes, expected {expected}")
            }
            Self::TrailingBytes { decoded } => {
                write!(f, "Trailing bytes after {decoded} decoded channels")
            }
            Self::IncompleteFrame { decoded, expected } => {
                write!(f, "Incomplete frame: decoded {decoded}/{expected} channels")
            }
            Self::InvalidChannelCount { count } => {
                write!(f, "Invalid active channel count: {count} (expected 1..=6)")
            }
            Self::SampleOutOfRange { value } => {
                write!(f, "Sample out of range: {value} > 4095")
            }
            Self::BufferOverflow { required, available } => {
                write!(f, "Buffer overflow: need {required} bytes, have {available}")
            }
            Self::InvalidControlWord => write!(f, "Invalid control word text"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for ConfigError {}

#[cfg(feature = "std")]
impl std::error::Error for ProtocolError {}
