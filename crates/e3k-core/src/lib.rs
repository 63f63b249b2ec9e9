//! E3K Core - `no_std` compatible protocol types and codec
//!
//! This crate provides the data model and wire codec shared by the E3K
//! host software and device firmware. It works in `no_std` environments
//! (the ESP32 side) as well as `std` environments.
//!
//! # Modules
//!
//! - [`types`]: Channels, channel mask, mode, rate, configuration, samples
//! - [`error`]: Configuration and protocol error types
//! - [`protocol`]: Control word encoding, frame sizing, frame codec
//!
//! # Features
//!
//! - `std` (default): Enable standard library support
//!
//! # Example
//!
//! ```rust
//! use e3k_core::protocol::{decode_frame, frame_bytes};
//! use e3k_core::types::{ChannelMask, CommMode, Configuration, DataRate};
//!
//! let config = Configuration::new(CommMode::Bluetooth, DataRate::Hz1000, ChannelMask::ALL);
//! assert_eq!(config.control_word().bits(), 0xBFE0);
//!
//! let size = frame_bytes(config.active_count());
//! assert_eq!(size, 9);
//!
//! let sample = decode_frame(&[0x12, 0x34, 0x56], 2)?;
//! assert_eq!(sample.values(), &[0x123, 0x456]);
//! # Ok::<(), e3k_core::ProtocolError>(())
//! ```

#![cfg_attr(not(any(feature = "std", test)), no_std)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::cast_possible_truncation)]

pub mod error;
pub mod protocol;
pub mod types;

// Re-export commonly used types at crate root
pub use error::{ConfigError, ProtocolError};
pub use protocol::{
    decode_frame, encode_frame, encode_readings, frame_bytes, ControlText, ControlWord,
    SampleDecoder, MAX_FRAME_BYTES,
};
pub use types::{
    AdcChannel, ChannelMask, ChannelSample, CommMode, Configuration, DataRate, MAX_CHANNELS,
    SAMPLE_BITS, SAMPLE_MAX,
};
