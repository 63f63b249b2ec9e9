//! E3K Native - Host-side acquisition for the E3K sensor board
//!
//! This crate provides the host half of the E3K link:
//! - Transports over serial ports, TCP sockets, and a simulated device
//! - The acquisition loop: configure, settle, read frames, stop
//!
//! # Modules
//!
//! - [`bridge`]: Communication bridges (serial, TCP, simulated)
//! - [`acquisition`]: Acquisition loop and sample buffers

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

pub mod acquisition;
pub mod bridge;

// Re-export key types
pub use acquisition::{
    acquire, Acquisition, AcquisitionError, AcquisitionResult, AcquisitionSettings, Pacer, Pacing,
    SampleBuffer, ThreadPacer,
};
pub use bridge::{SimulatedDevice, StreamTransport, Transport, TransportError};

#[cfg(feature = "serial")]
pub use bridge::{list_ports, SerialSettings, SerialTransport};
