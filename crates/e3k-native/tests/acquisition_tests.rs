//! End-to-end acquisition against the simulated device

use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use proptest::prelude::*;

use e3k_core::protocol::ControlWord;
use e3k_core::types::{AdcChannel, ChannelMask, CommMode, Configuration, DataRate};
use e3k_native::acquisition::{acquire, Acquisition, AcquisitionError, AcquisitionSettings, Pacer};
use e3k_native::bridge::{SimulatedDevice, StreamTransport, TransportError};

#[derive(Default)]
struct RecordingPacer {
    pauses: Vec<Duration>,
}

impl Pacer for RecordingPacer {
    fn pause(&mut self, duration: Duration) {
        self.pauses.push(duration);
    }
}

type SimulatedAcquisition = Acquisition<StreamTransport<SimulatedDevice>, RecordingPacer>;

fn acquisition(device: SimulatedDevice) -> SimulatedAcquisition {
    Acquisition::new(StreamTransport::new(device)).with_pacer(RecordingPacer::default())
}

#[test]
fn test_full_run_over_simulated_device() {
    let mut acq = acquisition(SimulatedDevice::new());
    let config = Configuration::new(CommMode::Bluetooth, DataRate::Hz1000, ChannelMask::ALL);

    let buffer = acq.run(&config, 25).unwrap();

    assert!(buffer.is_complete());
    assert_eq!(buffer.skipped(), 0);
    for (index, sample) in buffer.iter().enumerate() {
        for ch in AdcChannel::ALL {
            assert_eq!(
                sample.channel(buffer.channels(), ch),
                Some(SimulatedDevice::reading(index as u64, ch))
            );
        }
    }

    let device = acq.transport().get_ref();
    assert_eq!(
        device.received_controls(),
        &[ControlWord::from_bits(0xBFE0), ControlWord::STOP]
    );
    assert!(!device.configuration().stream_on);
    assert_eq!(acq.transport().bytes_received(), 25 * 9);
    assert_eq!(acq.pacer().pauses, vec![Duration::from_secs(1)]);
}

#[test]
fn test_partial_channel_selection_keeps_positions() {
    let mut acq = acquisition(SimulatedDevice::new());
    let mask = ChannelMask::from_channels(&[AdcChannel::A1, AdcChannel::A2, AdcChannel::A5]);
    let config = Configuration::new(CommMode::WiFi, DataRate::Hz500, mask);

    let buffer = acq.run(&config, 4).unwrap();

    assert_eq!(buffer.len(), 4);
    assert_eq!(buffer.samples()[0].len(), 3);
    assert_eq!(
        buffer.channel_series(AdcChannel::A5),
        Some((0..4).map(|i| SimulatedDevice::reading(i, AdcChannel::A5)).collect())
    );
    assert_eq!(buffer.channel_series(AdcChannel::A0), None);
}

#[test]
fn test_truncated_frames_are_skipped() {
    let mut acq = acquisition(SimulatedDevice::new().with_truncated_frames(3));
    let config = Configuration::new(CommMode::Bluetooth, DataRate::Hz100, ChannelMask::ALL);

    let buffer = acq.run(&config, 9).unwrap();

    // Frames 3, 6 and 9 arrive cut short.
    assert_eq!(buffer.len(), 6);
    assert_eq!(buffer.skipped(), 3);
    assert!(!buffer.is_complete());
    assert_eq!(acq.transport().get_ref().received_controls().last(), Some(&ControlWord::STOP));
}

#[test]
fn test_serial_mode_paces_reads() {
    let mut acq = acquisition(SimulatedDevice::new());
    let settings = AcquisitionSettings {
        settle_delay: Duration::ZERO,
        ..Default::default()
    };
    acq = acq.with_settings(settings);

    let channels = ChannelMask::NONE.with(AdcChannel::A0);
    let config = Configuration::new(CommMode::Serial, DataRate::Hz1000, channels);
    let buffer = acq.run(&config, 3).unwrap();

    assert_eq!(buffer.len(), 3);
    assert_eq!(
        acq.pacer().pauses,
        vec![Duration::ZERO, Duration::from_millis(1), Duration::from_millis(1)]
    );
}

#[test]
fn test_acquire_with_default_settings() {
    let mut transport = StreamTransport::new(SimulatedDevice::new().with_truncated_frames(2));
    let config = Configuration::new(CommMode::Bluetooth, DataRate::Hz1000, ChannelMask::ALL);

    let buffer = acquire(&config, 4, &mut transport).unwrap();

    assert_eq!(buffer.len(), 2);
    assert_eq!(buffer.skipped(), 2);
    assert_eq!(buffer.requested(), 4);
    assert_eq!(
        transport.get_ref().received_controls(),
        &[config.control_word(), ControlWord::STOP]
    );
}

#[test]
fn test_cancelled_run_accepts_unbounded_sample_count() {
    let cancel = Arc::new(AtomicBool::new(true));
    let mut acq = acquisition(SimulatedDevice::new()).with_cancel_flag(cancel);
    let config = Configuration::new(CommMode::Bluetooth, DataRate::Hz1000, ChannelMask::ALL);

    let buffer = acq.run(&config, usize::MAX).unwrap();

    assert!(buffer.is_empty());
    assert_eq!(buffer.skipped(), 0);
    assert_eq!(acq.transport().get_ref().received_controls().last(), Some(&ControlWord::STOP));
}

#[test]
fn test_disconnected_device_fails_to_configure() {
    let mut device = SimulatedDevice::new();
    device.disconnect();
    let mut acq = acquisition(device);

    let result = acq.run(&Configuration::default(), 3);

    assert!(matches!(result, Err(AcquisitionError::Transport(TransportError::Closed))));
}

#[test]
fn test_stream_off_yields_no_samples() {
    let mut acq = acquisition(SimulatedDevice::new());
    let config = Configuration {
        stream_on: false,
        ..Configuration::default()
    };

    let buffer = acq.run(&config, 3).unwrap();

    assert!(buffer.is_empty());
    assert_eq!(buffer.skipped(), 3);
}

proptest! {
    #[test]
    fn prop_any_mask_decodes_simulated_readings(bits in 1u8..64, count in 1usize..12) {
        let mask = ChannelMask::from_bits(bits).unwrap();
        let config = Configuration::new(CommMode::Bluetooth, DataRate::Hz1000, mask);
        let mut acq = acquisition(SimulatedDevice::new());

        let buffer = acq.run(&config, count).unwrap();

        prop_assert_eq!(buffer.len(), count);
        for ch in mask.active_channels() {
            let expected: Vec<u16> =
                (0..count as u64).map(|i| SimulatedDevice::reading(i, ch)).collect();
            prop_assert_eq!(buffer.channel_series(ch), Some(expected));
        }
    }
}
