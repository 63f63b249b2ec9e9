//! Wire protocol for E3K device communication
//!
//! Two things cross the wire:
//!
//! - **Host → device**: a 16-bit control word, sent as decimal ASCII text.
//! - **Device → host**: one frame per sample, holding the 12-bit value of
//!   every active channel packed back to back with no padding between
//!   channels.
//!
//! # Control word layout
//!
//! ```text
//!  15 | 14 13 | 12 11 | 10  9  8  7  6  5 | 4 3 2 1 0
//!  on | mode  | rate  | A0 A1 A2 A3 A4 A5 | reserved
//! ```
//!
//! # Frame layout
//!
//! Two 12-bit values `a` and `b` share three bytes:
//!
//! ```text
//! byte 0: a[11:4]
//! byte 1: a[3:0] b[11:8]
//! byte 2: b[7:0]
//! ```
//!
//! An odd trailing value takes two bytes and leaves the low nibble of the
//! second byte unused.

use core::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;
use crate::types::{
    AdcChannel, ChannelMask, ChannelSample, CommMode, Configuration, DataRate, MAX_CHANNELS,
    SAMPLE_MAX,
};

// ============================================================================
// Control Word
// ============================================================================

/// Packed 16-bit device configuration.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ControlWord(u16);

impl ControlWord {
    /// Stop/reset word: turns the data stream off.
    pub const STOP: Self = Self(0);

    /// Stream on/off bit
    pub const STREAM_BIT: u32 = 15;
    /// Lowest bit of the communication mode field
    pub const MODE_SHIFT: u32 = 13;
    /// Lowest bit of the data rate field
    pub const RATE_SHIFT: u32 = 11;
    /// Bit of channel 0; channel `i` sits at `CHANNEL_TOP_BIT - i`
    pub const CHANNEL_TOP_BIT: u32 = 10;
    /// Reserved low bits, always zero when encoded
    pub const RESERVED_MASK: u16 = 0x001F;

    /// Pack a configuration.
    ///
    /// Always starts from an empty word, so no bits carry over from a
    /// previous configuration.
    #[must_use]
    pub const fn encode(config: &Configuration) -> Self {
        let mut word: u16 = 0;

        if config.stream_on {
            word |= 1 << Self::STREAM_BIT;
        }
        word |= (config.mode.code() as u16) << Self::MODE_SHIFT;
        word |= (config.rate.code() as u16) << Self::RATE_SHIFT;

        let mut i = 0;
        while i < MAX_CHANNELS {
            if config.channels.bits() & (1 << i) != 0 {
                word |= 1 << (Self::CHANNEL_TOP_BIT - i as u32);
            }
            i += 1;
        }

        Self(word)
    }

    /// Wrap raw bits received from the wire.
    #[inline]
    #[must_use]
    pub const fn from_bits(bits: u16) -> Self {
        Self(bits)
    }

    /// Raw 16-bit value.
    #[inline]
    #[must_use]
    pub const fn bits(self) -> u16 {
        self.0
    }

    /// Unpack into a configuration, as the device firmware does.
    ///
    /// Every 16-bit value decodes; the reserved bits are ignored.
    #[must_use]
    pub fn decode(self) -> Configuration {
        let word = self.0;

        let channels = AdcChannel::ALL
            .into_iter()
            .filter(|&ch| word & (1 << (Self::CHANNEL_TOP_BIT - ch.index() as u32)) != 0)
            .fold(ChannelMask::NONE, ChannelMask::with);

        Configuration {
            stream_on: word & (1 << Self::STREAM_BIT) != 0,
            mode: CommMode::from_code_bits((word >> Self::MODE_SHIFT) as u8),
            rate: DataRate::from_code_bits((word >> Self::RATE_SHIFT) as u8),
            channels,
        }
    }

    /// Decimal ASCII form sent over the wire.
    #[must_use]
    pub const fn to_ascii(self) -> ControlText {
        let mut digits = [0u8; ControlText::CAPACITY];
        let mut start = ControlText::CAPACITY;
        let mut n = self.0;

        loop {
            start -= 1;
            digits[start] = b'0' + (n % 10) as u8;
            n /= 10;
            if n == 0 {
                break;
            }
        }

        ControlText { digits, start: start as u8 }
    }

    /// Parse the decimal ASCII form received by the device.
    ///
    /// Surrounding ASCII whitespace (a trailing newline from a terminal,
    /// say) is ignored.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::InvalidControlWord`] if the text is empty,
    /// contains a non-digit, or exceeds 65535.
    pub fn parse_ascii(text: &[u8]) -> Result<Self, ProtocolError> {
        let text = text.trim_ascii();
        if text.is_empty() {
            return Err(ProtocolError::InvalidControlWord);
        }

        let mut value: u32 = 0;
        for &byte in text {
            if !byte.is_ascii_digit() {
                return Err(ProtocolError::InvalidControlWord);
            }
            value = value * 10 + u32::from(byte - b'0');
            if value > u32::from(u16::MAX) {
                return Err(ProtocolError::InvalidControlWord);
            }
        }

        Ok(Self(value as u16))
    }
}

impl From<&Configuration> for ControlWord {
    fn from(config: &Configuration) -> Self {
        Self::encode(config)
    }
}

impl fmt::Display for ControlWord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:04X}", self.0)
    }
}

impl Configuration {
    /// Control word for this configuration.
    #[inline]
    #[must_use]
    pub const fn control_word(&self) -> ControlWord {
        ControlWord::encode(self)
    }
}

/// Decimal ASCII digits of a control word, without heap allocation.
#[derive(Copy, Clone, PartialEq, Eq)]
pub struct ControlText {
    digits: [u8; Self::CAPACITY],
    start: u8,
}

impl ControlText {
    /// Digits in `u16::MAX`
    pub const CAPACITY: usize = 5;

    /// The ASCII bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.digits[self.start as usize..]
    }
}

impl fmt::Debug for ControlText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Only ASCII digits are ever stored.
        let text = core::str::from_utf8(self.as_bytes()).map_err(|_| fmt::Error)?;
        write!(f, "{text:?}")
    }
}

// ============================================================================
// Frame Size
// ============================================================================

/// Bytes in one frame for `active` channels.
///
/// Each pair of channels takes three bytes and a trailing unpaired channel
/// takes two: 0→0, 1→2, 2→3, 3→5, 4→6, 5→8, 6→9. A size of zero means there
/// is nothing to read.
#[inline]
#[must_use]
pub const fn frame_bytes(active: usize) -> usize {
    3 * (active / 2) + if active % 2 == 1 { 2 } else { 0 }
}

/// Largest frame the device sends (six channels).
pub const MAX_FRAME_BYTES: usize = frame_bytes(MAX_CHANNELS);

// ============================================================================
// Sample Decoder
// ============================================================================

/// Position of the decoder inside a three-byte, two-channel cycle.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum DecodeState {
    /// Next byte holds bits 11..4 of a new channel
    HighByte,
    /// Next byte's high nibble holds bits 3..0 of the current channel
    LowNibble,
    /// Same byte's low nibble holds bits 11..8 of the next channel
    HighNibble,
    /// Next byte holds bits 7..0 of the current channel
    LowByte,
    /// All channels decoded
    Complete,
}

/// Incremental frame decoder.
///
/// Feed the bytes of one frame with [`push`](Self::push), then call
/// [`finish`](Self::finish). A fresh decoder is needed per frame, so no
/// bits leak from one frame into the next.
///
/// # Example
///
/// ```
/// use e3k_core::protocol::SampleDecoder;
///
/// let mut decoder = SampleDecoder::new(2)?;
/// for byte in [0x12, 0x34, 0x56] {
///     decoder.push(byte)?;
/// }
/// let sample = decoder.finish()?;
/// assert_eq!(sample.values(), &[0x123, 0x456]);
/// # Ok::<(), e3k_core::ProtocolError>(())
/// ```
#[derive(Clone, Debug)]
pub struct SampleDecoder {
    values: [u16; MAX_CHANNELS],
    cursor: usize,
    expected: usize,
    state: DecodeState,
}

impl SampleDecoder {
    /// Create a decoder for a frame with `active` channels.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::InvalidChannelCount`] unless `active` is in 1..=6.
    pub const fn new(active: usize) -> Result<Self, ProtocolError> {
        if active == 0 || active > MAX_CHANNELS {
            return Err(ProtocolError::InvalidChannelCount { count: active });
        }
        Ok(Self {
            values: [0; MAX_CHANNELS],
            cursor: 0,
            expected: active,
            state: DecodeState::HighByte,
        })
    }

    /// Consume one byte.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::TrailingBytes`] if every channel has already
    /// been decoded.
    pub fn push(&mut self, byte: u8) -> Result<(), ProtocolError> {
        let b = u16::from(byte);

        loop {
            match self.state {
                DecodeState::HighByte => {
                    self.values[self.cursor] = b << 4;
                    self.state = DecodeState::LowNibble;
                    return Ok(());
                }
                DecodeState::LowNibble => {
                    self.values[self.cursor] |= b >> 4;
                    self.cursor += 1;
                    if self.cursor == self.expected {
                        // Odd channel count: the low nibble is padding.
                        self.state = DecodeState::Complete;
                        return Ok(());
                    }
                    // The low nibble of this same byte starts the next channel.
                    self.state = DecodeState::HighNibble;
                }
                DecodeState::HighNibble => {
                    self.values[self.cursor] = (b & 0x0F) << 8;
                    self.state = DecodeState::LowByte;
                    return Ok(());
                }
                DecodeState::LowByte => {
                    self.values[self.cursor] |= b;
                    self.cursor += 1;
                    self.state = if self.cursor == self.expected {
                        DecodeState::Complete
                    } else {
                        DecodeState::HighByte
                    };
                    return Ok(());
                }
                DecodeState::Complete => {
                    return Err(ProtocolError::TrailingBytes { decoded: self.cursor });
                }
            }
        }
    }

    /// Check whether every channel has been decoded.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.state == DecodeState::Complete
    }

    /// Channels decoded so far.
    #[must_use]
    pub const fn decoded(&self) -> usize {
        self.cursor
    }

    /// Return the decoded sample.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::IncompleteFrame`] if the frame ended early;
    /// the partial values are discarded.
    pub fn finish(self) -> Result<ChannelSample, ProtocolError> {
        if !self.is_complete() {
            return Err(ProtocolError::IncompleteFrame {
                decoded: self.cursor,
                expected: self.expected,
            });
        }
        Ok(ChannelSample::from_parts(self.values, self.expected))
    }
}

/// Decode one frame of `active` channels.
///
/// # Errors
///
/// Returns [`ProtocolError::InvalidChannelCount`] unless `active` is in
/// 1..=6, and [`ProtocolError::FrameLength`] if `frame` is not exactly
/// [`frame_bytes(active)`](frame_bytes) long.
pub fn decode_frame(frame: &[u8], active: usize) -> Result<ChannelSample, ProtocolError> {
    let mut decoder = SampleDecoder::new(active)?;

    let expected = frame_bytes(active);
    if frame.len() != expected {
        return Err(ProtocolError::FrameLength { received: frame.len(), expected });
    }

    for &byte in frame {
        decoder.push(byte)?;
    }

    decoder.finish()
}

// ============================================================================
// Frame Encoder (device side)
// ============================================================================

/// Pack 12-bit values into a frame.
///
/// This is the device's packing rule. Returns the number of bytes written,
/// always [`frame_bytes(values.len())`](frame_bytes).
///
/// # Errors
///
/// Returns [`ProtocolError::InvalidChannelCount`] for zero or more than six
/// values, [`ProtocolError::SampleOutOfRange`] for a value above 4095, and
/// [`ProtocolError::BufferOverflow`] if `buffer` is too small.
pub fn encode_frame(values: &[u16], buffer: &mut [u8]) -> Result<usize, ProtocolError> {
    if values.is_empty() || values.len() > MAX_CHANNELS {
        return Err(ProtocolError::InvalidChannelCount { count: values.len() });
    }
    if let Some(&value) = values.iter().find(|&&v| v > SAMPLE_MAX) {
        return Err(ProtocolError::SampleOutOfRange { value });
    }

    let size = frame_bytes(values.len());
    if buffer.len() < size {
        return Err(ProtocolError::BufferOverflow {
            required: size,
            available: buffer.len(),
        });
    }

    let mut offset = 0;
    for pair in values.chunks(2) {
        let first = pair[0];
        buffer[offset] = (first >> 4) as u8;
        buffer[offset + 1] = ((first & 0x0F) << 4) as u8;

        if let Some(&second) = pair.get(1) {
            buffer[offset + 1] |= (second >> 8) as u8;
            buffer[offset + 2] = (second & 0xFF) as u8;
            offset += 3;
        } else {
            offset += 2;
        }
    }

    Ok(size)
}

/// Pack the active channels of a full set of ADC readings.
///
/// `readings` is indexed by hardware channel; inactive channels are skipped.
///
/// # Errors
///
/// Same as [`encode_frame`].
pub fn encode_readings(
    mask: ChannelMask,
    readings: &[u16; MAX_CHANNELS],
    buffer: &mut [u8],
) -> Result<usize, ProtocolError> {
    let mut active = [0u16; MAX_CHANNELS];
    let mut count = 0;
    for ch in mask.active_channels() {
        active[count] = readings[ch.index()];
        count += 1;
    }
    encode_frame(&active[..count], buffer)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_bytes_table() {
        let table = [0, 2, 3, 5, 6, 8, 9];
        for (active, &expected) in table.iter().enumerate() {
            assert_eq!(frame_bytes(active), expected, "active = {active}");
        }
        assert_eq!(MAX_FRAME_BYTES, 9);
    }

    #[test]
    fn test_encode_all_channels_bluetooth_1000hz() {
        let config = Configuration::new(CommMode::Bluetooth, DataRate::Hz1000, ChannelMask::ALL);
        assert_eq!(config.control_word().bits(), 0xBFE0);
        assert_eq!(config.control_word().bits(), 49120);
    }

    #[test]
    fn test_encode_is_pure() {
        let channels = ChannelMask::from_bits(0b10_1010).unwrap();
        let config = Configuration::new(CommMode::WiFi, DataRate::Hz500, channels);
        assert_eq!(ControlWord::encode(&config), ControlWord::encode(&config));
    }

    #[test]
    fn test_encode_fields_do_not_overlap() {
        let modes = [CommMode::Serial, CommMode::Bluetooth, CommMode::WiFi, CommMode::Default];

        for stream_on in [false, true] {
            for mode in modes {
                for rate in DataRate::ALL {
                    for bits in [0u8, 0b00_0001, 0b10_0000, 0b01_0110, 0b11_1111] {
                        let config = Configuration {
                            stream_on,
                            mode,
                            rate,
                            channels: ChannelMask::from_bits(bits).unwrap(),
                        };
                        let word = config.control_word().bits();

                        assert_eq!(word & 0x8000, u16::from(stream_on) << 15);
                        assert_eq!((word >> 13) & 0b11, u16::from(mode.code()));
                        assert_eq!((word >> 11) & 0b11, u16::from(rate.code()));
                        assert_eq!(word & ControlWord::RESERVED_MASK, 0);
                        let set_bits = usize::from(stream_on)
                            + mode.code().count_ones() as usize
                            + rate.code().count_ones() as usize
                            + config.active_count();
                        assert_eq!(word.count_ones() as usize, set_bits);
                    }
                }
            }
        }
    }

    #[test]
    fn test_channel_bit_positions() {
        let only_a0 = Configuration {
            stream_on: false,
            mode: CommMode::Serial,
            rate: DataRate::Hz10,
            channels: ChannelMask::NONE.with(AdcChannel::A0),
        };
        assert_eq!(only_a0.control_word().bits(), 1 << 10);

        let only_a5 = Configuration {
            channels: ChannelMask::NONE.with(AdcChannel::A5),
            ..only_a0
        };
        assert_eq!(only_a5.control_word().bits(), 1 << 5);
    }

    #[test]
    fn test_control_word_decode_inverts_encode() {
        let config = Configuration {
            stream_on: true,
            mode: CommMode::Serial,
            rate: DataRate::Hz100,
            channels: ChannelMask::from_channels(&[AdcChannel::A1, AdcChannel::A4]),
        };
        assert_eq!(config.control_word().decode(), config);
    }

    #[test]
    fn test_control_word_decode_ignores_reserved_bits() {
        let word = ControlWord::from_bits(0xBFE0 | 0x001F);
        let config = word.decode();
        assert_eq!(config.control_word().bits(), 0xBFE0);
    }

    #[test]
    fn test_stop_word_ascii() {
        assert_eq!(ControlWord::STOP.to_ascii().as_bytes(), b"0");
        assert_eq!(ControlWord::STOP.to_ascii().as_bytes(), &[0x30]);
    }

    #[test]
    fn test_control_word_ascii() {
        assert_eq!(ControlWord::from_bits(49120).to_ascii().as_bytes(), b"49120");
        assert_eq!(ControlWord::from_bits(u16::MAX).to_ascii().as_bytes(), b"65535");
        assert_eq!(ControlWord::from_bits(7).to_ascii().as_bytes(), b"7");
    }

    #[test]
    fn test_parse_ascii() {
        assert_eq!(ControlWord::parse_ascii(b"49120"), Ok(ControlWord::from_bits(0xBFE0)));
        assert_eq!(ControlWord::parse_ascii(b"0\r\n"), Ok(ControlWord::STOP));
        assert_eq!(ControlWord::parse_ascii(b"65536"), Err(ProtocolError::InvalidControlWord));
        assert_eq!(ControlWord::parse_ascii(b"12a"), Err(ProtocolError::InvalidControlWord));
        assert_eq!(ControlWord::parse_ascii(b""), Err(ProtocolError::InvalidControlWord));
    }

    #[test]
    fn test_decode_single_channel_discards_padding() {
        let sample = decode_frame(&[0xAB, 0xC5], 1).unwrap();
        assert_eq!(sample.values(), &[0xABC]);
        assert_eq!(sample.values(), &[2748]);
    }

    #[test]
    fn test_decode_two_channels() {
        let sample = decode_frame(&[0x12, 0x34, 0x56], 2).unwrap();
        assert_eq!(sample.values(), &[0x123, 0x456]);
    }

    #[test]
    fn test_decode_three_channels() {
        // 0x123, 0x456, 0x789 with the last nibble as padding
        let sample = decode_frame(&[0x12, 0x34, 0x56, 0x78, 0x9F], 3).unwrap();
        assert_eq!(sample.values(), &[0x123, 0x456, 0x789]);
    }

    #[test]
    fn test_decode_six_channels() {
        let frame = [0xFF, 0xF0, 0x00, 0x80, 0x08, 0x00, 0x00, 0x1F, 0xFE];
        let sample = decode_frame(&frame, 6).unwrap();
        assert_eq!(sample.values(), &[0xFFF, 0x000, 0x800, 0x800, 0x001, 0xFFE]);
    }

    #[test]
    fn test_decode_wrong_length() {
        assert_eq!(
            decode_frame(&[0x12, 0x34], 2),
            Err(ProtocolError::FrameLength { received: 2, expected: 3 })
        );
        assert_eq!(
            decode_frame(&[0x12, 0x34, 0x56, 0x78], 2),
            Err(ProtocolError::FrameLength { received: 4, expected: 3 })
        );
    }

    #[test]
    fn test_decode_invalid_channel_count() {
        assert_eq!(decode_frame(&[], 0), Err(ProtocolError::InvalidChannelCount { count: 0 }));
        assert_eq!(decode_frame(&[0; 11], 7), Err(ProtocolError::InvalidChannelCount { count: 7 }));
    }

    #[test]
    fn test_decoder_rejects_trailing_byte() {
        let mut decoder = SampleDecoder::new(1).unwrap();
        decoder.push(0xAB).unwrap();
        decoder.push(0xC5).unwrap();
        assert!(decoder.is_complete());
        assert_eq!(decoder.push(0x00), Err(ProtocolError::TrailingBytes { decoded: 1 }));
    }

    #[test]
    fn test_decoder_incomplete_frame() {
        let mut decoder = SampleDecoder::new(4).unwrap();
        for byte in [0x12, 0x34, 0x56, 0x78] {
            decoder.push(byte).unwrap();
        }
        assert_eq!(decoder.decoded(), 2);
        assert_eq!(
            decoder.finish(),
            Err(ProtocolError::IncompleteFrame { decoded: 2, expected: 4 })
        );
    }

    #[test]
    fn test_decoder_does_not_carry_bits_between_frames() {
        let first = decode_frame(&[0xFF, 0xFF, 0xFF], 2).unwrap();
        let second = decode_frame(&[0x00, 0x00, 0x00], 2).unwrap();
        assert_eq!(first.values(), &[0xFFF, 0xFFF]);
        assert_eq!(second.values(), &[0, 0]);
    }

    #[test]
    fn test_encode_frame_matches_known_bytes() {
        let mut buffer = [0u8; MAX_FRAME_BYTES];

        let size = encode_frame(&[0x123, 0x456], &mut buffer).unwrap();
        assert_eq!(&buffer[..size], &[0x12, 0x34, 0x56]);

        let size = encode_frame(&[0xABC], &mut buffer).unwrap();
        assert_eq!(&buffer[..size], &[0xAB, 0xC0]);
    }

    #[test]
    fn test_encode_frame_errors() {
        let mut buffer = [0u8; MAX_FRAME_BYTES];
        assert_eq!(
            encode_frame(&[4096], &mut buffer),
            Err(ProtocolError::SampleOutOfRange { value: 4096 })
        );
        assert_eq!(
            encode_frame(&[], &mut buffer),
            Err(ProtocolError::InvalidChannelCount { count: 0 })
        );
        assert_eq!(
            encode_frame(&[1, 2, 3], &mut buffer[..4]),
            Err(ProtocolError::BufferOverflow { required: 5, available: 4 })
        );
    }

    #[test]
    fn test_encode_readings_skips_inactive_channels() {
        let mask = ChannelMask::from_channels(&[AdcChannel::A1, AdcChannel::A2]);
        let readings = [0xAAA, 0x123, 0x456, 0xBBB, 0xCCC, 0xDDD];
        let mut buffer = [0u8; MAX_FRAME_BYTES];

        let size = encode_readings(mask, &readings, &mut buffer).unwrap();
        assert_eq!(&buffer[..size], &[0x12, 0x34, 0x56]);
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn test_roundtrip_six_channels(values in prop::array::uniform6(0u16..=SAMPLE_MAX)) {
                let mut buffer = [0u8; MAX_FRAME_BYTES];
                let size = encode_frame(&values, &mut buffer).unwrap();
                let sample = decode_frame(&buffer[..size], 6).unwrap();
                prop_assert_eq!(sample.values(), &values[..]);
            }

            #[test]
            fn test_roundtrip_any_channel_count(
                values in prop::collection::vec(0u16..=SAMPLE_MAX, 1..=MAX_CHANNELS)
            ) {
                let mut buffer = [0u8; MAX_FRAME_BYTES];
                let size = encode_frame(&values, &mut buffer).unwrap();
                prop_assert_eq!(size, frame_bytes(values.len()));
                let sample = decode_frame(&buffer[..size], values.len()).unwrap();
                prop_assert_eq!(sample.values(), &values[..]);
            }

            #[test]
            fn test_control_word_roundtrip(bits in any::<u16>()) {
                let word = ControlWord::from_bits(bits);
                prop_assert_eq!(ControlWord::parse_ascii(word.to_ascii().as_bytes()), Ok(word));
                let reencoded = word.decode().control_word().bits();
                prop_assert_eq!(reencoded, bits & !ControlWord::RESERVED_MASK);
            }
        }
    }
}
