//! The Serial API frame codec (§3, §4.1, §6). Pure functions mapping
//! between byte sequences and typed frames: no I/O, no retry policy — that
//! lives in the link coordinator (`zhost_driver::link`).

use bytes::{Bytes, BytesMut};
use zhost_core::prelude::*;

pub const SOF: u8 = 0x01;
pub const ACK: u8 = 0x06;
pub const NAK: u8 = 0x15;
pub const CAN: u8 = 0x18;

/// A single-byte acknowledgement frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ControlByte {
    Ack = ACK,
    Nak = NAK,
    Can = CAN,
}

impl ControlByte {
    pub fn as_byte(&self) -> u8 {
        *self as u8
    }

    fn from_byte(b: u8) -> Option<Self> {
        match b {
            ACK => Some(Self::Ack),
            NAK => Some(Self::Nak),
            CAN => Some(Self::Can),
            _ => None,
        }
    }
}

impl std::fmt::Display for ControlByte {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Ack => "ACK",
            Self::Nak => "NAK",
            Self::Can => "CAN",
        };
        write!(f, "{name}")
    }
}

/// A length-prefixed, checksum-protected Serial API data frame (§3).
///
/// `checksum` is always the value that was actually on the wire (for a
/// frame just parsed) or the value `encode` will compute (for one built to
/// send, where it starts as a placeholder and is overwritten). Use
/// [`DataFrame::checksum_valid`] rather than comparing it yourself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataFrame {
    pub command_type: CommandType,
    pub function_id: FunctionType,
    pub payload: Bytes,
    checksum: u8,
}

impl DataFrame {
    /// Builds a frame ready to hand to [`encode`]; the checksum is computed
    /// there, not here.
    pub fn new(command_type: CommandType, function_id: FunctionType, payload: Bytes) -> Self {
        let mut frame = Self {
            command_type,
            function_id,
            payload,
            checksum: 0,
        };
        frame.checksum = frame.compute_checksum();
        frame
    }

    /// The frame `length` byte: type + function id + payload, not counting
    /// the start-of-frame byte, the length byte itself, or the checksum.
    pub fn declared_length(&self) -> u8 {
        (self.payload.len() + 2) as u8
    }

    fn compute_checksum(&self) -> u8 {
        let mut buf = Vec::with_capacity(self.payload.len() + 3);
        buf.push(self.declared_length());
        buf.push(self.command_type.into());
        buf.push(self.function_id.value());
        buf.extend_from_slice(&self.payload);
        zhost_core::checksum::xor_sum(&buf)
    }

    /// Whether the checksum this frame carries (as received off the wire)
    /// matches what it should be. A frame built by [`DataFrame::new`]
    /// always passes.
    pub fn checksum_valid(&self) -> bool {
        self.checksum == self.compute_checksum()
    }
}

/// The result of one scan over an inbound byte buffer (§4.1).
#[derive(Debug, PartialEq, Eq)]
pub enum Frame {
    Control(ControlByte),
    Data(DataFrame),
}

/// Scans from `buffer[0]` for a recognized frame. The link is
/// self-resynchronizing: unrecognized leading bytes are discarded one at a
/// time and reported via `Garbage` rather than being treated as an error.
///
/// Returns `(frame, bytes_consumed)` where `frame` is `None` only when more
/// bytes are needed before a decision can be made (an in-progress data
/// frame whose declared length hasn't arrived yet).
pub fn try_parse(buffer: &[u8]) -> (Option<ParsedFrame>, usize) {
    if buffer.is_empty() {
        return (None, 0);
    }

    match buffer[0] {
        SOF => try_parse_data(buffer),
        b if ControlByte::from_byte(b).is_some() => (
            Some(ParsedFrame::Frame(Frame::Control(ControlByte::from_byte(b).unwrap()))),
            1,
        ),
        _ => {
            let skip = buffer
                .iter()
                .position(|&b| b == SOF || ControlByte::from_byte(b).is_some())
                .unwrap_or(buffer.len());
            let skip = skip.max(1);
            (Some(ParsedFrame::Garbage { skipped: skip }), skip)
        }
    }
}

/// What one call to [`try_parse`] found.
#[derive(Debug, PartialEq, Eq)]
pub enum ParsedFrame {
    Frame(Frame),
    /// `skipped` bytes that didn't start a recognized frame were discarded.
    Garbage { skipped: usize },
}

fn try_parse_data(buffer: &[u8]) -> (Option<ParsedFrame>, usize) {
    // Need SOF + length before we know the total frame size.
    if buffer.len() < 2 {
        return (None, 0);
    }
    let declared_len = buffer[1] as usize;
    // SOF + length byte + `declared_len` (type, function id, payload) + checksum.
    let total_len = declared_len + 3;
    if buffer.len() < total_len {
        return (None, 0);
    }
    if declared_len < 2 {
        // type + function id is the minimum; anything shorter is not a
        // well-formed frame. Treat the SOF itself as garbage so the caller
        // can resynchronize one byte at a time.
        return (Some(ParsedFrame::Garbage { skipped: 1 }), 1);
    }

    let command_type = match CommandType::try_from(buffer[2]) {
        Ok(t) => t,
        Err(_) => return (Some(ParsedFrame::Garbage { skipped: 1 }), 1),
    };
    let function_id = FunctionType::from(buffer[3]);
    let payload_len = declared_len - 2;
    let payload = Bytes::copy_from_slice(&buffer[4..4 + payload_len]);
    let checksum = buffer[total_len - 1];

    let frame = DataFrame {
        command_type,
        function_id,
        payload,
        checksum,
    };

    (Some(ParsedFrame::Frame(Frame::Data(frame))), total_len)
}

/// Serializes a frame to bytes, computing the checksum over `length ..=
/// last payload byte` as required by §3.
pub fn encode(frame: &Frame, out: &mut BytesMut) {
    match frame {
        Frame::Control(c) => out.extend_from_slice(&[c.as_byte()]),
        Frame::Data(frame) => {
            out.extend_from_slice(&[SOF, frame.declared_length(), frame.command_type.into(), frame.function_id.value()]);
            out.extend_from_slice(&frame.payload);
            out.extend_from_slice(&[frame.compute_checksum()]);
        }
    }
}

pub fn encode_to_vec(frame: &Frame) -> Vec<u8> {
    let mut out = BytesMut::new();
    encode(frame, &mut out);
    out.to_vec()
}

#[cfg(test)]
mod test {
    use super::*;

    fn frame_fixture() -> DataFrame {
        DataFrame::new(
            CommandType::Request,
            FunctionType::SEND_DATA,
            Bytes::from_static(&[0x02, 0x03, 0x25, 0x01, 0xff, 0x25, 0x01]),
        )
    }

    #[test]
    fn test_roundtrip() {
        let frame = Frame::Data(frame_fixture());
        let encoded = encode_to_vec(&frame);
        let (parsed, consumed) = try_parse(&encoded);
        assert_eq!(consumed, encoded.len());
        assert_eq!(parsed, Some(ParsedFrame::Frame(frame)));
    }

    #[test]
    fn test_checksum_matches_expected() {
        let frame = frame_fixture();
        // length(0x09) ^ type(Request=0x00) ^ function(SEND_DATA=0x13) ^ payload, seeded with 0xff.
        let expected = 0xffu8 ^ 0x09 ^ 0x00 ^ 0x13 ^ 0x02 ^ 0x03 ^ 0x25 ^ 0x01 ^ 0xff ^ 0x25 ^ 0x01;
        assert_eq!(frame.compute_checksum(), expected);
    }

    #[test]
    fn test_skip_garbage_before_ack() {
        let data = hex::decode("deadbeef06").unwrap();
        let (frame, consumed) = try_parse(&data);
        assert_eq!(frame, Some(ParsedFrame::Garbage { skipped: 4 }));
        assert_eq!(consumed, 4);

        let (frame, consumed) = try_parse(&data[4..]);
        assert_eq!(frame, Some(ParsedFrame::Frame(Frame::Control(ControlByte::Ack))));
        assert_eq!(consumed, 1);
    }

    #[test]
    fn test_bad_checksum_is_still_consumed() {
        // Same as the roundtrip fixture but with the last byte corrupted.
        let mut encoded = encode_to_vec(&Frame::Data(frame_fixture()));
        *encoded.last_mut().unwrap() ^= 0xff;
        let (parsed, consumed) = try_parse(&encoded);
        assert_eq!(consumed, encoded.len());
        match parsed {
            Some(ParsedFrame::Frame(Frame::Data(frame))) => assert!(!frame.checksum_valid()),
            other => panic!("expected a data frame, got {other:?}"),
        }
    }

    #[test]
    fn test_incomplete_frame_requests_more_bytes() {
        let encoded = encode_to_vec(&Frame::Data(frame_fixture()));
        let (parsed, consumed) = try_parse(&encoded[..3]);
        assert_eq!(parsed, None);
        assert_eq!(consumed, 0);
    }

    #[test]
    fn test_declared_length_beyond_buffer_is_rejected_without_overrun() {
        // SOF, length=0xfe (250 bytes claimed), nothing else.
        let data = [SOF, 0xfeu8, 0x00, 0x00];
        let (parsed, consumed) = try_parse(&data);
        assert_eq!(parsed, None);
        assert_eq!(consumed, 0);
    }

    #[test]
    fn test_bad_checksum_zero_payload() {
        // SOF, length=0x02 (type + function id, no payload), type=Response,
        // function=0x02, checksum deliberately wrong.
        let data = [SOF, 0x02, 0x01, 0x02, 0x00];
        let (parsed, consumed) = try_parse(&data);
        assert_eq!(consumed, data.len());
        match parsed {
            Some(ParsedFrame::Frame(Frame::Data(frame))) => {
                assert!(!frame.checksum_valid());
                assert_eq!(frame.payload.len(), 0);
            }
            other => panic!("expected a data frame, got {other:?}"),
        }
    }
}
