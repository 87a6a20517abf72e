// SPDX-License-Identifier: GPL-3.0-only
//! DDC/CI frame codec
//!
//! Outbound frames have the layout
//!
//! ```text
//! [0x51] [0x80 | len] [opcode] [payload ...] [checksum]
//! ```
//!
//! where the checksum is the XOR of the display's write address (0x6E) and
//! every preceding byte. Replies start with the display's address and are
//! checksummed against the host's virtual address (0x50):
//!
//! ```text
//! [0x6E] [0x80 | len] [0x02] [result] [code] [type] [max hi] [max lo] [cur hi] [cur lo] [checksum]
//! ```

use serde::Serialize;
use thiserror::Error;

use crate::controls::ControlId;

use super::{
    DISPLAY_ADDRESS, HOST_ADDRESS, HOST_VIRTUAL_ADDRESS, LENGTH_FLAG, OPCODE_GET_VCP,
    OPCODE_SET_VCP, OPCODE_VCP_REPLY, VCP_REPLY_LEN, VCP_REPLY_PAYLOAD_LEN,
};

/// Set one control to a new value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteCommand {
    pub control_id: ControlId,
    pub new_value: u16,
}

impl WriteCommand {
    pub fn new(control_id: ControlId, new_value: impl Into<u16>) -> Self {
        Self { control_id, new_value: new_value.into() }
    }
}

/// Query one control
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadRequest {
    pub control_id: ControlId,
    /// Bytes to fetch for the reply, source address and checksum included
    pub expected_reply_capacity: usize,
}

impl ReadRequest {
    pub fn new(control_id: ControlId) -> Self {
        Self { control_id, expected_reply_capacity: VCP_REPLY_LEN }
    }
}

/// Type byte of a VCP reply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FeatureKind {
    SetParameter,
    Momentary,
    Other(u8),
}

impl From<u8> for FeatureKind {
    fn from(byte: u8) -> Self {
        match byte {
            0x00 => FeatureKind::SetParameter,
            0x01 => FeatureKind::Momentary,
            other => FeatureKind::Other(other),
        }
    }
}

impl From<FeatureKind> for u8 {
    fn from(kind: FeatureKind) -> u8 {
        match kind {
            FeatureKind::SetParameter => 0x00,
            FeatureKind::Momentary => 0x01,
            FeatureKind::Other(byte) => byte,
        }
    }
}

/// A control's value as reported by the display
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct VcpValue {
    pub kind: FeatureKind,
    pub max_value: u16,
    pub current_value: u16,
}

impl VcpValue {
    pub fn new(max_value: u16, current_value: u16) -> Self {
        Self { kind: FeatureKind::SetParameter, max_value, current_value }
    }
}

/// Why a reply was not accepted
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
pub enum FrameError {
    #[error("frame truncated: need {needed} bytes, got {actual}")]
    Truncated { needed: usize, actual: usize },

    #[error("unexpected source address 0x{0:02X}")]
    UnexpectedSource(u8),

    #[error("length byte 0x{0:02X} is missing the protocol flag")]
    MissingLengthFlag(u8),

    #[error("payload length {declared} does not match expected {expected}")]
    LengthMismatch { declared: usize, expected: usize },

    #[error("checksum mismatch: computed 0x{expected:02X}, frame has 0x{actual:02X}")]
    ChecksumMismatch { expected: u8, actual: u8 },

    /// The display replied with the null message; it is busy or cannot answer yet
    #[error("display replied with the null message")]
    NullMessage,

    #[error("unexpected opcode 0x{0:02X}")]
    UnexpectedOpcode(u8),

    /// The display declined the control code
    #[error("control not supported by the display")]
    Unsupported,

    #[error("display returned result code 0x{0:02X}")]
    ResultCode(u8),

    #[error("reply is for control 0x{actual:02X}, requested 0x{expected:02X}")]
    UnexpectedControlEcho { expected: u8, actual: u8 },

    /// No usable reply arrived (timeouts, NACKs) before retries ran out
    #[error("no reply: {0}")]
    NoReply(String),
}

/// Outcome of one read
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ReadResponse {
    Valid(VcpValue),
    /// Nothing about the control's value may be inferred from an invalid reply
    Invalid(FrameError),
}

impl ReadResponse {
    pub fn is_valid(&self) -> bool {
        matches!(self, ReadResponse::Valid(_))
    }

    /// The display explicitly declined the control
    pub fn is_unsupported(&self) -> bool {
        matches!(self, ReadResponse::Invalid(FrameError::Unsupported))
    }

    pub fn value(&self) -> Option<VcpValue> {
        match self {
            ReadResponse::Valid(value) => Some(*value),
            ReadResponse::Invalid(_) => None,
        }
    }

    pub fn max_value(&self) -> Option<u16> {
        self.value().map(|v| v.max_value)
    }

    pub fn current_value(&self) -> Option<u16> {
        self.value().map(|v| v.current_value)
    }

    pub fn into_result(self) -> Result<VcpValue, FrameError> {
        match self {
            ReadResponse::Valid(value) => Ok(value),
            ReadResponse::Invalid(err) => Err(err),
        }
    }
}

/// XOR checksum seeded with an address byte
pub fn checksum(seed: u8, bytes: &[u8]) -> u8 {
    bytes.iter().fold(seed, |sum, b| sum ^ b)
}

fn encode_command(data: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(data.len() + 3);
    frame.push(HOST_ADDRESS);
    frame.push(LENGTH_FLAG | data.len() as u8);
    frame.extend_from_slice(data);
    frame.push(checksum(DISPLAY_ADDRESS, &frame));
    frame
}

/// Build a "set VCP feature" frame
pub fn encode_write(cmd: &WriteCommand) -> Vec<u8> {
    let [hi, lo] = cmd.new_value.to_be_bytes();
    encode_command(&[OPCODE_SET_VCP, cmd.control_id.code(), hi, lo])
}

/// Build a "get VCP feature" frame
pub fn encode_read(control_id: ControlId) -> Vec<u8> {
    encode_command(&[OPCODE_GET_VCP, control_id.code()])
}

/// Validate a raw reply against the control that was requested
///
/// Replies read from a fixed-size buffer may carry trailing bytes after the
/// checksum; they are ignored.
pub fn decode_response(raw: &[u8], expected_control_id: ControlId) -> ReadResponse {
    match parse_reply(raw, expected_control_id.code()) {
        Ok(value) => ReadResponse::Valid(value),
        Err(err) => ReadResponse::Invalid(err),
    }
}

/// Split a frame into its payload, checking flag, bounds and checksum
fn unframe(raw: &[u8], seed: u8) -> Result<&[u8], FrameError> {
    if raw.len() < 3 {
        return Err(FrameError::Truncated { needed: 3, actual: raw.len() });
    }
    let len_byte = raw[1];
    if len_byte & LENGTH_FLAG == 0 {
        return Err(FrameError::MissingLengthFlag(len_byte));
    }
    let end = 2 + (len_byte & !LENGTH_FLAG) as usize;
    if raw.len() < end + 1 {
        return Err(FrameError::Truncated { needed: end + 1, actual: raw.len() });
    }
    let expected = checksum(seed, &raw[..end]);
    if expected != raw[end] {
        return Err(FrameError::ChecksumMismatch { expected, actual: raw[end] });
    }
    Ok(&raw[2..end])
}

fn parse_reply(raw: &[u8], expected_code: u8) -> Result<VcpValue, FrameError> {
    if let Some(&source) = raw.first() {
        if source != DISPLAY_ADDRESS {
            return Err(FrameError::UnexpectedSource(source));
        }
    }
    let payload = unframe(raw, HOST_VIRTUAL_ADDRESS)?;

    if payload.is_empty() {
        return Err(FrameError::NullMessage);
    }
    if payload.len() != VCP_REPLY_PAYLOAD_LEN {
        return Err(FrameError::LengthMismatch {
            declared: payload.len(),
            expected: VCP_REPLY_PAYLOAD_LEN,
        });
    }
    if payload[0] != OPCODE_VCP_REPLY {
        return Err(FrameError::UnexpectedOpcode(payload[0]));
    }
    match payload[1] {
        0x00 => {}
        0x01 => return Err(FrameError::Unsupported),
        code => return Err(FrameError::ResultCode(code)),
    }
    if payload[2] != expected_code {
        return Err(FrameError::UnexpectedControlEcho { expected: expected_code, actual: payload[2] });
    }

    Ok(VcpValue {
        kind: FeatureKind::from(payload[3]),
        max_value: u16::from_be_bytes([payload[4], payload[5]]),
        current_value: u16::from_be_bytes([payload[6], payload[7]]),
    })
}

/// A host command as seen from the display side
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostCommand {
    GetVcp { code: u8 },
    SetVcp { code: u8, value: u16 },
}

/// Parse a frame produced by [`encode_read`] or [`encode_write`]
pub fn decode_command(raw: &[u8]) -> Result<HostCommand, FrameError> {
    if let Some(&source) = raw.first() {
        if source != HOST_ADDRESS {
            return Err(FrameError::UnexpectedSource(source));
        }
    }
    let payload = unframe(raw, DISPLAY_ADDRESS)?;
    match payload {
        [OPCODE_GET_VCP, code] => Ok(HostCommand::GetVcp { code: *code }),
        [OPCODE_SET_VCP, code, hi, lo] => Ok(HostCommand::SetVcp {
            code: *code,
            value: u16::from_be_bytes([*hi, *lo]),
        }),
        [] => Err(FrameError::NullMessage),
        [opcode, ..] => Err(FrameError::UnexpectedOpcode(*opcode)),
    }
}

/// Build a VCP reply the way a display would
///
/// `None` produces the "unsupported code" reply.
pub fn encode_reply(code: u8, value: Option<VcpValue>) -> Vec<u8> {
    let (result, value) = match value {
        Some(value) => (0x00, value),
        None => (0x01, VcpValue::new(0, 0)),
    };
    let [max_hi, max_lo] = value.max_value.to_be_bytes();
    let [cur_hi, cur_lo] = value.current_value.to_be_bytes();

    let mut frame = vec![
        DISPLAY_ADDRESS,
        LENGTH_FLAG | VCP_REPLY_PAYLOAD_LEN as u8,
        OPCODE_VCP_REPLY,
        result,
        code,
        value.kind.into(),
        max_hi,
        max_lo,
        cur_hi,
        cur_lo,
    ];
    frame.push(checksum(HOST_VIRTUAL_ADDRESS, &frame));
    frame
}

/// The reply a busy display sends instead of data
pub fn encode_null_reply() -> Vec<u8> {
    let mut frame = vec![DISPLAY_ADDRESS, LENGTH_FLAG];
    frame.push(checksum(HOST_VIRTUAL_ADDRESS, &frame));
    frame
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn with_checksum(mut frame: Vec<u8>) -> Vec<u8> {
        frame.push(checksum(HOST_VIRTUAL_ADDRESS, &frame));
        frame
    }

    #[test]
    fn test_encode_read_brightness() {
        let frame = encode_read(ControlId::Brightness);
        let chk = 0x6E ^ 0x51 ^ 0x82 ^ 0x01 ^ 0x10;
        assert_eq!(frame, vec![0x51, 0x82, 0x01, 0x10, chk]);
    }

    #[test]
    fn test_encode_write_pads_high_byte() {
        let frame = encode_write(&WriteCommand::new(ControlId::Contrast, 75u8));
        assert_eq!(&frame[..6], &[0x51, 0x84, 0x03, 0x12, 0x00, 75]);
        assert_eq!(frame[6], checksum(0x6E, &frame[..6]));
    }

    #[test]
    fn test_decode_brightness_reply() {
        let reply = with_checksum(vec![0x6E, 0x88, 0x02, 0x00, 0x10, 0x00, 0x00, 0x64, 0x00, 0x32]);
        let response = decode_response(&reply, ControlId::Brightness);

        assert!(response.is_valid());
        assert_eq!(response.max_value(), Some(100));
        assert_eq!(response.current_value(), Some(50));
    }

    #[test]
    fn test_reply_missing_type_byte_is_truncated() {
        // Declares an 8-byte payload but carries only 7
        let reply = with_checksum(vec![0x6E, 0x88, 0x02, 0x00, 0x10, 0x00, 0x64, 0x00, 0x32]);
        assert_eq!(reply.len(), 10);

        assert_eq!(
            decode_response(&reply, ControlId::Brightness),
            ReadResponse::Invalid(FrameError::Truncated { needed: 11, actual: 10 })
        );
    }

    #[test]
    fn test_trailing_bytes_are_ignored() {
        let mut reply = encode_reply(0x10, Some(VcpValue::new(100, 10)));
        reply.extend_from_slice(&[0xAA, 0xBB]);
        assert_eq!(decode_response(&reply, ControlId::Brightness).current_value(), Some(10));
    }

    #[test]
    fn test_unsupported_is_invalid_not_zero() {
        let reply = encode_reply(0x62, None);
        let response = decode_response(&reply, ControlId::AudioSpeakerVolume);

        assert!(!response.is_valid());
        assert!(response.is_unsupported());
        assert_eq!(response.current_value(), None);
    }

    #[test]
    fn test_control_echo_mismatch() {
        let reply = encode_reply(0x12, Some(VcpValue::new(100, 20)));
        assert_eq!(
            decode_response(&reply, ControlId::Brightness),
            ReadResponse::Invalid(FrameError::UnexpectedControlEcho { expected: 0x10, actual: 0x12 })
        );
    }

    #[test]
    fn test_corrupted_checksum() {
        let mut reply = encode_reply(0x10, Some(VcpValue::new(100, 20)));
        reply[8] ^= 0x01;
        assert!(matches!(
            decode_response(&reply, ControlId::Brightness),
            ReadResponse::Invalid(FrameError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn test_null_message() {
        assert_eq!(
            decode_response(&encode_null_reply(), ControlId::Brightness),
            ReadResponse::Invalid(FrameError::NullMessage)
        );
    }

    #[test]
    fn test_wrong_payload_length() {
        // Seven payload bytes declared and present: no type byte
        let reply = with_checksum(vec![0x6E, 0x87, 0x02, 0x00, 0x10, 0x00, 0x64, 0x00, 0x32]);
        assert_eq!(
            decode_response(&reply, ControlId::Brightness),
            ReadResponse::Invalid(FrameError::LengthMismatch { declared: 7, expected: 8 })
        );
    }

    #[test]
    fn test_empty_and_tiny_buffers() {
        assert!(!decode_response(&[], ControlId::Brightness).is_valid());
        assert!(!decode_response(&[0x6E], ControlId::Brightness).is_valid());
        assert!(!decode_response(&[0x6E, 0x88], ControlId::Brightness).is_valid());
    }

    #[test]
    fn test_decode_command() {
        assert_eq!(
            decode_command(&encode_read(ControlId::InputSource)),
            Ok(HostCommand::GetVcp { code: 0x60 })
        );
        assert_eq!(
            decode_command(&encode_write(&WriteCommand::new(ControlId::Brightness, 300u16))),
            Ok(HostCommand::SetVcp { code: 0x10, value: 300 })
        );
    }

    fn any_control() -> impl Strategy<Value = ControlId> {
        (0..ControlId::ALL.len()).prop_map(|i| ControlId::ALL[i])
    }

    proptest! {
        #[test]
        fn test_frames_fold_to_zero(control in any_control(), value in any::<u16>()) {
            let read = encode_read(control);
            let write = encode_write(&WriteCommand::new(control, value));
            prop_assert_eq!(checksum(DISPLAY_ADDRESS, &read), 0);
            prop_assert_eq!(checksum(DISPLAY_ADDRESS, &write), 0);
        }

        #[test]
        fn test_device_echo_round_trip(control in any_control(), max in any::<u16>(), current in any::<u16>()) {
            let HostCommand::GetVcp { code } = decode_command(&encode_read(control)).unwrap() else {
                panic!("read frame decoded as a write");
            };
            let reply = encode_reply(code, Some(VcpValue::new(max, current)));
            let response = decode_response(&reply, control);
            prop_assert_eq!(response, ReadResponse::Valid(VcpValue::new(max, current)));
        }

        #[test]
        fn test_short_reply_never_valid(control in any_control(), cut in 0usize..11) {
            let reply = encode_reply(control.code(), Some(VcpValue::new(100, 1)));
            prop_assert!(!decode_response(&reply[..cut], control).is_valid());
        }

        #[test]
        fn test_arbitrary_bytes_do_not_panic(raw in proptest::collection::vec(any::<u8>(), 0..40)) {
            let _ = decode_response(&raw, ControlId::Brightness);
            let _ = decode_command(&raw);
        }
    }
}
