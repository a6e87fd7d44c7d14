use std::fmt;

use bytes::{BufMut, Bytes};

use crate::error::{FrameError, Result};
use crate::msg_type::MsgType;

/// First start-of-frame marker byte.
pub const SOF1: u8 = 0xA5;

/// Second start-of-frame marker byte.
pub const SOF2: u8 = 0x5A;

/// Start-of-frame marker length.
pub const SOF_LEN: usize = 2;

/// Header: version (1) + type (1) + message id (2) + sequence (2) + length (2) = 8 bytes.
pub const HEADER_LEN: usize = 8;

/// Trailing checksum length.
pub const CRC_LEN: usize = 2;

/// Largest payload the wire format allows.
pub const MAX_PAYLOAD_LEN: usize = 4096;

/// Protocol version stamped into frames built by this crate.
pub const PROTOCOL_VERSION: u8 = 1;

/// Fixed-size frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameHeader {
    /// Protocol version.
    pub version: u8,
    /// Message type.
    pub msg_type: MsgType,
    /// Correlation id; 0 means unsolicited.
    pub msg_id: u16,
    /// Sender sequence number.
    pub seq: u16,
    /// Number of payload bytes that follow the header.
    pub payload_len: u16,
}

impl FrameHeader {
    /// Wire representation (little-endian fields).
    pub fn to_bytes(&self) -> [u8; HEADER_LEN] {
        let mut out = [0u8; HEADER_LEN];
        let mut dst = &mut out[..];
        dst.put_u8(self.version);
        dst.put_u8(self.msg_type.as_u8());
        dst.put_u16_le(self.msg_id);
        dst.put_u16_le(self.seq);
        dst.put_u16_le(self.payload_len);
        out
    }

    /// Parse a header from its wire representation.
    pub fn from_bytes(raw: &[u8; HEADER_LEN]) -> Result<Self> {
        Ok(Self {
            version: raw[0],
            msg_type: MsgType::try_from(raw[1])?,
            msg_id: u16::from_le_bytes([raw[2], raw[3]]),
            seq: u16::from_le_bytes([raw[4], raw[5]]),
            payload_len: declared_payload_len(raw),
        })
    }
}

/// Payload length field of a raw header, without validating anything else.
pub(crate) fn declared_payload_len(raw: &[u8; HEADER_LEN]) -> u16 {
    u16::from_le_bytes([raw[6], raw[7]])
}

/// One complete protocol message.
///
/// The header's `payload_len` always equals the payload length: frames are
/// only built through constructors that derive it from the payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    header: FrameHeader,
    payload: Bytes,
}

impl Frame {
    /// Create a frame of the given type with message id and sequence 0.
    pub fn new(msg_type: MsgType, payload: impl Into<Bytes>) -> Result<Self> {
        let payload = payload.into();
        let payload_len = checked_len(payload.len())?;
        Ok(Self {
            header: FrameHeader {
                version: PROTOCOL_VERSION,
                msg_type,
                msg_id: 0,
                seq: 0,
                payload_len,
            },
            payload,
        })
    }

    /// Create a command frame. The client stamps the message id when sending.
    pub fn command(payload: impl Into<Bytes>) -> Result<Self> {
        Self::new(MsgType::Command, payload)
    }

    /// Zero-payload heartbeat frame.
    pub fn alive(version: u8) -> Self {
        Self {
            header: FrameHeader {
                version,
                msg_type: MsgType::Alive,
                msg_id: 0,
                seq: 0,
                payload_len: 0,
            },
            payload: Bytes::new(),
        }
    }

    /// Assemble a frame from a header and payload, checking the length field.
    pub fn from_parts(header: FrameHeader, payload: impl Into<Bytes>) -> Result<Self> {
        let payload = payload.into();
        checked_len(payload.len())?;
        if usize::from(header.payload_len) != payload.len() {
            return Err(FrameError::LengthMismatch {
                declared: usize::from(header.payload_len),
                actual: payload.len(),
            });
        }
        Ok(Self { header, payload })
    }

    /// Decoder-side constructor; the codec has already validated the length.
    pub(crate) fn from_wire(header: FrameHeader, payload: Bytes) -> Self {
        debug_assert_eq!(usize::from(header.payload_len), payload.len());
        Self { header, payload }
    }

    /// Replace the message id.
    #[must_use]
    pub fn with_msg_id(mut self, msg_id: u16) -> Self {
        self.header.msg_id = msg_id;
        self
    }

    /// Replace the sequence number.
    #[must_use]
    pub fn with_seq(mut self, seq: u16) -> Self {
        self.header.seq = seq;
        self
    }

    /// Replace the protocol version.
    #[must_use]
    pub fn with_version(mut self, version: u8) -> Self {
        self.header.version = version;
        self
    }

    /// Replace the message type.
    #[must_use]
    pub fn with_msg_type(mut self, msg_type: MsgType) -> Self {
        self.header.msg_type = msg_type;
        self
    }

    pub fn header(&self) -> &FrameHeader {
        &self.header
    }

    pub fn msg_type(&self) -> MsgType {
        self.header.msg_type
    }

    pub fn msg_id(&self) -> u16 {
        self.header.msg_id
    }

    pub fn seq(&self) -> u16 {
        self.header.seq
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Consume the frame and return its payload.
    pub fn into_payload(self) -> Bytes {
        self.payload
    }

    /// The total wire size of this frame (markers + header + payload + checksum).
    pub fn wire_size(&self) -> usize {
        SOF_LEN + HEADER_LEN + self.payload.len() + CRC_LEN
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "v={} type={} msg_id={} seq={} len={}",
            self.header.version,
            self.header.msg_type,
            self.header.msg_id,
            self.header.seq,
            self.header.payload_len
        )
    }
}

fn checked_len(len: usize) -> Result<u16> {
    if len > MAX_PAYLOAD_LEN {
        return Err(FrameError::PayloadTooLarge {
            size: len,
            max: MAX_PAYLOAD_LEN,
        });
    }
    // MAX_PAYLOAD_LEN fits in u16.
    Ok(len as u16)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_wire_layout_is_little_endian() {
        let header = FrameHeader {
            version: 1,
            msg_type: MsgType::Telemetry,
            msg_id: 0x1234,
            seq: 0xBEEF,
            payload_len: 0x0102,
        };
        assert_eq!(
            header.to_bytes(),
            [0x01, 0x04, 0x34, 0x12, 0xEF, 0xBE, 0x02, 0x01]
        );
        assert_eq!(FrameHeader::from_bytes(&header.to_bytes()).unwrap(), header);
    }

    #[test]
    fn header_with_unknown_type_is_rejected() {
        let raw = [0x01, 0x09, 0, 0, 0, 0, 0, 0];
        assert_eq!(
            FrameHeader::from_bytes(&raw),
            Err(FrameError::UnknownMsgType(0x09))
        );
    }

    #[test]
    fn new_derives_payload_len() {
        let frame = Frame::new(MsgType::Event, b"abc".to_vec()).unwrap();
        assert_eq!(frame.header().payload_len, 3);
        assert_eq!(frame.header().version, PROTOCOL_VERSION);
        assert_eq!(frame.msg_id(), 0);
        assert_eq!(frame.wire_size(), SOF_LEN + HEADER_LEN + 3 + CRC_LEN);
    }

    #[test]
    fn oversized_payload_is_rejected() {
        let err = Frame::command(vec![0u8; MAX_PAYLOAD_LEN + 1]).unwrap_err();
        assert_eq!(
            err,
            FrameError::PayloadTooLarge {
                size: MAX_PAYLOAD_LEN + 1,
                max: MAX_PAYLOAD_LEN
            }
        );
        assert!(Frame::command(vec![0u8; MAX_PAYLOAD_LEN]).is_ok());
    }

    #[test]
    fn from_parts_checks_declared_length() {
        let header = FrameHeader {
            version: 1,
            msg_type: MsgType::Response,
            msg_id: 7,
            seq: 0,
            payload_len: 4,
        };
        assert!(matches!(
            Frame::from_parts(header, Bytes::from_static(b"abc")),
            Err(FrameError::LengthMismatch {
                declared: 4,
                actual: 3
            })
        ));
        let frame = Frame::from_parts(header, Bytes::from_static(b"abcd")).unwrap();
        assert_eq!(frame.msg_id(), 7);
    }

    #[test]
    fn builders_stamp_header_fields() {
        let frame = Frame::alive(2)
            .with_msg_id(9)
            .with_seq(10)
            .with_msg_type(MsgType::Command)
            .with_version(3);
        assert_eq!(frame.header().version, 3);
        assert_eq!(frame.msg_type(), MsgType::Command);
        assert_eq!((frame.msg_id(), frame.seq()), (9, 10));
        assert!(frame.payload().is_empty());
        assert_eq!(frame.to_string(), "v=3 type=COMMAND msg_id=9 seq=10 len=0");
    }
}
