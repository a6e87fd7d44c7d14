//! Command and response payload conventions.
//!
//! The frame layer treats payloads as opaque bytes. Devices speaking this
//! protocol additionally agree on a small prefix:
//!
//! ```text
//! command:  [command id u16 LE][argument bytes...]
//! response: [command id u16 LE][status u8][device error code u16 LE][data...]
//! ```

use std::fmt;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};

/// Fixed prefix of a response payload.
pub const RESPONSE_HEADER_LEN: usize = 5;

/// Status byte of a response. Zero means success; anything else is a rejection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResponseStatus(pub u8);

impl ResponseStatus {
    pub const OK: Self = Self(0);

    pub fn is_ok(self) -> bool {
        self == Self::OK
    }
}

impl fmt::Display for ResponseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_ok() {
            f.write_str("OK")
        } else {
            write!(f, "{:#04x}", self.0)
        }
    }
}

/// Builder for the `[command id][args]` command payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandPayload {
    pub command_id: u16,
    pub args: Bytes,
}

impl CommandPayload {
    pub fn new(command_id: u16, args: impl Into<Bytes>) -> Self {
        Self {
            command_id,
            args: args.into(),
        }
    }

    /// Wire representation.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(2 + self.args.len());
        buf.put_u16_le(self.command_id);
        buf.put_slice(&self.args);
        buf.freeze()
    }

    /// Parse a command payload (used by device-side tooling and tests).
    pub fn parse(payload: &Bytes) -> Result<Self> {
        if payload.len() < 2 {
            return Err(FrameError::PayloadTooShort {
                len: payload.len(),
                min: 2,
            });
        }
        let mut buf = payload.clone();
        let command_id = buf.get_u16_le();
        Ok(Self {
            command_id,
            args: buf,
        })
    }
}

/// Parsed `[command id][status][device error code][data]` response payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponsePayload {
    pub command_id: u16,
    pub status: ResponseStatus,
    pub device_error_code: u16,
    pub data: Bytes,
}

impl ResponsePayload {
    /// Successful response carrying `data`.
    pub fn ok(command_id: u16, data: impl Into<Bytes>) -> Self {
        Self {
            command_id,
            status: ResponseStatus::OK,
            device_error_code: 0,
            data: data.into(),
        }
    }

    /// Rejection with a device specific error code.
    pub fn rejected(command_id: u16, status: u8, device_error_code: u16) -> Self {
        Self {
            command_id,
            status: ResponseStatus(status),
            device_error_code,
            data: Bytes::new(),
        }
    }

    /// Parse a response payload. The data section shares the input buffer.
    pub fn parse(payload: &Bytes) -> Result<Self> {
        if payload.len() < RESPONSE_HEADER_LEN {
            return Err(FrameError::PayloadTooShort {
                len: payload.len(),
                min: RESPONSE_HEADER_LEN,
            });
        }
        let mut buf = payload.clone();
        let command_id = buf.get_u16_le();
        let status = ResponseStatus(buf.get_u8());
        let device_error_code = buf.get_u16_le();
        Ok(Self {
            command_id,
            status,
            device_error_code,
            data: buf,
        })
    }

    /// Wire representation.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(RESPONSE_HEADER_LEN + self.data.len());
        buf.put_u16_le(self.command_id);
        buf.put_u8(self.status.0);
        buf.put_u16_le(self.device_error_code);
        buf.put_slice(&self.data);
        buf.freeze()
    }

    pub fn is_ok(&self) -> bool {
        self.status.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_response_fields() {
        let raw = Bytes::from_static(&[0x10, 0x00, 0x02, 0x34, 0x12, 0xAA, 0xBB]);
        let resp = ResponsePayload::parse(&raw).unwrap();
        assert_eq!(resp.command_id, 0x0010);
        assert_eq!(resp.status, ResponseStatus(2));
        assert!(!resp.is_ok());
        assert_eq!(resp.device_error_code, 0x1234);
        assert_eq!(resp.data.as_ref(), &[0xAA, 0xBB]);
        assert_eq!(resp.encode(), raw);
    }

    #[test]
    fn header_only_response_has_empty_data() {
        let resp = ResponsePayload::ok(0x0203, Bytes::new());
        let wire = resp.encode();
        assert_eq!(wire.len(), RESPONSE_HEADER_LEN);
        let parsed = ResponsePayload::parse(&wire).unwrap();
        assert!(parsed.is_ok());
        assert!(parsed.data.is_empty());
    }

    #[test]
    fn short_response_is_rejected() {
        let raw = Bytes::from_static(&[0x01, 0x00, 0x00, 0x00]);
        assert_eq!(
            ResponsePayload::parse(&raw),
            Err(FrameError::PayloadTooShort { len: 4, min: 5 })
        );
    }

    #[test]
    fn command_payload_layout() {
        let cmd = CommandPayload::new(0x0102, vec![9, 8, 7]);
        let wire = cmd.encode();
        assert_eq!(wire.as_ref(), &[0x02, 0x01, 9, 8, 7]);
        assert_eq!(CommandPayload::parse(&wire).unwrap(), cmd);
        assert!(CommandPayload::parse(&Bytes::from_static(&[1])).is_err());
    }

    #[test]
    fn status_display() {
        assert_eq!(ResponseStatus::OK.to_string(), "OK");
        assert_eq!(ResponseStatus(3).to_string(), "0x03");
    }
}
