//! SOF-delimited, CRC16-checked message framing for serial device links.
//!
//! Every message on the wire is framed as:
//! - A 2-byte start-of-frame marker (`0xA5 0x5A`) for stream synchronization
//! - An 8-byte little-endian header (version, type, message id, sequence, length)
//! - Up to 4096 payload bytes
//! - A CRC-16/MODBUS over header and payload
//!
//! [`FrameCodec`] turns arbitrarily fragmented byte chunks back into frames and
//! resynchronizes on its own after corruption.

pub mod codec;
pub mod crc;
pub mod error;
pub mod frame;
pub mod msg_type;
pub mod response;

pub use codec::{encode_frame, wire_checksum, CodecConfig, DecodeState, FrameCodec};
pub use crc::{checksum, Crc16};
pub use error::{FrameError, Result};
pub use frame::{
    Frame, FrameHeader, CRC_LEN, HEADER_LEN, MAX_PAYLOAD_LEN, PROTOCOL_VERSION, SOF1, SOF2,
    SOF_LEN,
};
pub use msg_type::MsgType;
pub use response::{CommandPayload, ResponsePayload, ResponseStatus, RESPONSE_HEADER_LEN};
