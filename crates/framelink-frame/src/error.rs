/// Errors that can occur during frame encoding/decoding.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    /// The payload (declared or actual) exceeds the configured maximum size.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// The trailing checksum does not match header and payload.
    #[error("CRC mismatch (expected {expected:#06x}, actual {actual:#06x})")]
    CrcMismatch { expected: u16, actual: u16 },

    /// A checksum-valid frame carries a type byte this codec does not know.
    #[error("unknown message type {0:#04x}")]
    UnknownMsgType(u8),

    /// A header declares a payload length that differs from the payload.
    #[error("payload length mismatch (header says {declared}, payload has {actual})")]
    LengthMismatch { declared: usize, actual: usize },

    /// A payload is too short for the convention it is parsed with.
    #[error("payload too short ({len} bytes, need at least {min})")]
    PayloadTooShort { len: usize, min: usize },
}

impl FrameError {
    /// True for errors raised while scanning the byte stream.
    ///
    /// The codec has already discarded the offending frame when it reports one
    /// of these; the stream itself stays usable.
    pub fn is_stream_corruption(&self) -> bool {
        matches!(
            self,
            Self::PayloadTooLarge { .. } | Self::CrcMismatch { .. } | Self::UnknownMsgType(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, FrameError>;
