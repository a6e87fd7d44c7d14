//! Message types carried in the header type byte.

use std::fmt;

use crate::error::FrameError;

/// Kind of message a frame carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MsgType {
    /// Zero-payload heartbeat.
    Alive = 0x01,
    /// Host-to-device command (request).
    Command = 0x02,
    /// Device-to-host reply to a command, correlated by message id.
    Response = 0x03,
    /// Unsolicited periodic measurement.
    Telemetry = 0x04,
    /// Unsolicited device event.
    Event = 0x05,
}

impl MsgType {
    /// Wire representation.
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Human-readable name of the type.
    pub fn name(self) -> &'static str {
        match self {
            Self::Alive => "ALIVE",
            Self::Command => "COMMAND",
            Self::Response => "RESPONSE",
            Self::Telemetry => "TELEMETRY",
            Self::Event => "EVENT",
        }
    }

    /// Returns true for frames the device sends without being asked.
    pub fn is_unsolicited(self) -> bool {
        matches!(self, Self::Telemetry | Self::Event)
    }
}

impl TryFrom<u8> for MsgType {
    type Error = FrameError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x01 => Ok(Self::Alive),
            0x02 => Ok(Self::Command),
            0x03 => Ok(Self::Response),
            0x04 => Ok(Self::Telemetry),
            0x05 => Ok(Self::Event),
            other => Err(FrameError::UnknownMsgType(other)),
        }
    }
}

impl fmt::Display for MsgType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
