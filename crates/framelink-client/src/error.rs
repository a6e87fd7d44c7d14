use std::time::Duration;

use framelink_frame::FrameError;
use framelink_transport::TransportError;

use crate::diagnostics::{ErrorCategory, ErrorCode};

/// Errors that can occur in client operations.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    /// The client has no active session.
    #[error("client not running")]
    NotRunning,

    /// The session ended while the operation was in flight.
    #[error("disconnected: {0}")]
    Disconnected(String),

    /// No response arrived before the deadline.
    #[error("command timeout (msg_id={msg_id}, after {timeout:?})")]
    Timeout { msg_id: u16, timeout: Duration },

    /// The caller cancelled the operation.
    #[error("operation cancelled")]
    Cancelled,

    /// A freshly allocated message id is still in flight.
    #[error("message id {0} collides with a pending request")]
    MessageIdCollision(u16),

    /// The device answered with a non-OK status.
    #[error(
        "device rejected command {command_id:#06x} (status={status:#04x}, device error={device_error_code:#06x})"
    )]
    DeviceRejected {
        command_id: u16,
        status: u8,
        device_error_code: u16,
    },

    /// Nothing was received for longer than the fault threshold.
    #[error("no data received for {}ms", .0.as_millis())]
    RxSilence(Duration),

    /// Invalid client configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// JSON serialization/deserialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ClientError {
    /// Numeric error code used in structured reports.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Transport(err) if err.is_read_failure() => ErrorCode::TransportReadFailed,
            Self::Transport(err) if err.is_write_failure() => ErrorCode::TransportWriteFailed,
            Self::Transport(_) | Self::NotRunning | Self::Disconnected(_) => {
                ErrorCode::TransportDisconnected
            }
            Self::Frame(FrameError::CrcMismatch { .. }) => ErrorCode::ProtocolCrcFailed,
            Self::Frame(FrameError::PayloadTooShort { .. }) => ErrorCode::ProtocolPayloadInvalid,
            Self::Frame(_) => ErrorCode::ProtocolFrameInvalid,
            Self::Timeout { .. } | Self::Cancelled => ErrorCode::CommandTimeout,
            Self::RxSilence(_) => ErrorCode::AliveTimeout,
            Self::DeviceRejected { .. } => ErrorCode::DeviceRejected,
            Self::InvalidConfig(_) | Self::Json(_) => ErrorCode::ConfigurationInvalid,
            Self::MessageIdCollision(_) => ErrorCode::InternalError,
        }
    }

    /// Taxonomy bucket of this error.
    pub fn category(&self) -> ErrorCategory {
        self.code().category()
    }

    /// Device-supplied error code, if the device produced this error.
    pub fn device_error_code(&self) -> Option<u16> {
        match self {
            Self::DeviceRejected {
                device_error_code, ..
            } => Some(*device_error_code),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;
