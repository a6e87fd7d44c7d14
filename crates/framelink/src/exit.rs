use std::fmt;
use std::io;

use framelink_client::ClientError;
use framelink_frame::FrameError;
use framelink_transport::TransportError;

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const HEALTH_CHECK_FAILED: i32 = 30;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    CliError::new(io_error_code(&err, INTERNAL), format!("{context}: {err}"))
}

fn io_error_code(err: &io::Error, fallback: i32) -> i32 {
    match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::ConnectionRefused | io::ErrorKind::NotFound => TRANSPORT_ERROR,
        _ => fallback,
    }
}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    let code = match &err {
        TransportError::Open { source, .. } => io_error_code(source, TRANSPORT_ERROR),
        TransportError::Io(source) => io_error_code(source, INTERNAL),
        _ => TRANSPORT_ERROR,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn frame_error(context: &str, err: FrameError) -> CliError {
    CliError::new(DATA_INVALID, format!("{context}: {err}"))
}

pub fn client_error(context: &str, err: ClientError) -> CliError {
    match err {
        ClientError::Transport(err) => transport_error(context, err),
        ClientError::Frame(err) => frame_error(context, err),
        ClientError::Timeout { .. } => CliError::new(TIMEOUT, format!("{context}: {err}")),
        ClientError::RxSilence(_) => {
            CliError::new(HEALTH_CHECK_FAILED, format!("{context}: {err}"))
        }
        ClientError::NotRunning | ClientError::Disconnected(_) => {
            CliError::new(TRANSPORT_ERROR, format!("{context}: {err}"))
        }
        ClientError::InvalidConfig(_) | ClientError::Json(_) => {
            CliError::new(USAGE, format!("{context}: {err}"))
        }
        ClientError::DeviceRejected { .. } | ClientError::Cancelled => {
            CliError::new(FAILURE, format!("{context}: {err}"))
        }
        ClientError::MessageIdCollision(_) => CliError::new(INTERNAL, format!("{context}: {err}")),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn refused_connection_is_transport_error() {
        let err = client_error(
            "connect failed",
            ClientError::Transport(TransportError::Open {
                endpoint: "tcp://127.0.0.1:1".into(),
                source: io::Error::new(io::ErrorKind::ConnectionRefused, "refused"),
            }),
        );
        assert_eq!(err.code, TRANSPORT_ERROR);
        assert!(err.message.starts_with("connect failed: "));
        assert!(err.message.contains("tcp://127.0.0.1:1"));
    }

    #[test]
    fn timeouts_and_config_errors_map_to_their_codes() {
        let timeout = client_error(
            "send failed",
            ClientError::Timeout {
                msg_id: 1,
                timeout: Duration::from_millis(100),
            },
        );
        assert_eq!(timeout.code, TIMEOUT);

        let config = client_error("config", ClientError::InvalidConfig("bad".into()));
        assert_eq!(config.code, USAGE);

        let silence = client_error(
            "monitor",
            ClientError::RxSilence(Duration::from_secs(5)),
        );
        assert_eq!(silence.code, HEALTH_CHECK_FAILED);
    }

    #[test]
    fn frame_errors_are_data_invalid() {
        let err = frame_error("decode", FrameError::UnknownMsgType(9));
        assert_eq!(err.code, DATA_INVALID);
    }
}
