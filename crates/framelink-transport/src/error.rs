/// Errors that can occur in transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Failed to open the link to the endpoint.
    #[error("failed to open {endpoint}: {source}")]
    Open {
        endpoint: String,
        source: std::io::Error,
    },

    /// Reading from the link failed.
    #[error("read failed on {endpoint}: {source}")]
    Read {
        endpoint: String,
        source: std::io::Error,
    },

    /// Writing to the link failed.
    #[error("write failed on {endpoint}: {source}")]
    Write {
        endpoint: String,
        source: std::io::Error,
    },

    /// The remote end closed the stream.
    #[error("link closed by remote end ({endpoint})")]
    Closed { endpoint: String },

    /// An operation was attempted before `open` (or after `close`).
    #[error("transport {endpoint} is not open")]
    NotOpen { endpoint: String },

    /// An I/O error occurred outside of a read or write (e.g. while closing).
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TransportError {
    /// True for errors raised by the read path.
    pub fn is_read_failure(&self) -> bool {
        matches!(self, Self::Read { .. } | Self::Closed { .. })
    }

    /// True for errors raised by the write path.
    pub fn is_write_failure(&self) -> bool {
        matches!(self, Self::Write { .. })
    }
}

pub type Result<T> = std::result::Result<T, TransportError>;
