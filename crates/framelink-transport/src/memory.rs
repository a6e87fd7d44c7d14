//! In-process transport pair.
//!
//! Every `open` creates a fresh duplex pipe and hands the far end to the
//! [`MemoryAcceptor`], which plays the role of the device. Dropping the
//! device end closes the link; dropping the acceptor makes `open` fail.

use std::io::ErrorKind;

use tokio::io::DuplexStream;
use tokio::sync::mpsc;
use tracing::debug;

use crate::stream::{Connector, StreamTransport};

/// Default per-direction buffer of the in-memory pipe.
pub const DEFAULT_MEMORY_BUFFER: usize = 64 * 1024;

/// Connector side of an in-memory link.
#[derive(Debug)]
pub struct MemoryConnector {
    name: String,
    buffer: usize,
    tx: mpsc::UnboundedSender<DuplexStream>,
}

/// Device side of an in-memory link.
#[derive(Debug)]
pub struct MemoryAcceptor {
    rx: mpsc::UnboundedReceiver<DuplexStream>,
}

impl MemoryAcceptor {
    /// Wait for the transport to be opened and return the device end of the pipe.
    ///
    /// Returns `None` once the connector has been dropped.
    pub async fn accept(&mut self) -> Option<DuplexStream> {
        self.rx.recv().await
    }
}

impl Connector for MemoryConnector {
    type Stream = DuplexStream;

    fn endpoint(&self) -> String {
        format!("memory://{}", self.name)
    }

    async fn connect(&self) -> std::io::Result<Self::Stream> {
        let (local, remote) = tokio::io::duplex(self.buffer);
        self.tx.send(remote).map_err(|_| {
            std::io::Error::new(ErrorKind::ConnectionRefused, "memory acceptor dropped")
        })?;
        debug!(name = %self.name, "memory link connected");
        Ok(local)
    }
}

/// In-memory transport, see [`StreamTransport::memory`].
pub type MemoryTransport = StreamTransport<MemoryConnector>;

impl StreamTransport<MemoryConnector> {
    /// Create an in-memory transport and its device-side acceptor.
    pub fn memory(name: &str) -> (Self, MemoryAcceptor) {
        Self::memory_with_buffer(name, DEFAULT_MEMORY_BUFFER)
    }

    /// Like [`StreamTransport::memory`] with an explicit pipe buffer size.
    pub fn memory_with_buffer(name: &str, buffer: usize) -> (Self, MemoryAcceptor) {
        let (tx, rx) = mpsc::unbounded_channel();
        let connector = MemoryConnector {
            name: name.to_string(),
            buffer: buffer.max(1),
            tx,
        };
        (Self::new(connector), MemoryAcceptor { rx })
    }
}
