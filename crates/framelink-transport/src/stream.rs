use std::future::Future;
use std::io::ErrorKind;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::{Result, TransportError};
use crate::traits::Transport;

/// Produces a fresh byte stream each time the transport is opened.
pub trait Connector: Send + Sync + 'static {
    /// The connected stream type.
    type Stream: AsyncRead + AsyncWrite + Send + Unpin + 'static;

    /// Endpoint description for diagnostics (address, path, ...).
    fn endpoint(&self) -> String;

    /// Establish a new connection.
    fn connect(&self) -> impl Future<Output = std::io::Result<Self::Stream>> + Send;
}

/// A [`Transport`] over any tokio byte stream.
///
/// The stream is split on open so a reader task and a writer task never
/// contend for the same lock. Because the underlying streams are sockets,
/// a zero-length read is end of stream and is reported as
/// [`TransportError::Closed`].
pub struct StreamTransport<C: Connector> {
    connector: C,
    name: String,
    reader: Mutex<Option<ReadHalf<C::Stream>>>,
    writer: Mutex<Option<WriteHalf<C::Stream>>>,
}

impl<C: Connector> StreamTransport<C> {
    /// Create a closed transport for the given connector.
    pub fn new(connector: C) -> Self {
        let name = connector.endpoint();
        Self {
            connector,
            name,
            reader: Mutex::new(None),
            writer: Mutex::new(None),
        }
    }

    /// Borrow the connector.
    pub fn connector(&self) -> &C {
        &self.connector
    }

    fn not_open(&self) -> TransportError {
        TransportError::NotOpen {
            endpoint: self.name.clone(),
        }
    }
}

impl<C: Connector> Transport for StreamTransport<C> {
    fn name(&self) -> &str {
        &self.name
    }

    async fn open(&self) -> Result<()> {
        let mut writer = self.writer.lock().await;
        if writer.is_some() {
            return Ok(());
        }

        let stream = self
            .connector
            .connect()
            .await
            .map_err(|source| TransportError::Open {
                endpoint: self.name.clone(),
                source,
            })?;
        let (read_half, write_half) = tokio::io::split(stream);
        *self.reader.lock().await = Some(read_half);
        *writer = Some(write_half);

        debug!(endpoint = %self.name, "transport opened");
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        let mut writer = self.writer.lock().await;
        self.reader.lock().await.take();

        if let Some(mut write_half) = writer.take() {
            debug!(endpoint = %self.name, "closing transport");
            write_half.shutdown().await?;
        }
        Ok(())
    }

    async fn read(&self, buf: &mut [u8]) -> Result<usize> {
        let mut guard = self.reader.lock().await;
        let reader = guard.as_mut().ok_or_else(|| self.not_open())?;

        match reader.read(buf).await {
            Ok(0) if !buf.is_empty() => Err(TransportError::Closed {
                endpoint: self.name.clone(),
            }),
            Ok(n) => Ok(n),
            Err(err) if err.kind() == ErrorKind::Interrupted => Ok(0),
            Err(source) => Err(TransportError::Read {
                endpoint: self.name.clone(),
                source,
            }),
        }
    }

    async fn write(&self, buf: &[u8]) -> Result<()> {
        let mut guard = self.writer.lock().await;
        let writer = guard.as_mut().ok_or_else(|| self.not_open())?;

        let result = match writer.write_all(buf).await {
            Ok(()) => writer.flush().await,
            Err(err) => Err(err),
        };
        result.map_err(|source| TransportError::Write {
            endpoint: self.name.clone(),
            source,
        })
    }
}

impl<C: Connector> std::fmt::Debug for StreamTransport<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamTransport")
            .field("endpoint", &self.name)
            .finish()
    }
}

/// Connects to a TCP endpoint, e.g. a serial-to-network bridge.
#[derive(Debug, Clone)]
pub struct TcpConnector {
    addr: String,
}

impl TcpConnector {
    /// Connector for `host:port`.
    pub fn new(addr: impl Into<String>) -> Self {
        Self { addr: addr.into() }
    }
}

impl Connector for TcpConnector {
    type Stream = tokio::net::TcpStream;

    fn endpoint(&self) -> String {
        format!("tcp://{}", self.addr)
    }

    async fn connect(&self) -> std::io::Result<Self::Stream> {
        let stream = tokio::net::TcpStream::connect(&self.addr).await?;
        // Frames are small and latency-sensitive.
        stream.set_nodelay(true)?;
        Ok(stream)
    }
}

/// TCP-backed transport.
pub type TcpTransport = StreamTransport<TcpConnector>;

impl StreamTransport<TcpConnector> {
    /// Transport that connects to `host:port` when opened.
    pub fn tcp(addr: impl Into<String>) -> Self {
        Self::new(TcpConnector::new(addr))
    }
}

/// Connects to a Unix domain socket, e.g. a PTY relay in front of a serial port.
#[cfg(unix)]
#[derive(Debug, Clone)]
pub struct UnixConnector {
    path: std::path::PathBuf,
}

#[cfg(unix)]
impl UnixConnector {
    /// Connector for a filesystem socket path.
    pub fn new(path: impl Into<std::path::PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[cfg(unix)]
impl Connector for UnixConnector {
    type Stream = tokio::net::UnixStream;

    fn endpoint(&self) -> String {
        format!("unix://{}", self.path.display())
    }

    async fn connect(&self) -> std::io::Result<Self::Stream> {
        tokio::net::UnixStream::connect(&self.path).await
    }
}

/// Unix-domain-socket-backed transport.
#[cfg(unix)]
pub type UnixTransport = StreamTransport<UnixConnector>;

#[cfg(unix)]
impl StreamTransport<UnixConnector> {
    /// Transport that connects to the socket at `path` when opened.
    pub fn unix(path: impl Into<std::path::PathBuf>) -> Self {
        Self::new(UnixConnector::new(path))
    }
}
