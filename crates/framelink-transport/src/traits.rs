use std::future::Future;
use std::sync::Arc;

use crate::error::Result;

/// A bidirectional byte-stream link to a remote device.
///
/// All methods take `&self` so the read path and the write path can be driven
/// concurrently from different tasks. Every returned future is cancel-safe in
/// the sense the client relies on: dropping it abandons the operation without
/// corrupting the transport.
///
/// `read` returning `Ok(0)` means "nothing available right now", not end of
/// stream. Implementations report a closed stream as
/// [`TransportError::Closed`](crate::TransportError::Closed).
pub trait Transport: Send + Sync + 'static {
    /// Endpoint name used in logs and error reports.
    fn name(&self) -> &str;

    /// Open the link. Opening an already open transport is a no-op.
    fn open(&self) -> impl Future<Output = Result<()>> + Send;

    /// Close the link. Closing a closed transport is a no-op.
    fn close(&self) -> impl Future<Output = Result<()>> + Send;

    /// Read available bytes into `buf`, returning how many were read.
    fn read(&self, buf: &mut [u8]) -> impl Future<Output = Result<usize>> + Send;

    /// Write the whole buffer.
    fn write(&self, buf: &[u8]) -> impl Future<Output = Result<()>> + Send;
}

impl<T: Transport> Transport for Arc<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn open(&self) -> impl Future<Output = Result<()>> + Send {
        (**self).open()
    }

    fn close(&self) -> impl Future<Output = Result<()>> + Send {
        (**self).close()
    }

    fn read(&self, buf: &mut [u8]) -> impl Future<Output = Result<usize>> + Send {
        (**self).read(buf)
    }

    fn write(&self, buf: &[u8]) -> impl Future<Output = Result<()>> + Send {
        (**self).write(buf)
    }
}
