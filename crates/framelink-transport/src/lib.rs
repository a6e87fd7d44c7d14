//! Byte-stream transport contract for framelink.
//!
//! The protocol client only needs four cancelable operations from its link:
//! open, close, read-into-buffer and write-buffer. This crate defines that
//! contract as the [`Transport`] trait and ships stream-backed implementations:
//! - TCP (serial-to-network bridges, device simulators)
//! - Unix domain sockets (PTY and serial relays on Linux/macOS)
//! - An in-memory pair for tests and demos
//!
//! This is the lowest layer of framelink. Everything else builds on top of it.

pub mod error;
pub mod memory;
pub mod stream;
pub mod traits;

pub use error::{Result, TransportError};
pub use memory::{MemoryAcceptor, MemoryConnector, MemoryTransport};
pub use stream::{Connector, StreamTransport, TcpConnector, TcpTransport};
pub use traits::Transport;

#[cfg(unix)]
pub use stream::{UnixConnector, UnixTransport};
