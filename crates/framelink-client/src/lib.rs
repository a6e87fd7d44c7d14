//! Async protocol client for framelink device links.
//!
//! [`ProtocolClient`] owns a [`Transport`](framelink_transport::Transport) and
//! a frame codec and turns them into a request/response API with unsolicited
//! telemetry fan-out and continuous link health monitoring:
//! - Commands are correlated with responses by message id, with per-call timeouts
//! - Telemetry and event frames go to registered observers through a bounded,
//!   drop-oldest queue
//! - Heartbeats keep the link alive; receive silence faults the session
//! - Every failure is reported as a structured [`ErrorInfo`]

pub mod client;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod health;
mod pending;
mod queue;
pub mod sequence;

pub use client::ProtocolClient;
pub use config::ClientConfig;
pub use diagnostics::{
    ErrorCategory, ErrorCode, ErrorInfo, ErrorSink, MemoryErrorSink, OperationContext, Severity,
    TracingErrorSink,
};
pub use error::{ClientError, Result};
pub use health::{ConnectionHealthSnapshot, ConnectionState, LinkMetricsSnapshot};
pub use sequence::SequenceTracker;
pub use tokio_util::sync::CancellationToken;
