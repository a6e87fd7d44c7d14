//! Client-side framing protocol for serial device links.
//!
//! framelink turns an unreliable byte stream into checksummed frames,
//! correlates commands with their responses, fans out unsolicited telemetry,
//! and keeps watch over link health.
//!
//! # Crate Structure
//!
//! - [`transport`]: byte-stream transport contract (TCP, Unix sockets, in-memory)
//! - [`frame`]: SOF-delimited, CRC16-checked framing and the frame codec
//! - [`client`]: async protocol client (behind the default `client` feature)

/// Re-export transport types.
pub mod transport {
    pub use framelink_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use framelink_frame::*;
}

/// Re-export client types (requires `client` feature).
#[cfg(feature = "client")]
pub mod client {
    pub use framelink_client::*;
}
