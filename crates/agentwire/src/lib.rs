//! Client for the agent protocol of a pub/sub overlay.
//!
//! # Crate Structure
//!
//! - [`transport`] - TCP stream to the local agent
//! - [`frame`] - Frames, wire value types and the binary codec
//! - [`agent`] - Connection, transaction multiplexer and typed commands (behind `agent` feature)

/// Re-export transport types.
pub mod transport {
    pub use agentwire_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use agentwire_frame::*;
}

/// Re-export connection and command types (requires `agent` feature).
#[cfg(feature = "agent")]
pub mod agent {
    pub use agentwire_agent::*;
}
