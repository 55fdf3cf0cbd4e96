//! Stream transport to an agent.
//!
//! The agent protocol runs over one long-lived TCP connection. This crate
//! owns address resolution, connect timeouts and the per-direction socket
//! options. Everything else builds on top of the [`AgentStream`] type
//! provided here.

pub mod error;
pub mod stream;
pub mod tcp;

pub use error::{Result, TransportError};
pub use stream::AgentStream;
pub use tcp::{connect, connect_timeout, DEFAULT_AGENT_PORT};
