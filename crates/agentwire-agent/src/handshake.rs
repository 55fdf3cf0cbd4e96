//! Greeting exchange at the start of a connection.
//!
//! The agent speaks first: its first frame is `helo` with a `version`
//! header. Nothing is written to the agent until that frame arrives.

use agentwire_frame::command::HELLO;
use agentwire_frame::Frame;

use crate::error::{AgentError, Result};

pub const VERSION_HEADER: &str = "version";

const MAX_VERSION_LEN: usize = 64;

/// What the agent announced in its greeting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HelloInfo {
    pub version: Option<String>,
}

/// Validate the agent's first frame.
pub fn accept_hello(frame: &Frame) -> Result<HelloInfo> {
    if frame.command() != HELLO {
        return Err(AgentError::Protocol(format!(
            "expected helo as the first frame, got {}",
            frame.command()
        )));
    }

    let version = match frame.header(VERSION_HEADER) {
        None => None,
        Some(header) => {
            let Some(version) = header.as_str() else {
                return Err(AgentError::Protocol(
                    "helo version is not valid UTF-8".to_string(),
                ));
            };
            if version.is_empty() || version.len() > MAX_VERSION_LEN {
                return Err(AgentError::Protocol(format!(
                    "helo version must be 1..={MAX_VERSION_LEN} bytes"
                )));
            }
            Some(version.to_string())
        }
    };

    Ok(HelloInfo { version })
}

/// The greeting an agent sends. Useful for stand-in agents in tests.
pub fn hello_frame(version: &str) -> Result<Frame> {
    let mut frame = Frame::with_code(HELLO, 0);
    frame.add_header(VERSION_HEADER, version.to_string())?;
    Ok(frame)
}
