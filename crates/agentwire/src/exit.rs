use std::fmt;
use std::io;

use agentwire_agent::{AgentError, CommandError};
use agentwire_frame::FrameError;

pub const SUCCESS: i32 = 0;
/// The agent answered with a non-okay status.
pub const REMOTE_ERROR: i32 = 2;
pub const TRANSPORT_ERROR: i32 = 3;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

fn io_code(kind: io::ErrorKind) -> i32 {
    match kind {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::ConnectionRefused => TRANSPORT_ERROR,
        io::ErrorKind::NotFound => USAGE,
        _ => INTERNAL,
    }
}

fn agent_code(err: &AgentError) -> i32 {
    match err {
        AgentError::Io(source) => io_code(source.kind()),
        AgentError::InvalidFrame(_) => USAGE,
        AgentError::ConnectionLost(_) => TRANSPORT_ERROR,
        AgentError::Protocol(_) => DATA_INVALID,
        AgentError::Remote(_) => REMOTE_ERROR,
        AgentError::Timeout(_) => TIMEOUT,
        AgentError::DuplicateSequence(_) => INTERNAL,
    }
}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    CliError::new(io_code(err.kind()), format!("{context}: {err}"))
}

pub fn frame_error(context: &str, err: FrameError) -> CliError {
    let code = match &err {
        FrameError::Io(source) => io_code(source.kind()),
        FrameError::InvalidFrame(_) => USAGE,
        FrameError::PayloadTooLarge { .. } | FrameError::Malformed(_) => DATA_INVALID,
        FrameError::PartialWrite { .. } | FrameError::ConnectionClosed => TRANSPORT_ERROR,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn agent_error(context: &str, err: AgentError) -> CliError {
    CliError::new(agent_code(&err), format!("{context}: {err}"))
}

pub fn command_error(context: &str, err: CommandError) -> CliError {
    match err {
        CommandError::Remote(reason) => {
            CliError::new(REMOTE_ERROR, format!("{context}: agent reported: {reason}"))
        }
        CommandError::Connection(err) => {
            CliError::new(agent_code(&err), format!("{context}: {err}"))
        }
    }
}
