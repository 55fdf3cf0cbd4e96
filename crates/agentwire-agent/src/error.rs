use agentwire_frame::FrameError;
use agentwire_transport::TransportError;

/// Errors surfaced by the agent connection.
///
/// Everything except `InvalidFrame` and `Timeout` reaches callers through
/// the same reply handler that carries successful frames.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    /// A frame was built with invalid values.
    #[error("invalid frame: {0}")]
    InvalidFrame(String),

    /// Writing this transaction's frame failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The connection dropped or was never established; every outstanding
    /// transaction fails with this.
    #[error("connection lost: {0}")]
    ConnectionLost(String),

    /// The agent sent bytes that do not decode as frames, or broke the
    /// hello exchange. Fatal to the connection.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// A sequence number was submitted while another transaction still
    /// holds it. Fatal to the connection.
    #[error("sequence number {0} is already outstanding")]
    DuplicateSequence(u32),

    /// A `resp` frame reported a status other than `okay`.
    #[error("agent reported: {0}")]
    Remote(String),

    /// Waiting for the connection took longer than allowed.
    #[error("timed out after {0:?}")]
    Timeout(std::time::Duration),
}

impl From<FrameError> for AgentError {
    fn from(err: FrameError) -> Self {
        match err {
            FrameError::InvalidFrame(msg) => AgentError::InvalidFrame(msg),
            FrameError::Malformed(_) | FrameError::PayloadTooLarge { .. } => {
                AgentError::Protocol(err.to_string())
            }
            FrameError::Io(io) => AgentError::Io(io),
            FrameError::PartialWrite { .. } => AgentError::ConnectionLost(err.to_string()),
            FrameError::ConnectionClosed => {
                AgentError::ConnectionLost("agent closed the connection".to_string())
            }
        }
    }
}

impl From<TransportError> for AgentError {
    fn from(err: TransportError) -> Self {
        AgentError::ConnectionLost(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AgentError>;
