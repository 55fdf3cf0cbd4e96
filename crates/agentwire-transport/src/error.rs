/// Errors that can occur in agent transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The agent address could not be resolved to any socket address.
    #[error("failed to resolve agent address {addr}: {source}")]
    Resolve {
        addr: String,
        source: std::io::Error,
    },

    /// Failed to connect to the agent.
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        source: std::io::Error,
    },

    /// An I/O error occurred on the transport stream.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, TransportError>;
