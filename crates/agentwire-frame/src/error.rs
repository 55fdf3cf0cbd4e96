/// Errors that can occur while building, encoding or decoding frames.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// A frame or one of its entries was constructed with invalid values.
    #[error("invalid frame: {0}")]
    InvalidFrame(String),

    /// Inbound bytes do not follow the frame grammar.
    #[error("malformed frame: {0}")]
    Malformed(String),

    /// The frame body exceeds the configured maximum size.
    #[error("frame body too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Writing failed after part of the frame was already sent. The stream
    /// no longer sits on a frame boundary and cannot carry further frames.
    #[error("frame write failed after {written} of {total} bytes: {source}")]
    PartialWrite {
        written: usize,
        total: usize,
        #[source]
        source: std::io::Error,
    },

    /// The connection was closed before a complete frame was received.
    #[error("connection closed (incomplete frame)")]
    ConnectionClosed,
}

pub type Result<T> = std::result::Result<T, FrameError>;
