use std::io::{ErrorKind, Read};

use agentwire_transport::AgentStream;
use bytes::BytesMut;
use tracing::trace;

use crate::codec::{decode_frame, FrameConfig};
use crate::error::{FrameError, Result};
use crate::frame::Frame;

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;
const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Reads complete frames from any `Read` stream.
///
/// Partial reads are buffered internally; callers always get complete frames.
pub struct FrameReader<T> {
    inner: T,
    buf: BytesMut,
    config: FrameConfig,
}

impl<T: Read> FrameReader<T> {
    /// Create a new frame reader with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new frame reader with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            config,
        }
    }

    /// Read the next complete frame (blocking).
    ///
    /// Bytes of a partly received frame stay buffered across calls, so a
    /// read timeout surfacing as `Io` can simply be retried.
    pub fn read_frame(&mut self) -> Result<Frame> {
        loop {
            if let Some(frame) = decode_frame(&mut self.buf, self.config.max_body_size)? {
                trace!(
                    command = %frame.command(),
                    seqno = frame.seqno(),
                    buffered = self.buf.len(),
                    "decoded frame"
                );
                return Ok(frame);
            }
            self.fill()?;
        }
    }

    /// Append at least one more byte from the stream. EOF is
    /// `ConnectionClosed` whether or not a frame was in progress.
    fn fill(&mut self) -> Result<()> {
        let mut chunk = [0u8; READ_CHUNK_SIZE];
        loop {
            match self.inner.read(&mut chunk) {
                Ok(0) => return Err(FrameError::ConnectionClosed),
                Ok(n) => {
                    self.buf.extend_from_slice(&chunk[..n]);
                    return Ok(());
                }
                Err(err) if err.kind() == ErrorKind::Interrupted => {}
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
    }

    /// Bytes received but not yet decoded into a frame.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Current frame reader configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

impl FrameReader<AgentStream> {
    /// Create a frame reader for `AgentStream` and apply read timeout from config.
    pub fn with_config_agent(inner: AgentStream, config: FrameConfig) -> Result<Self> {
        inner
            .set_read_timeout(config.read_timeout)
            .map_err(transport_to_frame_error)?;
        Ok(Self::with_config(inner, config))
    }
}

pub(crate) fn transport_to_frame_error(err: agentwire_transport::TransportError) -> FrameError {
    match err {
        agentwire_transport::TransportError::Io(io) => FrameError::Io(io),
        agentwire_transport::TransportError::Resolve { source, .. }
        | agentwire_transport::TransportError::Connect { source, .. } => FrameError::Io(source),
    }
}
