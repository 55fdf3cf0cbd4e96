use std::io::{Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::time::Duration;

use crate::error::Result;

/// A connected agent stream, implements Read + Write.
///
/// The read half is usually handed to a dedicated reader via
/// [`AgentStream::try_clone`] while the original keeps writing.
pub struct AgentStream {
    inner: TcpStream,
    peer: Option<SocketAddr>,
}

impl Read for AgentStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.inner.read(buf)
    }
}

impl Write for AgentStream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

impl AgentStream {
    /// Wrap an already connected TCP stream.
    ///
    /// Frames are small and latency bound, so Nagle is turned off.
    pub fn from_tcp(stream: TcpStream) -> Result<Self> {
        stream.set_nodelay(true)?;
        let peer = stream.peer_addr().ok();
        Ok(Self {
            inner: stream,
            peer,
        })
    }

    /// Set read timeout on the underlying stream.
    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        self.inner.set_read_timeout(timeout).map_err(Into::into)
    }

    /// Set write timeout on the underlying stream.
    pub fn set_write_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        self.inner.set_write_timeout(timeout).map_err(Into::into)
    }

    /// Try to clone this stream (creates a new file descriptor).
    pub fn try_clone(&self) -> Result<Self> {
        let cloned = self.inner.try_clone()?;
        Ok(Self {
            inner: cloned,
            peer: self.peer,
        })
    }

    /// Shut down both directions.
    ///
    /// Any clone blocked in `read` wakes up with EOF. Errors from an already
    /// closed socket are ignored.
    pub fn shutdown(&self) {
        let _ = self.inner.shutdown(Shutdown::Both);
    }

    /// Remote address of the agent, if the socket still knows it.
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer
    }
}

impl std::fmt::Debug for AgentStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentStream")
            .field("type", &"tcp")
            .field("peer", &self.peer)
            .finish()
    }
}
