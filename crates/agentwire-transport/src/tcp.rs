use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use tracing::debug;

use crate::error::{Result, TransportError};
use crate::stream::AgentStream;

/// Port a local agent listens on unless configured otherwise.
pub const DEFAULT_AGENT_PORT: u16 = 28589;

/// Connect to an agent (blocking, OS default timeout).
///
/// `addr` is `host:port`; a bare host gets [`DEFAULT_AGENT_PORT`].
pub fn connect(addr: &str) -> Result<AgentStream> {
    let targets = resolve(addr)?;
    let mut last_err = None;
    for target in targets {
        match TcpStream::connect(target) {
            Ok(stream) => {
                debug!(%target, "connected to agent");
                return AgentStream::from_tcp(stream);
            }
            Err(err) => last_err = Some(err),
        }
    }
    Err(connect_failed(addr, last_err))
}

/// Connect to an agent, giving up on each resolved address after `timeout`.
pub fn connect_timeout(addr: &str, timeout: Duration) -> Result<AgentStream> {
    let targets = resolve(addr)?;
    let mut last_err = None;
    for target in targets {
        match TcpStream::connect_timeout(&target, timeout) {
            Ok(stream) => {
                debug!(%target, ?timeout, "connected to agent");
                return AgentStream::from_tcp(stream);
            }
            Err(err) => last_err = Some(err),
        }
    }
    Err(connect_failed(addr, last_err))
}

fn resolve(addr: &str) -> Result<Vec<SocketAddr>> {
    let with_port = if has_port(addr) {
        addr.to_string()
    } else {
        format!("{addr}:{DEFAULT_AGENT_PORT}")
    };

    let targets: Vec<SocketAddr> = with_port
        .to_socket_addrs()
        .map_err(|source| TransportError::Resolve {
            addr: addr.to_string(),
            source,
        })?
        .collect();

    if targets.is_empty() {
        return Err(TransportError::Resolve {
            addr: addr.to_string(),
            source: std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "address resolved to no socket addresses",
            ),
        });
    }
    Ok(targets)
}

fn has_port(addr: &str) -> bool {
    // `[::1]:28589` and `host:28589` carry a port, a bare `::1` does not.
    if let Some(rest) = addr.strip_prefix('[') {
        return rest.contains("]:");
    }
    addr.matches(':').count() == 1
}

fn connect_failed(addr: &str, err: Option<std::io::Error>) -> TransportError {
    TransportError::Connect {
        addr: addr.to_string(),
        source: err.unwrap_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::NotConnected, "no address attempted")
        }),
    }
}
