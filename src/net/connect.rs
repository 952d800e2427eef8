//! Resolve-then-connect loop with low-latency tuning.

use std::io;
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};

use tracing::{debug, warn};

use super::{ConnectError, Connection};

/// Resolve `host:port` into candidate addresses, in resolver order.
///
/// Both IPv4 and IPv6 candidates are kept.
pub fn resolve(host: &str, port: u16) -> Result<Vec<SocketAddr>, ConnectError> {
    let candidates: Vec<SocketAddr> = (host, port)
        .to_socket_addrs()
        .map_err(|e| ConnectError::Resolution {
            host: host.to_string(),
            port,
            reason: e.to_string(),
        })?
        .collect();

    if candidates.is_empty() {
        return Err(ConnectError::Resolution {
            host: host.to_string(),
            port,
            reason: "no addresses returned".to_string(),
        });
    }

    debug!(%host, %port, candidates = candidates.len(), "resolved target");
    Ok(candidates)
}

/// Connect to the first reachable candidate for `host:port`.
///
/// Failed sockets are closed before the next candidate is tried. On success
/// `TCP_NODELAY` is enabled; if that fails a warning is logged and the
/// connection is returned with default coalescing.
pub fn connect(host: &str, port: u16) -> Result<Connection, ConnectError> {
    let candidates = resolve(host, port)?;
    connect_candidates(host, port, &candidates)
}

fn connect_candidates(
    host: &str,
    port: u16,
    candidates: &[SocketAddr],
) -> Result<Connection, ConnectError> {
    let mut last_err: Option<io::Error> = None;

    for addr in candidates {
        match TcpStream::connect(addr) {
            Ok(stream) => {
                if let Err(e) = stream.set_nodelay(true) {
                    warn!(%addr, error = %e, "failed to set TCP_NODELAY, using default coalescing");
                }
                debug!(%addr, "connected");
                return Ok(Connection::new(stream, *addr));
            }
            Err(e) => {
                debug!(%addr, error = %e, "cannot connect, trying next candidate");
                last_err = Some(e);
            }
        }
    }

    Err(ConnectError::Connect {
        host: host.to_string(),
        port,
        attempts: candidates.len(),
        source: last_err
            .unwrap_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "no candidates")),
    })
}
