//! Connector: host/port resolution and TCP connection establishment.
//!
//! Resolution is family-agnostic; candidates are tried in the order the
//! system resolver returns them and the first successful connect wins.

pub mod connect;

use std::io;
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::time::Duration;

use thiserror::Error;

pub use connect::connect;

#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("cannot resolve {host}:{port}: {reason}")]
    Resolution {
        host: String,
        port: u16,
        reason: String,
    },

    #[error("cannot connect to {host} port {port} ({attempts} address(es) tried): {source}")]
    Connect {
        host: String,
        port: u16,
        attempts: usize,
        #[source]
        source: io::Error,
    },
}

impl ConnectError {
    /// True when the failure happened before any connect was attempted.
    pub fn is_resolution(&self) -> bool {
        matches!(self, ConnectError::Resolution { .. })
    }
}

// ---------------------------------------------------------------------------
// Connection
// ---------------------------------------------------------------------------

/// An open, connected TCP socket owned by a single worker.
///
/// The socket is closed when the `Connection` is dropped.
#[derive(Debug)]
pub struct Connection {
    stream: TcpStream,
    peer: SocketAddr,
}

impl Connection {
    pub(crate) fn new(stream: TcpStream, peer: SocketAddr) -> Self {
        Self { stream, peer }
    }

    /// The candidate address this connection was established to.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.stream.local_addr()
    }

    /// Whether `TCP_NODELAY` is active on the socket.
    pub fn nodelay(&self) -> io::Result<bool> {
        self.stream.nodelay()
    }

    /// Apply a socket-level send timeout. `None` blocks indefinitely.
    pub fn set_write_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        self.stream.set_write_timeout(timeout)
    }

    /// Handle that can shut this socket down from another thread.
    pub fn cancel_handle(&self) -> io::Result<CancelHandle> {
        Ok(CancelHandle {
            stream: self.stream.try_clone()?,
        })
    }

    pub fn as_stream(&self) -> &TcpStream {
        &self.stream
    }
}

/// Out-of-band cancellation for an in-flight transfer.
///
/// Shutting the socket down makes the blocked (or next) chunk transfer
/// fail with an I/O error.
#[derive(Debug)]
pub struct CancelHandle {
    stream: TcpStream,
}

impl CancelHandle {
    pub fn cancel(&self) {
        if let Err(e) = self.stream.shutdown(Shutdown::Both) {
            // Already closed by the peer or the worker.
            tracing::debug!(error = %e, "socket shutdown during cancel failed");
        }
    }
}
