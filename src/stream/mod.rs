//! Streamer: drains a source file into a connected socket in bounded chunks.
//!
//! Bytes go out in file order, one chunk at a time; a chunk is only
//! requested once the previous one has been accepted. Progress is reported
//! after every chunk that moved data.

mod sendfile;

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Instant;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, trace};

use crate::net::Connection;
use crate::progress::ProgressState;

use sendfile::ChunkWriter;

/// Upper bound on bytes moved by a single transfer operation.
pub const CHUNK_SIZE: usize = 1_024_000;

#[derive(Debug, Error)]
#[error("cannot open source file {}: {source}", .path.display())]
pub struct SourceOpenError {
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}

#[derive(Debug, Error)]
pub enum TransferError {
    #[error("transfer failed after {sent} bytes: {source}")]
    Io {
        sent: u64,
        #[source]
        source: io::Error,
    },

    #[error("source exhausted after {sent} of {expected} bytes")]
    ShortTransfer { sent: u64, expected: u64 },
}

impl TransferError {
    /// Bytes that reached the socket before the transfer stopped.
    pub fn bytes_sent(&self) -> u64 {
        match self {
            TransferError::Io { sent, .. } => *sent,
            TransferError::ShortTransfer { sent, .. } => *sent,
        }
    }
}

// ---------------------------------------------------------------------------
// SourceHandle
// ---------------------------------------------------------------------------

/// Read-only handle over the source file and its size at open time.
#[derive(Debug)]
pub struct SourceHandle {
    file: File,
    path: PathBuf,
    size: u64,
}

impl SourceHandle {
    /// Open `path` read-only and capture its size.
    pub fn open(path: &Path) -> Result<Self, SourceOpenError> {
        let wrap = |source: io::Error| SourceOpenError {
            path: path.to_path_buf(),
            source,
        };
        let file = File::open(path).map_err(wrap)?;
        let size = file.metadata().map_err(wrap)?.len();
        debug!(path = %path.display(), size, "opened source");
        Ok(Self {
            file,
            path: path.to_path_buf(),
            size,
        })
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

// ---------------------------------------------------------------------------
// Transfer
// ---------------------------------------------------------------------------

/// Outcome of a completed transfer.
#[derive(Debug, Clone, Serialize)]
pub struct TransferResult {
    pub bytes_sent: u64,
    pub total_size: u64,
    pub chunks: u64,
    pub duration_secs: f64,
}

impl TransferResult {
    pub fn throughput_mbps(&self) -> f64 {
        if self.duration_secs <= 0.0 {
            return 0.0;
        }
        (self.bytes_sent as f64 * 8.0) / self.duration_secs / 1_000_000.0
    }
}

/// Send the whole source over `conn`, calling `on_progress(sent, total)`
/// after every chunk that moved at least one byte.
///
/// `progress` is reset before the first chunk. At most `source.size()`
/// bytes are sent. Neither the connection nor the source is closed here.
pub fn stream<F>(
    source: &SourceHandle,
    conn: &Connection,
    progress: &mut ProgressState,
    mut on_progress: F,
) -> Result<TransferResult, TransferError>
where
    F: FnMut(u64, u64),
{
    progress.reset();
    let total = source.size();
    let start = Instant::now();

    if total == 0 {
        return Ok(TransferResult {
            bytes_sent: 0,
            total_size: 0,
            chunks: 0,
            duration_secs: start.elapsed().as_secs_f64(),
        });
    }

    let mut writer = ChunkWriter::new();
    let mut chunks = 0u64;

    loop {
        // Never read past the size captured at open; a file growing
        // mid-transfer is sent only up to that size.
        let offset = progress.bytes_sent();
        let left = total - offset;
        let count = usize::try_from(left).map_or(CHUNK_SIZE, |left| left.min(CHUNK_SIZE));
        match writer.transfer(&source.file, conn.as_stream(), offset, count) {
            Ok(0) => break,
            Ok(n) => {
                chunks += 1;
                let sent = progress.advance(n as u64);
                trace!(chunk = chunks, bytes = n, sent, "chunk sent");
                on_progress(sent, total);
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                return Err(TransferError::Io {
                    sent: progress.bytes_sent(),
                    source: e,
                })
            }
        }
    }

    let sent = progress.bytes_sent();
    if sent != total {
        return Err(TransferError::ShortTransfer {
            sent,
            expected: total,
        });
    }

    Ok(TransferResult {
        bytes_sent: sent,
        total_size: total,
        chunks,
        duration_secs: start.elapsed().as_secs_f64(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::thread;

    fn source_with(bytes: &[u8]) -> (tempfile::NamedTempFile, SourceHandle) {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(bytes).unwrap();
        tmp.flush().unwrap();
        let handle = SourceHandle::open(tmp.path()).unwrap();
        (tmp, handle)
    }

    /// Accept one connection and return everything received.
    fn sink() -> (u16, thread::JoinHandle<Vec<u8>>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let handle = thread::spawn(move || {
            let (mut socket, _) = listener.accept().unwrap();
            let mut received = Vec::new();
            socket.read_to_end(&mut received).unwrap();
            received
        });
        (port, handle)
    }

    #[test]
    fn test_stream_small_file() {
        let (_tmp, source) = source_with(b"abc");
        let (port, receiver) = sink();

        let conn = net::connect("127.0.0.1", port).unwrap();
        let mut progress = ProgressState::new();
        let mut updates = Vec::new();
        let result = stream(&source, &conn, &mut progress, |s, t| updates.push((s, t))).unwrap();
        drop(conn);

        assert_eq!(result.bytes_sent, 3);
        assert_eq!(result.total_size, 3);
        assert_eq!(updates.last(), Some(&(3, 3)));
        assert_eq!(receiver.join().unwrap(), b"abc");
    }

    #[test]
    fn test_stream_multi_chunk_progress_is_monotonic() {
        let payload: Vec<u8> = (0..(CHUNK_SIZE * 3 + 1234)).map(|i| (i % 251) as u8).collect();
        let (_tmp, source) = source_with(&payload);
        let (port, receiver) = sink();

        let conn = net::connect("127.0.0.1", port).unwrap();
        let mut progress = ProgressState::new();
        let mut updates = Vec::new();
        let result = stream(&source, &conn, &mut progress, |s, _| updates.push(s)).unwrap();
        drop(conn);

        assert_eq!(result.bytes_sent, payload.len() as u64);
        assert!(result.chunks >= 4);
        assert!(updates.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(updates.last().copied(), Some(payload.len() as u64));
        assert_eq!(progress.bytes_sent(), payload.len() as u64);
        assert_eq!(receiver.join().unwrap(), payload);
    }

    #[test]
    fn test_stream_empty_file() {
        let (_tmp, source) = source_with(b"");
        let (port, receiver) = sink();

        let conn = net::connect("127.0.0.1", port).unwrap();
        let mut progress = ProgressState::new();
        let mut calls = 0;
        let result = stream(&source, &conn, &mut progress, |_, _| calls += 1).unwrap();
        drop(conn);

        assert_eq!(result.bytes_sent, 0);
        assert_eq!(result.chunks, 0);
        assert_eq!(calls, 0);
        assert!(receiver.join().unwrap().is_empty());
    }

    #[test]
    fn test_stream_twice_from_same_handle() {
        let (_tmp, source) = source_with(b"hello world");
        let mut progress = ProgressState::new();

        for _ in 0..2 {
            let (port, receiver) = sink();
            let conn = net::connect("127.0.0.1", port).unwrap();
            stream(&source, &conn, &mut progress, |_, _| {}).unwrap();
            drop(conn);
            assert_eq!(receiver.join().unwrap(), b"hello world");
        }
    }

    #[test]
    fn test_stream_truncated_source_is_short_transfer() {
        let (tmp, source) = source_with(b"0123456789");
        std::fs::OpenOptions::new()
            .write(true)
            .open(tmp.path())
            .unwrap()
            .set_len(4)
            .unwrap();
        let (port, receiver) = sink();

        let conn = net::connect("127.0.0.1", port).unwrap();
        let mut progress = ProgressState::new();
        let err = stream(&source, &conn, &mut progress, |_, _| {}).unwrap_err();
        drop(conn);

        match err {
            TransferError::ShortTransfer { sent, expected } => {
                assert_eq!(sent, 4);
                assert_eq!(expected, 10);
            }
            other => panic!("expected ShortTransfer, got {:?}", other),
        }
        assert_eq!(receiver.join().unwrap(), b"0123");
    }

    #[test]
    fn test_stream_cancelled_connection_fails() {
        let (_tmp, source) = source_with(&vec![7u8; CHUNK_SIZE * 2]);
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let conn = net::connect("127.0.0.1", port).unwrap();
        let _accepted = listener.accept().unwrap();
        conn.cancel_handle().unwrap().cancel();

        let mut progress = ProgressState::new();
        let err = stream(&source, &conn, &mut progress, |_, _| {}).unwrap_err();
        assert!(matches!(err, TransferError::Io { sent: 0, .. }), "got {:?}", err);
    }

    #[test]
    fn test_cancel_unblocks_stalled_transfer() {
        // Far more than loopback socket buffers hold, so the transfer stalls
        // once the peer stops reading.
        let (_tmp, source) = source_with(&vec![3u8; 64 * 1024 * 1024]);
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let conn = net::connect("127.0.0.1", port).unwrap();
        let _idle_peer = listener.accept().unwrap();
        let cancel = conn.cancel_handle().unwrap();

        let canceller = thread::spawn(move || {
            thread::sleep(std::time::Duration::from_millis(300));
            cancel.cancel();
        });

        let mut progress = ProgressState::new();
        let err = stream(&source, &conn, &mut progress, |_, _| {}).unwrap_err();
        canceller.join().unwrap();

        match err {
            TransferError::Io { sent, .. } => {
                assert!(sent < source.size(), "transfer should stop early, sent {}", sent);
                assert_eq!(sent, progress.bytes_sent());
            }
            other => panic!("expected Io error, got {:?}", other),
        }
    }

    #[test]
    fn test_stream_grown_source_sends_captured_size() {
        let (tmp, source) = source_with(b"0123456789");
        std::fs::OpenOptions::new()
            .append(true)
            .open(tmp.path())
            .unwrap()
            .write_all(b"abcdefghij")
            .unwrap();
        let (port, receiver) = sink();

        let conn = net::connect("127.0.0.1", port).unwrap();
        let mut progress = ProgressState::new();
        let mut updates = Vec::new();
        let result = stream(&source, &conn, &mut progress, |s, t| updates.push((s, t))).unwrap();
        drop(conn);

        assert_eq!(result.bytes_sent, 10);
        assert!(updates.iter().all(|(s, t)| s <= t));
        assert_eq!(updates.last(), Some(&(10, 10)));
        assert_eq!(receiver.join().unwrap(), b"0123456789");
    }

    #[test]
    fn test_open_captures_path_and_size() {
        let (tmp, source) = source_with(b"hello");
        assert_eq!(source.path(), tmp.path());
        assert_eq!(source.size(), 5);
    }

    #[test]
    fn test_open_missing_source() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("gone.bin");
        let err = SourceHandle::open(&missing).unwrap_err();
        assert_eq!(err.path, missing);
        assert_eq!(err.source.kind(), io::ErrorKind::NotFound);
    }
}
