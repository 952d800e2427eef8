//! One bounded chunk transfer from a file to a socket.
//!
//! On Linux this is `sendfile(2)`, which moves the bytes in-kernel. Other
//! platforms stage the chunk through a reusable buffer.

use std::fs::File;
use std::io;
use std::net::TcpStream;

#[cfg(not(target_os = "linux"))]
use std::io::{Read, Seek, SeekFrom, Write};

/// Moves file bytes at an explicit offset to a socket, one chunk per call.
pub(crate) struct ChunkWriter {
    #[cfg(not(target_os = "linux"))]
    buf: Vec<u8>,
}

impl ChunkWriter {
    pub(crate) fn new() -> Self {
        Self {
            #[cfg(not(target_os = "linux"))]
            buf: Vec::new(),
        }
    }

    /// Transfer up to `count` bytes starting at `offset`.
    ///
    /// Returns the number of bytes accepted by the socket; `0` means the
    /// source is exhausted at `offset`.
    #[cfg(target_os = "linux")]
    pub(crate) fn transfer(
        &mut self,
        file: &File,
        socket: &TcpStream,
        offset: u64,
        count: usize,
    ) -> io::Result<usize> {
        use std::os::unix::io::AsRawFd;

        let mut off = libc::off_t::try_from(offset)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "offset overflows off_t"))?;

        // SAFETY: both descriptors are borrowed from live owners for the
        // duration of the call and `off` is a valid, exclusive pointer.
        let ret = unsafe { libc::sendfile(socket.as_raw_fd(), file.as_raw_fd(), &mut off, count) };
        if ret < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(ret as usize)
    }

    #[cfg(not(target_os = "linux"))]
    pub(crate) fn transfer(
        &mut self,
        file: &File,
        socket: &TcpStream,
        offset: u64,
        count: usize,
    ) -> io::Result<usize> {
        if self.buf.len() < count {
            self.buf.resize(count, 0);
        }

        let mut reader = file;
        reader.seek(SeekFrom::Start(offset))?;
        let n = reader.read(&mut self.buf[..count])?;
        if n == 0 {
            return Ok(0);
        }

        let mut writer = socket;
        writer.write_all(&self.buf[..n])?;
        Ok(n)
    }
}
