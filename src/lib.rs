//! file2tcp -- stream a local file to a TCP endpoint as fast as the kernel allows.
//!
//! The library holds the transfer engine: resolving and connecting to the
//! target ([`net`]), moving file bytes onto the socket in bounded zero-copy
//! chunks ([`stream`]), progress accounting ([`progress`]) and running any
//! number of independent full-file workers ([`bench`]).

pub mod bench;
pub mod config;
pub mod net;
pub mod progress;
pub mod stream;

pub use bench::{BenchReport, Canceller, TransferConfig, WorkerOutcome, WorkerState};
pub use net::{connect, ConnectError, Connection};
pub use stream::{stream, SourceHandle, SourceOpenError, TransferError, TransferResult};
