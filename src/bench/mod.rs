//! Benchmark orchestration: N independent workers, each sending the whole
//! file over its own connection.
//!
//! Workers share nothing mutable. Each one opens its own source handle and
//! socket and reports its own outcome; a failed worker never stops its
//! siblings.

pub mod interrupt;
pub mod pool;
pub mod report;
pub mod worker;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde::Serialize;
use thiserror::Error;
use tracing::{error, info};
use uuid::Uuid;

use crate::net::{CancelHandle, ConnectError};
use crate::progress::ProgressEvent;
use crate::stream::{SourceOpenError, TransferError, TransferResult};

pub use worker::run_worker;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 24224;
pub const DEFAULT_CONCURRENCY: usize = 1;

// ---------------------------------------------------------------------------
// TransferConfig
// ---------------------------------------------------------------------------

/// Validated benchmark parameters. Never mutated by the workers.
#[derive(Debug, Clone, Serialize)]
pub struct TransferConfig {
    pub file_path: PathBuf,
    pub host: String,
    pub port: u16,
    pub concurrency: usize,
    /// Socket-level send timeout applied to every connection.
    pub send_timeout: Option<Duration>,
}

impl TransferConfig {
    pub fn new(file_path: impl Into<PathBuf>) -> Self {
        Self {
            file_path: file_path.into(),
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            concurrency: DEFAULT_CONCURRENCY,
            send_timeout: None,
        }
    }

    pub fn target(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

// ---------------------------------------------------------------------------
// Worker state and errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    Idle,
    Connecting,
    Streaming,
    Completed,
    Failed,
}

impl WorkerState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkerState::Completed | WorkerState::Failed)
    }

    pub fn can_transition_to(&self, next: WorkerState) -> bool {
        use WorkerState::*;
        matches!(
            (*self, next),
            (Idle, Connecting)
                | (Connecting, Streaming)
                | (Connecting, Failed)
                | (Streaming, Completed)
                | (Streaming, Failed)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Streaming => "streaming",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for WorkerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The phase a worker was in when it failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Resolution,
    Connect,
    SourceOpen,
    Transfer,
    /// The worker task itself died.
    Worker,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Resolution => write!(f, "resolution"),
            Phase::Connect => write!(f, "connect"),
            Phase::SourceOpen => write!(f, "source-open"),
            Phase::Transfer => write!(f, "transfer"),
            Phase::Worker => write!(f, "worker"),
        }
    }
}

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error(transparent)]
    Connect(#[from] ConnectError),

    #[error(transparent)]
    SourceOpen(#[from] SourceOpenError),

    #[error(transparent)]
    Transfer(#[from] TransferError),
}

impl WorkerError {
    pub fn phase(&self) -> Phase {
        match self {
            WorkerError::Connect(e) if e.is_resolution() => Phase::Resolution,
            WorkerError::Connect(_) => Phase::Connect,
            WorkerError::SourceOpen(_) => Phase::SourceOpen,
            WorkerError::Transfer(_) => Phase::Transfer,
        }
    }

    /// Short transfers are a data-integrity signal, not a crash.
    pub fn is_anomaly(&self) -> bool {
        matches!(
            self,
            WorkerError::Transfer(TransferError::ShortTransfer { .. })
        )
    }

    pub fn bytes_sent(&self) -> u64 {
        match self {
            WorkerError::Transfer(e) => e.bytes_sent(),
            _ => 0,
        }
    }
}

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct WorkerFailure {
    pub phase: Phase,
    pub message: String,
    pub anomaly: bool,
}

/// Terminal status of one worker.
#[derive(Debug, Clone, Serialize)]
pub struct WorkerOutcome {
    pub worker: usize,
    pub state: WorkerState,
    pub bytes_sent: u64,
    pub total_size: Option<u64>,
    pub duration_secs: f64,
    pub failure: Option<WorkerFailure>,
}

impl WorkerOutcome {
    pub fn completed(worker: usize, result: TransferResult) -> Self {
        Self {
            worker,
            state: WorkerState::Completed,
            bytes_sent: result.bytes_sent,
            total_size: Some(result.total_size),
            duration_secs: result.duration_secs,
            failure: None,
        }
    }

    pub fn failed(worker: usize, err: WorkerError, duration_secs: f64) -> Self {
        let total_size = match &err {
            WorkerError::Transfer(TransferError::ShortTransfer { expected, .. }) => Some(*expected),
            _ => None,
        };
        Self {
            worker,
            state: WorkerState::Failed,
            bytes_sent: err.bytes_sent(),
            total_size,
            duration_secs,
            failure: Some(WorkerFailure {
                phase: err.phase(),
                message: err.to_string(),
                anomaly: err.is_anomaly(),
            }),
        }
    }

    fn panicked(worker: usize, message: String) -> Self {
        Self {
            worker,
            state: WorkerState::Failed,
            bytes_sent: 0,
            total_size: None,
            duration_secs: 0.0,
            failure: Some(WorkerFailure {
                phase: Phase::Worker,
                message,
                anomaly: false,
            }),
        }
    }

    pub fn is_completed(&self) -> bool {
        self.state == WorkerState::Completed
    }

    pub fn is_anomaly(&self) -> bool {
        self.failure.as_ref().is_some_and(|f| f.anomaly)
    }

    pub fn throughput_mbps(&self) -> f64 {
        if self.duration_secs <= 0.0 {
            return 0.0;
        }
        (self.bytes_sent as f64 * 8.0) / self.duration_secs / 1_000_000.0
    }
}

/// Aggregated result of one benchmark run.
#[derive(Debug, Clone, Serialize)]
pub struct BenchReport {
    pub run_id: Uuid,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub file: PathBuf,
    pub target: String,
    pub concurrency: usize,
    pub workers: Vec<WorkerOutcome>,
    pub total_bytes: u64,
    pub duration_secs: f64,
}

impl BenchReport {
    pub fn completed(&self) -> usize {
        self.workers.iter().filter(|w| w.is_completed()).count()
    }

    pub fn anomalies(&self) -> usize {
        self.workers.iter().filter(|w| w.is_anomaly()).count()
    }

    /// Workers that failed for a reason other than a short transfer.
    pub fn fatal_failures(&self) -> usize {
        self.workers
            .iter()
            .filter(|w| !w.is_completed() && !w.is_anomaly())
            .count()
    }

    pub fn is_success(&self) -> bool {
        self.fatal_failures() == 0
    }

    /// Aggregate throughput over the wall-clock duration of the run.
    pub fn throughput_mbps(&self) -> f64 {
        if self.duration_secs <= 0.0 {
            return 0.0;
        }
        (self.total_bytes as f64 * 8.0) / self.duration_secs / 1_000_000.0
    }
}

// ---------------------------------------------------------------------------
// Cancellation
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct CancelState {
    cancelled: AtomicBool,
    handles: Mutex<HashMap<usize, CancelHandle>>,
}

/// Cancels running workers by shutting their sockets down.
///
/// Cloning shares the same registry.
#[derive(Debug, Clone, Default)]
pub struct Canceller {
    inner: Arc<CancelState>,
}

impl Canceller {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a worker's connection until the returned guard is dropped.
    ///
    /// If `cancel_all` already ran, the connection is shut down right away.
    pub fn register(&self, worker: usize, handle: CancelHandle) -> Registration {
        let mut handles = self.handles();
        if self.is_cancelled() {
            handle.cancel();
        }
        handles.insert(worker, handle);
        drop(handles);
        Registration {
            canceller: self.clone(),
            worker,
        }
    }

    pub fn cancel_all(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        let handles = self.handles();
        info!(workers = handles.len(), "cancelling workers");
        for handle in handles.values() {
            handle.cancel();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    fn handles(&self) -> std::sync::MutexGuard<'_, HashMap<usize, CancelHandle>> {
        self.inner
            .handles
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Removes a worker from the [`Canceller`] when dropped, closing the
/// duplicated socket handle.
#[derive(Debug)]
pub struct Registration {
    canceller: Canceller,
    worker: usize,
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.canceller.handles().remove(&self.worker);
    }
}

// ---------------------------------------------------------------------------
// Run
// ---------------------------------------------------------------------------

/// Run `config.concurrency` independent workers and collect every outcome.
///
/// Every worker gets its own OS thread so all of them transfer in
/// parallel; `on_progress` is called from those threads.
pub async fn run<F>(config: &TransferConfig, canceller: Canceller, on_progress: F) -> BenchReport
where
    F: Fn(ProgressEvent) + Send + Sync + 'static,
{
    let run_id = Uuid::new_v4();
    let started_at = chrono::Utc::now();
    let start = Instant::now();

    info!(
        run_id = %run_id,
        target = %config.target(),
        concurrency = config.concurrency,
        "starting workers"
    );

    let shared = config.clone();
    let results = pool::run_threads(config.concurrency, move |id| {
        worker::run_worker(id, &shared, &canceller, &on_progress)
    })
    .await;

    let workers: Vec<WorkerOutcome> = results
        .into_iter()
        .enumerate()
        .map(|(id, joined)| match joined {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(worker = id, error = %e, "worker thread failed");
                WorkerOutcome::panicked(id, e)
            }
        })
        .collect();

    let total_bytes: u64 = workers.iter().map(|w| w.bytes_sent).sum();
    let duration_secs = start.elapsed().as_secs_f64();

    info!(
        run_id = %run_id,
        total_bytes,
        duration_sec = duration_secs,
        "all workers finished"
    );

    BenchReport {
        run_id,
        started_at,
        file: config.file_path.clone(),
        target: config.target(),
        concurrency: config.concurrency,
        workers,
        total_bytes,
        duration_secs,
    }
}
