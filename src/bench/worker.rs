//! A single worker: open the source, connect, stream, close.

use std::time::Instant;

use tracing::{debug, info, info_span, warn};

use crate::net;
use crate::progress::{ProgressEvent, ProgressState};
use crate::stream::{self, SourceHandle, TransferResult};

use super::{Canceller, TransferConfig, WorkerError, WorkerOutcome, WorkerState};

/// Drives one worker through `Idle -> Connecting -> Streaming -> {Completed | Failed}`.
struct Worker {
    id: usize,
    state: WorkerState,
}

impl Worker {
    fn new(id: usize) -> Self {
        Self {
            id,
            state: WorkerState::Idle,
        }
    }

    fn transition(&mut self, next: WorkerState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "invalid worker transition {:?} -> {:?}",
            self.state,
            next
        );
        debug!(worker = self.id, from = %self.state, to = %next, "worker state");
        self.state = next;
    }

    fn attempt<F>(
        &mut self,
        config: &TransferConfig,
        canceller: &Canceller,
        on_progress: &F,
    ) -> Result<TransferResult, WorkerError>
    where
        F: Fn(ProgressEvent),
    {
        self.transition(WorkerState::Connecting);

        let source = SourceHandle::open(&config.file_path)?;
        let conn = net::connect(&config.host, config.port)?;
        info!(
            worker = self.id,
            peer = %conn.peer_addr(),
            local = ?conn.local_addr().ok(),
            file = %source.path().display(),
            "connected"
        );

        if let Some(timeout) = config.send_timeout {
            if let Err(e) = conn.set_write_timeout(Some(timeout)) {
                warn!(worker = self.id, error = %e, "failed to apply send timeout");
            }
        }
        let _registration = match conn.cancel_handle() {
            Ok(handle) => Some(canceller.register(self.id, handle)),
            Err(e) => {
                warn!(worker = self.id, error = %e, "worker cannot be cancelled");
                None
            }
        };

        self.transition(WorkerState::Streaming);

        let id = self.id;
        let mut progress = ProgressState::new();
        let result = stream::stream(&source, &conn, &mut progress, |sent, total| {
            on_progress(ProgressEvent {
                worker: id,
                sent,
                total,
            })
        })?;

        // Registration, `conn` and `source` are dropped (closed) here.
        Ok(result)
    }
}

/// Run the full connect-and-stream sequence for worker `id` on the calling
/// thread. Blocks until the transfer ends.
pub fn run_worker<F>(
    id: usize,
    config: &TransferConfig,
    canceller: &Canceller,
    on_progress: &F,
) -> WorkerOutcome
where
    F: Fn(ProgressEvent),
{
    let span = info_span!("worker", id);
    let _enter = span.enter();

    let start = Instant::now();
    let mut worker = Worker::new(id);

    match worker.attempt(config, canceller, on_progress) {
        Ok(result) => {
            worker.transition(WorkerState::Completed);
            info!(
                bytes_sent = result.bytes_sent,
                chunks = result.chunks,
                duration_sec = result.duration_secs,
                "transfer completed"
            );
            WorkerOutcome::completed(id, result)
        }
        Err(e) => {
            worker.transition(WorkerState::Failed);
            if e.is_anomaly() {
                warn!(phase = %e.phase(), error = %e, "short transfer");
            } else {
                warn!(phase = %e.phase(), error = %e, "worker failed");
            }
            WorkerOutcome::failed(id, e, start.elapsed().as_secs_f64())
        }
    }
}
