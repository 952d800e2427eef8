//! One OS thread per worker, results gathered asynchronously.
//!
//! Tokio's blocking pool is capped, so long-running transfers get their
//! own threads instead; every worker starts immediately regardless of count.

use tokio::sync::oneshot;
use tracing::error;

/// Run `work(id)` for every `id in 0..count` on a dedicated thread and
/// collect the results in id order.
///
/// A worker whose thread cannot be spawned or that panics yields `Err`
/// with a description; its siblings are unaffected.
pub async fn run_threads<T, F>(count: usize, work: F) -> Vec<Result<T, String>>
where
    T: Send + 'static,
    F: Fn(usize) -> T + Send + Sync + 'static,
{
    let work = std::sync::Arc::new(work);

    let receivers: Vec<Result<oneshot::Receiver<T>, String>> = (0..count)
        .map(|id| {
            let (tx, rx) = oneshot::channel();
            let work = work.clone();
            std::thread::Builder::new()
                .name(format!("f2t-worker-{}", id))
                .spawn(move || {
                    // The receiver only goes away if the run was dropped.
                    let _ = tx.send(work(id));
                })
                .map(|_| rx)
                .map_err(|e| {
                    error!(worker = id, error = %e, "cannot spawn worker thread");
                    format!("cannot spawn worker thread: {}", e)
                })
        })
        .collect();

    let pending = receivers.into_iter().map(|rx| async move {
        match rx {
            Ok(rx) => rx.await.map_err(|_| "worker thread panicked".to_string()),
            Err(e) => Err(e),
        }
    });

    futures::future::join_all(pending).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    #[tokio::test]
    async fn test_results_in_id_order() {
        let results = run_threads(8, |id| id * 10).await;
        let values: Vec<usize> = results.into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(values, vec![0, 10, 20, 30, 40, 50, 60, 70]);
    }

    #[tokio::test]
    async fn test_panic_is_isolated() {
        let results = run_threads(3, |id| {
            if id == 1 {
                panic!("worker 1 blew up");
            }
            id
        })
        .await;
        assert_eq!(results[0], Ok(0));
        assert!(results[1].is_err());
        assert_eq!(results[2], Ok(2));
    }

    #[tokio::test]
    async fn test_all_workers_run_at_once_past_blocking_pool_cap() {
        // More workers than Tokio's default blocking pool (512). Each waits
        // until every other worker has started, which only succeeds if they
        // all run concurrently.
        const WORKERS: usize = 600;
        let started = Arc::new(AtomicUsize::new(0));

        let counter = started.clone();
        let results = run_threads(WORKERS, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            let deadline = Instant::now() + Duration::from_secs(20);
            while counter.load(Ordering::SeqCst) < WORKERS {
                if Instant::now() > deadline {
                    return false;
                }
                std::thread::sleep(Duration::from_millis(1));
            }
            true
        })
        .await;

        assert_eq!(started.load(Ordering::SeqCst), WORKERS);
        assert!(results.into_iter().all(|r| r == Ok(true)));
    }
}
