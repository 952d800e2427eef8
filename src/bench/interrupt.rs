//! Interrupt escalation: the first signal cancels every worker, a second
//! one asks the caller to exit right away.
//!
//! Cancelling only reaches workers that already hold a socket; a worker
//! still blocked in `connect` keeps running until the OS gives up, hence
//! the second step.

use futures::{Stream, StreamExt};
use tracing::warn;

use super::Canceller;

/// Exit status conventionally used after SIGINT.
pub const INTERRUPTED_EXIT_CODE: i32 = 130;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupt {
    /// The signal source ended before any interrupt arrived.
    None,
    /// Workers were cancelled; no second interrupt followed.
    Cancelled,
    /// A second interrupt arrived after cancelling.
    ForceExit,
}

/// Consume interrupt notifications from `signals` and react to them.
pub async fn watch<S>(mut signals: S, canceller: Canceller) -> Interrupt
where
    S: Stream<Item = ()> + Unpin,
{
    if signals.next().await.is_none() {
        return Interrupt::None;
    }
    warn!("interrupted, cancelling workers (interrupt again to exit immediately)");
    canceller.cancel_all();

    if signals.next().await.is_none() {
        return Interrupt::Cancelled;
    }
    warn!("interrupted again, exiting");
    Interrupt::ForceExit
}

/// Ctrl-C notifications as a stream; ends if the handler cannot be installed.
pub fn ctrl_c_signals() -> impl Stream<Item = ()> + Unpin + Send {
    Box::pin(futures::stream::unfold((), |()| async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => Some(((), ())),
            Err(e) => {
                warn!(error = %e, "cannot listen for Ctrl-C");
                None
            }
        }
    }))
}
