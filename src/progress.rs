//! Progress accounting and rendering.
//!
//! The percentage is always `sent * 100.0 / total` in `f64`; a zero-sized
//! source counts as fully sent.

use std::collections::BTreeMap;

/// Per-worker counter of bytes written so far.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ProgressState {
    bytes_sent: u64,
}

impl ProgressState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent
    }

    /// Add `n` bytes and return the new total.
    pub fn advance(&mut self, n: u64) -> u64 {
        self.bytes_sent += n;
        self.bytes_sent
    }

    pub fn reset(&mut self) {
        self.bytes_sent = 0;
    }
}

/// Percentage of `total` already sent.
pub fn percent(sent: u64, total: u64) -> f64 {
    if total == 0 {
        return 100.0;
    }
    (sent as f64 * 100.0) / total as f64
}

/// Format a byte count using binary multiples.
///
/// The number of decimals equals the unit index: bytes have none, kB one,
/// MB two and so on.
pub fn human_size(bytes: u64) -> String {
    const UNITS: [&str; 9] = ["B", "kB", "MB", "GB", "TB", "PB", "EB", "ZB", "YB"];

    let mut size = bytes as f64;
    let mut i = 0;
    while size > 1024.0 && i < UNITS.len() - 1 {
        size /= 1024.0;
        i += 1;
    }
    format!("{:.*} {}", i, size, UNITS[i])
}

// ---------------------------------------------------------------------------
// Single-worker line
// ---------------------------------------------------------------------------

/// Renders the progress line of one transfer, suppressing redraws that
/// would not change what the user sees.
#[derive(Debug, Default)]
pub struct ProgressLine {
    last_percent: Option<String>,
}

impl ProgressLine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the line to draw, or `None` if the visible percentage is
    /// unchanged. The final update (`sent == total`) is always drawn.
    pub fn update(&mut self, sent: u64, total: u64) -> Option<String> {
        let pct = format!("{:.2}", percent(sent, total));
        if sent != total && self.last_percent.as_deref() == Some(pct.as_str()) {
            return None;
        }
        let line = format!("[f2t] progress: {}% ({}/{} bytes)", pct, sent, total);
        self.last_percent = Some(pct);
        Some(line)
    }
}

// ---------------------------------------------------------------------------
// Multi-worker board
// ---------------------------------------------------------------------------

/// One progress update from a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressEvent {
    pub worker: usize,
    pub sent: u64,
    pub total: u64,
}

/// Combines the progress of several workers into one overwritten line.
#[derive(Debug, Default)]
pub struct ProgressBoard {
    workers: BTreeMap<usize, String>,
}

impl ProgressBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an event; returns the new line if any visible value changed.
    pub fn update(&mut self, event: ProgressEvent) -> Option<String> {
        let pct = format!("{:.2}", percent(event.sent, event.total));
        if self.workers.get(&event.worker) == Some(&pct) {
            return None;
        }
        self.workers.insert(event.worker, pct);

        let parts: Vec<String> = self
            .workers
            .iter()
            .map(|(id, pct)| format!("#{} {}%", id, pct))
            .collect();
        Some(format!("[f2t] progress: {}", parts.join(" | ")))
    }
}
