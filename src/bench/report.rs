//! Human-readable formatting of worker outcomes and run summaries.

use super::{BenchReport, WorkerOutcome};
use crate::progress::human_size;

fn format_speed(mbps: f64) -> String {
    if mbps >= 1000.0 {
        format!("{:.2} Gbps", mbps / 1000.0)
    } else {
        format!("{:.1} Mbps", mbps)
    }
}

/// One line describing a worker's terminal status.
pub fn format_outcome(outcome: &WorkerOutcome) -> String {
    match &outcome.failure {
        None => format!(
            "worker #{}: completed, {} bytes ({}) in {:.2}s, {}",
            outcome.worker,
            outcome.bytes_sent,
            human_size(outcome.bytes_sent),
            outcome.duration_secs,
            format_speed(outcome.throughput_mbps()),
        ),
        Some(f) if f.anomaly => format!(
            "worker #{}: short transfer, {} bytes sent: {}",
            outcome.worker, outcome.bytes_sent, f.message
        ),
        Some(f) => format!(
            "worker #{}: failed in {} phase after {} bytes: {}",
            outcome.worker, f.phase, outcome.bytes_sent, f.message
        ),
    }
}

/// Summary line for the whole run.
pub fn format_summary(report: &BenchReport) -> String {
    let mut summary = format!(
        "{}/{} worker{} completed to {}: {} sent in {:.2}s ({})",
        report.completed(),
        report.concurrency,
        if report.concurrency == 1 { "" } else { "s" },
        report.target,
        human_size(report.total_bytes),
        report.duration_secs,
        format_speed(report.throughput_mbps()),
    );

    let anomalies = report.anomalies();
    if anomalies > 0 {
        summary.push_str(&format!(", {} short transfer(s)", anomalies));
    }
    let fatal = report.fatal_failures();
    if fatal > 0 {
        summary.push_str(&format!(", {} failed", fatal));
    }

    summary
}
