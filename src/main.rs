use std::io::Write;
use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tokio::sync::mpsc;

use file2tcp::bench::interrupt::{self, Interrupt};
use file2tcp::bench::{self, report, Canceller};
use file2tcp::config::{Config, Overrides};
use file2tcp::progress::{human_size, ProgressBoard, ProgressEvent, ProgressLine};

#[derive(Parser)]
#[command(
    name = "file2tcp",
    about = "Stream a file to a TCP endpoint as fast as the kernel allows",
    version,
    long_about = None,
    disable_help_flag = true
)]
struct Cli {
    /// Input file to send
    #[arg(short = 'f', long)]
    file: Option<PathBuf>,

    /// Target host (default: 127.0.0.1)
    #[arg(short = 'h', long)]
    host: Option<String>,

    /// Target TCP port (default: 24224)
    #[arg(short = 'p', long)]
    port: Option<u16>,

    /// Number of parallel workers, each sending the whole file
    #[arg(short = 'c', long = "conc", visible_alias = "concurrency")]
    conc: Option<usize>,

    /// Path to a TOML config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Print the final report as JSON
    #[arg(long)]
    json: bool,

    /// Print help
    #[arg(long, action = clap::ArgAction::Help)]
    help: Option<bool>,
}

/// Draw progress as a single overwritten line on `out` (stdout in the CLI).
///
/// Drawing stops for good once `out` rejects a write; events are still
/// drained so workers never block on the channel.
async fn render_progress<W: Write>(
    mut rx: mpsc::UnboundedReceiver<ProgressEvent>,
    workers: usize,
    quiet: bool,
    mut out: W,
) {
    let mut line = ProgressLine::new();
    let mut board = ProgressBoard::new();
    let mut drawing = !quiet;
    let mut drawn = false;

    while let Some(event) = rx.recv().await {
        if !drawing {
            continue;
        }
        let text = if workers == 1 {
            line.update(event.sent, event.total)
        } else {
            board.update(event)
        };
        if let Some(text) = text {
            if let Err(e) = write!(out, "\r{}", text).and_then(|_| out.flush()) {
                tracing::debug!(error = %e, "stdout unavailable, no longer drawing progress");
                drawing = false;
                continue;
            }
            drawn = true;
        }
    }

    if drawn && drawing {
        if let Err(e) = writeln!(out) {
            tracing::debug!(error = %e, "cannot end progress line");
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr; stdout carries progress and the report.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let overrides = Overrides {
        file: cli.file,
        host: cli.host,
        port: cli.port,
        concurrency: cli.conc,
        json: cli.json,
    };
    let (cfg, file) = Config::discover(cli.config.as_deref())?.merge(&overrides);
    let json = cfg.output.json;
    let config = cfg.into_transfer_config(file)?;

    let size = std::fs::metadata(&config.file_path)?.len();
    tracing::info!("file size: {} bytes ({})", size, human_size(size));
    tracing::info!("host/port: {}", config.target());

    let (tx, rx) = mpsc::unbounded_channel();
    let renderer = tokio::spawn(render_progress(rx, config.concurrency, json, std::io::stdout()));

    let canceller = Canceller::new();
    let on_interrupt = canceller.clone();
    let watcher = tokio::spawn(async move {
        let signals = interrupt::ctrl_c_signals();
        if interrupt::watch(signals, on_interrupt).await == Interrupt::ForceExit {
            std::process::exit(interrupt::INTERRUPTED_EXIT_CODE);
        }
    });

    let result = bench::run(&config, canceller, move |event| {
        let _ = tx.send(event);
    })
    .await;

    watcher.abort();
    renderer.await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        for outcome in &result.workers {
            println!("[f2t] {}", report::format_outcome(outcome));
        }
        println!("[f2t] {}", report::format_summary(&result));
    }

    if result.anomalies() > 0 {
        tracing::warn!(
            workers = result.anomalies(),
            "source ended before its recorded size; was the file truncated?"
        );
    }
    if !result.is_success() {
        anyhow::bail!(
            "{} of {} worker(s) failed",
            result.fatal_failures(),
            result.concurrency
        );
    }

    Ok(())
}
