//! # cellprobe
//!
//! Submit cellular radio measurements to a collector, queueing them on disk
//! whenever the collector cannot be reached.
//!
//! # Commands
//!
//! - `submit <capture.toml>` - normalize one capture and deliver it
//! - `drain` - retry everything in the queue, oldest first
//! - `queue` - list queued entries
//! - `simulate [--count N]` - submit synthetic LTE/NR captures
//!
//! # Exit Status
//!
//! - `0` - delivered (or command succeeded)
//! - `2` - not delivered now, safely queued for retry
//! - `1` - error, including a capture that could be neither sent nor queued
//!
//! # Examples
//!
//! ```bash
//! cellprobe --config cellprobe.toml submit capture.toml
//! RUST_LOG=cellprobe=debug cellprobe drain
//! cellprobe simulate --count 50 --interval-ms 0 --seed 7
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use cellprobe::config::{Config, LoggingConfig};
use cellprobe::delivery::{DeliveryEngine, SubmitOutcome};
use cellprobe::identity::IdentityHasher;
use cellprobe::measurement::{Capture, Normalizer};
use cellprobe::queue::DurableQueue;
use cellprobe::simulator::{self, Simulator};
use cellprobe::transport::HttpTransport;
use cellprobe::wire::Value;

/// Exit code for "queued for retry"
const EXIT_QUEUED: u8 = 2;

/// Log file name prefix inside `[logging].log_dir`
const LOG_FILE_PREFIX: &str = "cellprobe.log";

#[derive(Debug, Parser)]
#[command(name = "cellprobe", version, about = "Store-and-forward delivery of radio measurements")]
struct Cli {
    /// Configuration file (defaults apply when omitted)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Normalize a capture file and deliver it
    Submit {
        /// TOML capture: [radio], optional [position], [device]
        capture: PathBuf,
    },
    /// Retry queued measurements, oldest first
    Drain,
    /// List queued measurements
    Queue,
    /// Submit synthetic captures around the default coordinate
    Simulate {
        /// Number of captures to submit
        #[arg(long, default_value_t = 200)]
        count: usize,

        /// Pause between captures
        #[arg(long, default_value_t = 50)]
        interval_ms: u64,

        /// Seed for a reproducible run
        #[arg(long)]
        seed: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => Config::default(),
    };
    let _log_guard = init_logging(&config.logging);

    info!("cellprobe v{} starting...", env!("CARGO_PKG_VERSION"));

    let queue = Arc::new(DurableQueue::open(&config.queue.dir).await?);
    let transport = HttpTransport::new(
        &config.endpoint.base_url,
        config.endpoint.api_key(),
        config.endpoint.timeout(),
    )?;
    let normalizer = Normalizer::new(IdentityHasher::new(config.identity.salt.clone()));
    let engine = DeliveryEngine::new(transport, queue, normalizer, config.endpoint.timeout());

    match cli.command {
        Command::Submit { capture } => submit(&engine, &capture).await,
        Command::Drain => {
            let report = engine.drain().await?;
            println!("delivered {}, remaining {}", report.delivered, report.remaining);
            Ok(ExitCode::SUCCESS)
        }
        Command::Queue => {
            list_queue(engine.queue()).await?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Simulate { count, interval_ms, seed } => {
            let mut sim = match seed {
                Some(seed) => Simulator::seeded(seed),
                None => Simulator::from_entropy(),
            };
            let report = simulator::run(&engine, &mut sim, count, Duration::from_millis(interval_ms))
                .await
                .context("simulated measurement could be neither sent nor queued")?;
            println!("delivered {}, queued {}", report.delivered, report.queued);
            Ok(if report.queued > 0 { ExitCode::from(EXIT_QUEUED) } else { ExitCode::SUCCESS })
        }
    }
}

async fn submit(engine: &DeliveryEngine<HttpTransport>, path: &Path) -> Result<ExitCode> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("reading capture {}", path.display()))?;
    let capture: Capture = toml::from_str(&text)
        .with_context(|| format!("parsing capture {}", path.display()))?;

    match engine
        .submit(&capture.radio, capture.position, &capture.device)
        .await
    {
        SubmitOutcome::Delivered => {
            println!("delivered");
            Ok(ExitCode::SUCCESS)
        }
        SubmitOutcome::QueuedForRetry { entry, reason } => {
            println!("queued for retry as {} ({})", entry, reason);
            Ok(ExitCode::from(EXIT_QUEUED))
        }
        SubmitOutcome::HardFailure(e) => {
            Err(anyhow::Error::new(e).context("measurement could be neither sent nor queued"))
        }
    }
}

async fn list_queue(queue: &DurableQueue) -> Result<()> {
    let entries = queue.entries().await?;
    for entry in &entries {
        let summary = match entry.decode() {
            Ok(value) => format!(
                "{} {}",
                value.get("ts").and_then(Value::as_str).unwrap_or("-"),
                value.get("tech").and_then(Value::as_str).unwrap_or("-"),
            ),
            Err(e) => format!("undecodable ({})", e),
        };
        println!("{}  {:>6} B  {}", entry.sequence_key, entry.payload.len(), summary);
    }
    println!("{} queued", entries.len());
    Ok(())
}

/// Install the tracing subscriber
///
/// `RUST_LOG` overrides the configured level. With a `log_dir`, output is
/// also written to a daily rolling file; the returned guard flushes it on drop.
fn init_logging(config: &LoggingConfig) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.level));

    let (file_layer, guard) = if config.log_dir.is_empty() {
        (None, None)
    } else {
        let appender = tracing_appender::rolling::daily(&config.log_dir, LOG_FILE_PREFIX);
        let (writer, guard) = tracing_appender::non_blocking(appender);
        (Some(fmt::layer().with_ansi(false).with_writer(writer)), Some(guard))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();

    guard
}
