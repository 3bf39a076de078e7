use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, EnvFilter};

use framehist::clock::MonotonicClock;
use framehist::collector::HistogramCollector;
use framehist::config::{Config, SourceKind};
use framehist::ring::Ringbuffer;
use framehist::source::{FrameSource, SyntheticSource};

/// Display histogram sampling agent.
#[derive(Parser)]
#[command(name = "framehist", about)]
struct Cli {
    /// Path to the YAML configuration file (defaults apply when omitted).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Logging verbosity level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Print version information and exit.
    Version,
}

/// Build-time version info, injected via RUSTFLAGS or build.rs.
mod version {
    /// Release version string (set at build time).
    pub const RELEASE: &str = env!("CARGO_PKG_VERSION");

    /// Git commit hash (set at build time via env, or "unknown").
    pub fn git_commit() -> &'static str {
        option_env!("GIT_COMMIT").unwrap_or("unknown")
    }

    /// Full version string with platform info.
    pub fn full() -> String {
        format!(
            "{} (commit: {}, {}/{})",
            RELEASE,
            git_commit(),
            std::env::consts::OS,
            std::env::consts::ARCH,
        )
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Handle version subcommand before anything else.
    if let Some(Command::Version) = &cli.command {
        println!("framehist {}", version::full());
        return Ok(());
    }

    // Initialize tracing.
    let filter = EnvFilter::try_new(&cli.log_level)
        .with_context(|| format!("invalid log level: {}", cli.log_level))?;

    fmt().with_env_filter(filter).with_target(true).init();

    let cfg = match &cli.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => Config::default(),
    };

    tracing::info!(
        version = version::RELEASE,
        commit = version::git_commit(),
        "starting framehist",
    );

    // Build and run the tokio runtime.
    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("building tokio runtime")?;

    rt.block_on(async { run(cfg).await })
}

async fn run(cfg: Config) -> Result<()> {
    // Set up signal handling.
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to register SIGTERM handler");

        tokio::select! {
            _ = ctrl_c => {
                tracing::info!("received SIGINT, shutting down");
            }
            _ = sigterm.recv() => {
                tracing::info!("received SIGTERM, shutting down");
            }
        }

        let _ = shutdown_tx.send(());
    });

    let ring = Arc::new(
        Ringbuffer::new(cfg.sampling.ring_capacity, Box::new(MonotonicClock::new()))
            .context("creating ringbuffer")?,
    );

    let source = build_source(&cfg);
    tracing::info!(
        source = source.name(),
        capacity = cfg.sampling.ring_capacity,
        interval_ms = cfg.sampling.interval.as_millis() as u64,
        "frame source configured",
    );

    let collector = Arc::new(HistogramCollector::new(
        Arc::clone(&ring),
        source,
        cfg.sampling.interval,
    ));
    collector.start().await;

    let cancel = CancellationToken::new();
    spawn_dump_reporter(Arc::clone(&collector), cancel.child_token());

    // Wait for shutdown signal.
    let _ = shutdown_rx.await;

    // Graceful shutdown.
    cancel.cancel();
    collector.stop().await;

    tracing::info!(state = %collector.dump(), "framehist stopped");

    Ok(())
}

/// Instantiate the configured frame source backend.
fn build_source(cfg: &Config) -> Box<dyn FrameSource> {
    match cfg.source.kind {
        SourceKind::Synthetic => Box::new(SyntheticSource::new(cfg.source.synthetic_pixels)),
    }
}

/// Spawn a background task logging the aggregator state once a minute.
fn spawn_dump_reporter(collector: Arc<HistogramCollector>, cancel: CancellationToken) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(60));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = ticker.tick() => {
                    tracing::info!(state = %collector.dump(), "aggregator state");
                }
            }
        }
    });
}
