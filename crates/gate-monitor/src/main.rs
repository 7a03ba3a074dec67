//! Gate Monitor
//!
//! Replays recorded portfolio snapshots through the trade gate and prints
//! one JSON decision per line, followed by the breaker status and recent trips.

mod input;
mod replay;

use anyhow::Result;
use clap::Parser;
use gate_core::GateConfig;
use recovery::RetryPolicy;
use std::io::Write;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "gate-monitor")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file (TOML or JSON); `GATE__*` env vars override it
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// JSON-lines snapshot file; reads stdin when omitted
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Number of recent trips to report
    #[arg(long, default_value_t = 10)]
    history: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr; stdout carries decisions
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gate_monitor=info,risk_manager=info,recovery=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    info!("Starting Gate Monitor");

    let config = GateConfig::load(cli.config.as_deref())?;
    let policy = RetryPolicy::try_from(&config.retry)?;

    let text = input::read_input(cli.input.as_deref(), &policy).await?;
    let snapshots = replay::parse_snapshots(&text)?;
    info!(count = snapshots.len(), "Loaded snapshots");

    let start = snapshots
        .first()
        .map(|s| s.timestamp)
        .unwrap_or_else(chrono::Utc::now);
    let mut replay = replay::Replay::new(&config, start)?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    for snapshot in snapshots {
        let event = replay.apply(snapshot).await?;
        writeln!(out, "{}", serde_json::to_string(&event)?)?;
    }

    let summary = replay.summary(cli.history).await;
    writeln!(out, "{}", serde_json::to_string_pretty(&summary)?)?;

    info!(
        processed = summary.processed,
        approved = summary.approved,
        rejected = summary.rejected,
        "Replay complete"
    );

    Ok(())
}
