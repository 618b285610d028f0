//! Runs the controller against the loopback routing engine and the in-memory
//! database. Triggers are read from stdin, one JSON object per line; each
//! job report is written to stdout as one JSON line.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use routing_controller::logging::{init_tracing, LogFormat};
use routing_controller::routing::LoopbackRouting;
use routing_controller::volume_store::VolumeSnapshot;
use routing_controller::{spawn, Controller, Settings};
use routing_core::{InMemoryDatabase, SystemClock, Trigger};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing::{info, warn};

#[derive(Debug, Parser)]
#[command(name = "routing-controller")]
#[command(about = "Policy-driven audio routing controller")]
struct Cli {
    /// Settings file (JSON). Defaults apply when omitted.
    #[arg(long, env = "ROUTING_CONFIG")]
    config: Option<PathBuf>,

    /// Overrides the volume snapshot path from the settings file.
    #[arg(long)]
    volume_store: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = LogFormat::Pretty)]
    log_format: LogFormat,

    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format, &cli.log_level)?;

    let mut settings = match &cli.config {
        Some(path) => Settings::load(path)?,
        None => Settings::default(),
    };
    if let Some(path) = cli.volume_store {
        settings.controller.volume_store_path = Some(path);
    }
    let snapshot = match &settings.controller.volume_store_path {
        Some(path) => VolumeSnapshot::load(path)?,
        None => VolumeSnapshot::default(),
    };

    let (tx, rx) = mpsc::unbounded_channel();
    let mut controller = Controller::new(
        &settings,
        Box::new(InMemoryDatabase::new()),
        Box::new(LoopbackRouting::new(tx.clone())),
        Arc::new(SystemClock),
    )
    .context("initialising controller")?;
    controller.elements_mut().set_volumes(snapshot);
    let (mut worker, handle) = spawn(controller, tx, rx);
    info!(policies = settings.policy.policies.len(), "controller running");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted");
                break;
            }
        };
        let Some(line) = line else { break };
        if line.trim().is_empty() {
            continue;
        }
        let trigger: Trigger = match serde_json::from_str(&line) {
            Ok(trigger) => trigger,
            Err(err) => {
                warn!(%err, "ignoring malformed trigger");
                continue;
            }
        };
        let report = handle.trigger(trigger).await?;
        let mut out = serde_json::to_vec(&report)?;
        out.push(b'\n');
        stdout.write_all(&out).await?;
        stdout.flush().await?;
    }

    worker.stop().await;
    Ok(())
}
