//! Gauntlet worker process.
//!
//! Hosts one execution engine and speaks its protocol over stdio: requests
//! arrive as one JSON object per line on stdin, events leave as one JSON
//! object per line on stdout, and diagnostics go to stderr so the protocol
//! stream stays clean. EOF on stdin ends the worker.

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use gauntlet_engine::{boot, EngineConfig, Event, ProtocolHandler};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

/// Gauntlet execution worker.
///
/// The host platform spawns one worker per challenge session, writes
/// execution requests to stdin, and renders the event stream from stdout.
/// Requests are serviced strictly one at a time; the host must wait for a
/// request's terminal `completed` event before sending the next. A wedged
/// worker (non-cooperative infinite loop in user code) is recovered by
/// killing and respawning the process.
///
/// EXAMPLES:
///     gauntlet-worker                          Serve with defaults
///     gauntlet-worker --timeout-ms 2000        Tighter execution budget
///     gauntlet-worker --config engine.toml     Load deny-lists from a file
///
/// ENVIRONMENT VARIABLES:
///     GAUNTLET_TIMEOUT_MS   Same as --timeout-ms
///     RUST_LOG              Log filter for stderr diagnostics
#[derive(Parser)]
#[command(name = "gauntlet-worker")]
#[command(version)]
struct Cli {
    /// Path to an engine configuration file (TOML)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the wall-clock execution budget in milliseconds
    #[arg(long, env = "GAUNTLET_TIMEOUT_MS")]
    timeout_ms: Option<u64>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => EngineConfig::load_from_file(path)?,
        None => EngineConfig::default(),
    };
    if let Some(timeout_ms) = cli.timeout_ms {
        config.timeout_ms = timeout_ms;
        config.validate()?;
    }

    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let writer = tokio::spawn(write_events(events_rx));

    let mut handler = ProtocolHandler::new(events_tx.clone());
    let mut booting = tokio::spawn(boot(config, events_tx));
    let mut boot_pending = true;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            outcome = &mut booting, if boot_pending => {
                boot_pending = false;
                match outcome {
                    Ok(Ok((coordinator, report))) => {
                        handler.make_ready(coordinator, report.harness_names);
                    }
                    // boot() already emitted the fatal event; the handler
                    // stays not-ready and keeps rejecting requests.
                    Ok(Err(error)) => tracing::error!(%error, "engine failed to initialize"),
                    Err(join_error) => tracing::error!(%join_error, "bootstrap task failed"),
                }
            }
            line = lines.next_line() => {
                match line? {
                    Some(frame) if frame.trim().is_empty() => {}
                    Some(frame) => handler.dispatch(&frame).await,
                    None => break,
                }
            }
        }
    }

    // Dropping the handler tears down the coordinator and the interpreter's
    // job channel; once the interpreter thread exits, the event channel
    // closes and the writer drains whatever is left.
    drop(handler);
    if boot_pending {
        booting.abort();
        let _ = booting.await;
    }
    writer.await??;
    Ok(())
}

async fn write_events(mut events: mpsc::UnboundedReceiver<Event>) -> Result<()> {
    let mut stdout = tokio::io::stdout();
    while let Some(event) = events.recv().await {
        let mut frame = serde_json::to_vec(&event)?;
        frame.push(b'\n');
        stdout.write_all(&frame).await?;
        stdout.flush().await?;
    }
    Ok(())
}
