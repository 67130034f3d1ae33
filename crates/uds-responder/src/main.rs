//! Scripted ECU responder
//!
//! Replays a recorded UDS trace over J1939: every recorded tester request
//! is answered with the response that followed it in the recording.
//!
//! # Usage
//!
//! ```bash
//! ./uds-responder --trace recordings/engine.json --interface can0
//! ```
//!
//! With config file:
//! ```bash
//! ./uds-responder --config config/responder.toml
//! ```

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use j1939_uds::config::SocketCanConfig;
use j1939_uds::{create_transport, TransportConfig};
use tracing::{info, warn};

use uds_responder::{Fixtures, RecordedTrace, ResponderConfig, ResponseTable, ScriptedResponder};

#[derive(Parser, Debug)]
#[command(name = "uds-responder")]
#[command(about = "Replay a recorded UDS session as a scripted ECU on a J1939 bus")]
struct Args {
    /// Configuration file path (TOML format)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Recorded trace (JSON), overrides the config file
    #[arg(short, long)]
    trace: Option<PathBuf>,

    /// CAN interface name, selects SocketCAN
    #[arg(short, long)]
    interface: Option<String>,

    /// Do not answer request-PGN frames
    #[arg(long)]
    no_fixtures: bool,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = if args.verbose {
        "uds_responder=debug,j1939_uds=debug"
    } else {
        "uds_responder=info,j1939_uds=info"
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut config = if let Some(config_path) = &args.config {
        info!("Loading config from: {}", config_path.display());
        ResponderConfig::load(config_path)
            .map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?
    } else {
        ResponderConfig::default()
    };
    if let Some(trace) = args.trace {
        config.trace = Some(trace);
    }
    if let Some(interface) = args.interface {
        config.transport = TransportConfig::SocketCan(SocketCanConfig { interface });
    }
    if args.no_fixtures {
        config.fixtures.enabled = false;
    }

    let trace_path = config
        .trace
        .clone()
        .ok_or_else(|| anyhow::anyhow!("No trace given (--trace or `trace` in config)"))?;
    let trace = RecordedTrace::load(&trace_path)
        .map_err(|e| anyhow::anyhow!("Failed to load trace: {}", e))?;
    let table = ResponseTable::from_trace(&trace, config.tester_address)
        .map_err(|e| anyhow::anyhow!("Failed to build response table: {}", e))?;
    if table.is_empty() {
        warn!(
            trace = %trace_path.display(),
            "Trace holds no request/response pairs"
        );
    }
    let fixtures = if config.fixtures.enabled {
        Some(
            Fixtures::new(&config.fixtures)
                .map_err(|e| anyhow::anyhow!("Invalid fixtures: {}", e))?,
        )
    } else {
        None
    };

    info!(
        trace = %trace_path.display(),
        records = trace.len(),
        entries = table.len(),
        tester = format!("0x{:02X}", config.tester_address),
        "Response table ready"
    );

    let transport = create_transport(&config.transport)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to open transport: {}", e))?;

    let running = Arc::new(AtomicBool::new(true));
    let responder = ScriptedResponder::new(transport, table, fixtures, &config);
    let handle = responder.spawn(running.clone());

    info!("Responder ready - Press Ctrl+C to stop");
    tokio::signal::ctrl_c().await?;
    info!("Shutting down...");
    running.store(false, Ordering::SeqCst);

    match tokio::time::timeout(Duration::from_secs(2), handle).await {
        Ok(Ok(responder)) => info!(stats = ?responder.stats(), "Responder stopped"),
        Ok(Err(e)) => warn!(error = %e, "Responder task failed"),
        Err(_) => warn!("Responder did not stop in time"),
    }
    Ok(())
}
