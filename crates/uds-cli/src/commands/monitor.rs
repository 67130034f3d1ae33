//! Monitor command - passive decode of UDS traffic

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use j1939_uds::{create_transport, IsoTpDriver, J1939UdsConfig, SourceNames};
use tracing::debug;

use crate::output::{MessageRow, OutputContext, OutputFormat};

const DISPLAY_INTERVAL: Duration = Duration::from_millis(200);

/// Observe the bus until Ctrl+C or `duration`, optionally saving the trace
pub async fn monitor(
    config: &J1939UdsConfig,
    record: Option<&Path>,
    duration: Option<u64>,
    ctx: &OutputContext,
) -> Result<()> {
    let source_names = Arc::new(
        SourceNames::with_overrides(&config.source_names).context("Invalid source names")?,
    );
    let transport = create_transport(&config.transport)
        .await
        .context("Failed to open transport")?;
    let driver = IsoTpDriver::passive(transport, &config.driver, source_names);
    let log = driver
        .log()
        .context("Passive driver has no message log")?;

    let running = Arc::new(AtomicBool::new(true));
    let handle = driver.spawn_monitor(running.clone());
    ctx.info("Monitoring - Press Ctrl+C to stop");

    let deadline = async {
        match duration {
            Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
            None => std::future::pending().await,
        }
    };
    tokio::pin!(deadline);

    let mut shown = 0u64;
    let mut ticker = tokio::time::interval(DISPLAY_INTERVAL);
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = &mut deadline => break,
            _ = ticker.tick() => {
                if ctx.format == OutputFormat::Table {
                    shown = print_new(&log.read(), shown, ctx);
                }
            }
        }
    }

    running.store(false, Ordering::SeqCst);
    let driver = handle.await.context("Monitor task failed")?;
    let stats = driver.stats();
    debug!(stats = ?stats, "Monitor stopped");
    if stats.lagged_frames > 0 || stats.malformed_frames > 0 {
        ctx.warn(&format!(
            "{} frames lost, {} malformed frames dropped",
            stats.lagged_frames, stats.malformed_frames
        ));
    }

    let log = log.read();
    match ctx.format {
        OutputFormat::Table => {
            print_new(&log, shown, ctx);
        }
        OutputFormat::Json => println!("{}", log.to_json()?),
    }

    if let Some(path) = record {
        log.save(path)
            .with_context(|| format!("Failed to save trace: {}", path.display()))?;
        ctx.success(&format!(
            "Recorded {} messages to {}",
            log.len(),
            path.display()
        ));
    } else {
        ctx.success(&format!("{} messages", log.len()));
    }
    Ok(())
}

/// Print messages after index `shown`; returns the last index printed
fn print_new(log: &j1939_uds::UdsMessageLog, shown: u64, ctx: &OutputContext) -> u64 {
    let rows: Vec<MessageRow> = log
        .since(shown)
        .map(|(index, message)| MessageRow::new(index, message))
        .collect();
    let Some(last) = rows.last().map(|row| row.index) else {
        return shown;
    };
    ctx.print(&rows);
    last
}
