//! Session command - open a default diagnostic session

use std::sync::Arc;

use anyhow::{Context, Result};
use j1939_uds::{create_transport, IsoTpDriver, J1939UdsConfig, SourceNames};

use crate::output::OutputContext;

pub async fn session(config: &J1939UdsConfig, destination: u8, ctx: &OutputContext) -> Result<()> {
    let transport = create_transport(&config.transport)
        .await
        .context("Failed to open transport")?;
    let driver = IsoTpDriver::new(transport, &config.driver, Arc::new(SourceNames::new()));
    driver
        .init_session(destination)
        .await
        .context("Failed to send session request")?;

    ctx.success(&format!(
        "Default session requested at 0x{:02X} (positive response suppressed)",
        destination
    ));
    Ok(())
}
