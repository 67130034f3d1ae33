//! Read command - ReadDataByIdentifier with retries

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use j1939_uds::{
    create_transport, ComponentRegistry, IsoTpDriver, J1939UdsConfig, RequestCorrelator,
    SourceNames, UdsMessage,
};

use crate::output::{FieldRow, MessageRow, OutputContext};

pub async fn read_did(
    config: &J1939UdsConfig,
    did: u16,
    destination: u8,
    timeout_ms: Option<u64>,
    retries: Option<u32>,
    ctx: &OutputContext,
) -> Result<()> {
    let mut correlator_config = config.correlator.clone();
    if let Some(timeout_ms) = timeout_ms {
        correlator_config.timeout_ms = timeout_ms;
    }
    if let Some(retries) = retries {
        correlator_config.retries = retries;
    }

    let source_names = Arc::new(
        SourceNames::with_overrides(&config.source_names).context("Invalid source names")?,
    );
    let transport = create_transport(&config.transport)
        .await
        .context("Failed to open transport")?;
    let driver = IsoTpDriver::new(transport, &config.driver, source_names.clone());
    let mut correlator =
        RequestCorrelator::new(driver, ComponentRegistry::new(), &correlator_config);

    let response = correlator
        .read_data_by_identifier_message(
            &did.to_be_bytes(),
            destination,
            Duration::from_millis(correlator_config.timeout_ms),
        )
        .await
        .context("Request failed")?;

    let Some(response) = response else {
        anyhow::bail!(
            "No response to DID 0x{:04X} from 0x{:02X} after {} attempts",
            did,
            destination,
            correlator_config.retries
        );
    };

    if let Some(message) = UdsMessage::from_payload(
        response.source,
        source_names.name(response.source),
        response.destination,
        &response.data,
    ) {
        ctx.print(&[MessageRow::new(1, &message)]);
    }

    let fields: Vec<FieldRow> = correlator
        .registry()
        .snapshot()
        .into_iter()
        .flat_map(|(component, fields)| {
            fields.into_iter().map(move |(field, value)| FieldRow {
                component: component.clone(),
                field,
                value,
            })
        })
        .collect();
    if !fields.is_empty() {
        ctx.print(&fields);
    }
    Ok(())
}
