//! Request/response correlation with retry and timeout
//!
//! A response matches a request when it arrives on PGN 0xDA00 and its SID is
//! the request SID with the positive-response bit set. Running out of
//! attempts is not an error: the exchange yields `Ok(None)`.

use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info};

use crate::config::CorrelatorConfig;
use crate::driver::{IsoTpDriver, ReceivedMessage};
use crate::frame::{FRAME_LEN, SINGLE_FRAME_MAX};
use crate::j1939::ISO_PGN;
use crate::registry::{field, ComponentRegistry};
use crate::uds::{is_positive_response, printable_chars, service_id, standard_did};
use crate::{Error, Result};

pub struct RequestCorrelator {
    driver: IsoTpDriver,
    registry: ComponentRegistry,
    config: CorrelatorConfig,
}

impl RequestCorrelator {
    pub fn new(
        driver: IsoTpDriver,
        registry: ComponentRegistry,
        config: &CorrelatorConfig,
    ) -> Self {
        Self {
            driver,
            registry,
            config: config.clone(),
        }
    }

    pub fn driver(&self) -> &IsoTpDriver {
        &self.driver
    }

    pub fn registry(&self) -> &ComponentRegistry {
        &self.registry
    }

    pub fn into_driver(self) -> IsoTpDriver {
        self.driver
    }

    /// Send a single-frame ReadDataByIdentifier request and await its response
    ///
    /// `param_bytes` is everything following SID 0x22, normally a 2-byte DID.
    /// The frame is zero-padded to 8 bytes.
    pub async fn read_data_by_identifier(
        &mut self,
        param_bytes: &[u8],
        destination: u8,
        timeout: Duration,
    ) -> Result<Option<Vec<u8>>> {
        let response = self
            .read_data_by_identifier_message(param_bytes, destination, timeout)
            .await?;
        Ok(response.map(|message| message.data))
    }

    /// [`Self::read_data_by_identifier`], keeping the responder's addressing
    ///
    /// A request sent to the global address is answered by a specific node;
    /// the returned message carries its source.
    pub async fn read_data_by_identifier_message(
        &mut self,
        param_bytes: &[u8],
        destination: u8,
        timeout: Duration,
    ) -> Result<Option<ReceivedMessage>> {
        let request = build_single_frame_request(service_id::READ_DATA_BY_ID, param_bytes)?;
        let retries = self.config.retries;
        self.exchange(&request, destination, timeout, retries).await
    }

    /// Send framed `request` and poll for a matching response
    ///
    /// `request` is raw single-frame data, so its SID is `request[1]`. Each
    /// attempt re-sends the request and gets a fresh deadline.
    pub async fn exchange(
        &mut self,
        request: &[u8],
        destination: u8,
        timeout: Duration,
        retries: u32,
    ) -> Result<Option<ReceivedMessage>> {
        let request_sid = *request.get(1).ok_or(Error::InvalidRequest(request.len()))?;
        let poll_interval = self.driver.config().poll_interval();

        for attempt in 1..=retries.max(1) {
            self.driver.send_message(request, destination).await?;
            let deadline = Instant::now() + timeout;

            while Instant::now() < deadline {
                match self.driver.read_message().await {
                    Some(message) if is_match(request_sid, &message) => {
                        self.publish(&message);
                        return Ok(Some(message));
                    }
                    Some(message) => {
                        debug!(
                            source = format!("0x{:02X}", message.source),
                            sid = ?message.sid(),
                            "Ignoring non-matching message"
                        );
                        tokio::task::yield_now().await;
                    }
                    None => tokio::time::sleep(poll_interval).await,
                }
            }

            debug!(
                attempt,
                retries,
                destination = format!("0x{:02X}", destination),
                sid = format!("0x{:02X}", request_sid),
                "No response before deadline"
            );
        }

        info!(
            destination = format!("0x{:02X}", destination),
            sid = format!("0x{:02X}", request_sid),
            "No response after all attempts"
        );
        Ok(None)
    }

    /// Write decoded identification fields for the responding node
    fn publish(&self, message: &ReceivedMessage) {
        let data = &message.data;
        if data.len() < 3 || data[0] != service_id::READ_DATA_BY_ID_RESPONSE {
            return;
        }
        let did = u16::from_be_bytes([data[1], data[2]]);
        let value = &data[3..];

        let (field, text) = match did {
            standard_did::VIN => (field::VIN, printable_chars(value)),
            standard_did::ECU_SERIAL_NUMBER => (field::ECU_SERIAL_NUMBER, printable_chars(value)),
            standard_did::SUPPLIER_SW_VERSION => {
                (field::ECU_SOFTWARE_VERSION, decimal_bytes(value))
            }
            standard_did::SUPPLIER_HW_VERSION => {
                (field::ECU_HARDWARE_VERSION, decimal_bytes(value))
            }
            _ => return,
        };

        let component = format!(
            "{} on J1939",
            self.driver.source_names().name(message.source)
        );
        debug!(component = %component, field, value = %text, "Registry updated");
        self.registry.update(&component, field, text);
    }
}

fn is_match(request_sid: u8, message: &ReceivedMessage) -> bool {
    message.pgn == ISO_PGN
        && message
            .sid()
            .is_some_and(|sid| is_positive_response(request_sid, sid))
}

/// `[len, sid, params..]` zero-padded to a full frame
fn build_single_frame_request(sid: u8, params: &[u8]) -> Result<[u8; FRAME_LEN]> {
    let length = params.len() + 1;
    if length > SINGLE_FRAME_MAX {
        return Err(Error::InvalidRequest(length));
    }
    let mut request = [0u8; FRAME_LEN];
    request[0] = length as u8;
    request[1] = sid;
    request[2..2 + params.len()].copy_from_slice(params);
    Ok(request)
}

fn decimal_bytes(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| b.to_string())
        .collect::<Vec<_>>()
        .join(" ")
}
