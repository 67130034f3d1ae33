//! Responder errors
//!
//! Everything here is a start-up failure. Once serving, anomalies are
//! logged and the loop continues.

use j1939_uds::TransportError;
use thiserror::Error;

use crate::trace::TraceError;

#[derive(Debug, Error)]
pub enum ResponderError {
    #[error("Trace error: {0}")]
    Trace(#[from] TraceError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Fixture error: {0}")]
    Fixture(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}
