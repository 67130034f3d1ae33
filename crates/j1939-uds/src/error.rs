//! Crate-level errors

use thiserror::Error;

use crate::transport::TransportError;

#[derive(Debug, Error)]
pub enum Error {
    /// Transport error (CAN bus issues)
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Request too short to carry a SID, or too long for a single frame
    #[error("Invalid request length: {0}")]
    InvalidRequest(usize),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
