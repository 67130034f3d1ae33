//! Scripted responder configuration
//!
//! Loaded from TOML; every field has a default so only the trace path is
//! normally given.

use std::path::{Path, PathBuf};
use std::time::Duration;

use j1939_uds::config::DEFAULT_TESTER_ADDRESS;
use j1939_uds::TransportConfig;
use serde::{Deserialize, Serialize};

use crate::error::ResponderError;

/// Complete responder configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponderConfig {
    /// Recorded trace to replay
    #[serde(default)]
    pub trace: Option<PathBuf>,

    /// Source address of the tester whose requests the trace recorded
    #[serde(default = "default_tester_address")]
    pub tester_address: u8,

    /// Time to wait for flow control after a First frame or a full block
    #[serde(default = "default_ack_timeout_ms")]
    pub ack_timeout_ms: u64,

    /// Minimum delay between frames of one response
    #[serde(default = "default_inter_frame_delay_ms")]
    pub inter_frame_delay_ms: u64,

    /// Sleep between polls of an empty inbound queue
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Time an incomplete multi-frame request may wait for its next frame
    #[serde(default = "default_session_timeout_ms")]
    pub session_timeout_ms: u64,

    #[serde(default)]
    pub fixtures: FixtureConfig,

    #[serde(default)]
    pub transport: TransportConfig,
}

fn default_tester_address() -> u8 {
    DEFAULT_TESTER_ADDRESS
}

fn default_ack_timeout_ms() -> u64 {
    50
}

fn default_inter_frame_delay_ms() -> u64 {
    1
}

fn default_poll_interval_ms() -> u64 {
    10
}

fn default_session_timeout_ms() -> u64 {
    1000
}

impl Default for ResponderConfig {
    fn default() -> Self {
        Self {
            trace: None,
            tester_address: default_tester_address(),
            ack_timeout_ms: default_ack_timeout_ms(),
            inter_frame_delay_ms: default_inter_frame_delay_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            session_timeout_ms: default_session_timeout_ms(),
            fixtures: FixtureConfig::default(),
            transport: TransportConfig::default(),
        }
    }
}

impl ResponderConfig {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ResponderError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn ack_timeout(&self) -> Duration {
        Duration::from_millis(self.ack_timeout_ms)
    }

    pub fn inter_frame_delay(&self) -> Duration {
        Duration::from_millis(self.inter_frame_delay_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn session_timeout(&self) -> Duration {
        Duration::from_millis(self.session_timeout_ms)
    }
}

// =============================================================================
// Fixture Configuration
// =============================================================================

/// Fixed answers to J1939 request-PGN frames
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixtureConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Source address used when a request is sent to the global address
    #[serde(default)]
    pub ecu_address: u8,

    /// Vehicle identification answer (PGN 0xFEEC), sent over J1939 TP
    #[serde(default = "default_vin")]
    pub vin: String,

    /// Address-claimed NAME (PGN 0xEE00), 8 bytes
    #[serde(
        default = "default_name",
        deserialize_with = "deserialize_hex_bytes_vec"
    )]
    pub name: Vec<u8>,

    /// Number of address-claimed transmissions per request
    #[serde(default = "default_claim_repeats")]
    pub claim_repeats: u32,
}

fn default_enabled() -> bool {
    true
}

fn default_vin() -> String {
    "1XPXDP9X7JD480090*".to_string()
}

fn default_name() -> Vec<u8> {
    vec![0xF7, 0x02, 0xA1, 0x01, 0x00, 0x00, 0x00, 0x10]
}

fn default_claim_repeats() -> u32 {
    10
}

impl Default for FixtureConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            ecu_address: 0x00,
            vin: default_vin(),
            name: default_name(),
            claim_repeats: default_claim_repeats(),
        }
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Deserialize hex bytes ("F7 02 A1 01", "f702a101") or a byte array
fn deserialize_hex_bytes_vec<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::Error;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum HexBytes {
        Hex(String),
        Array(Vec<u8>),
    }

    match HexBytes::deserialize(deserializer)? {
        HexBytes::Array(arr) => Ok(arr),
        HexBytes::Hex(s) => parse_hex_bytes(&s).map_err(|e| D::Error::custom(e.to_string())),
    }
}

/// Parse hex ignoring whitespace and an optional `0x` prefix
pub fn parse_hex_bytes(s: &str) -> Result<Vec<u8>, hex::FromHexError> {
    let s = s.trim();
    let s = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);
    let compact: String = s.chars().filter(|c| !c.is_whitespace()).collect();
    hex::decode(compact)
}
