//! Driver, correlator and transport configuration
//!
//! Every section has defaults, so an empty TOML file is a valid
//! configuration.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::j1939::DEFAULT_PRIORITY;
use crate::Result;

/// Source address of the off-board diagnostic tool (this node)
pub const DEFAULT_TESTER_ADDRESS: u8 = 0xF9;

/// Complete configuration for a J1939 UDS node
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct J1939UdsConfig {
    #[serde(default)]
    pub transport: TransportConfig,
    #[serde(default)]
    pub driver: DriverConfig,
    #[serde(default)]
    pub correlator: CorrelatorConfig,
    /// Extra or overriding source-address names, keyed by address
    /// (decimal or `0x` hex)
    #[serde(default)]
    pub source_names: HashMap<String, String>,
}

impl J1939UdsConfig {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }
}

// =============================================================================
// Transport Configuration
// =============================================================================

/// Transport configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TransportConfig {
    /// Raw SocketCAN with 29-bit identifiers (Linux only)
    SocketCan(SocketCanConfig),
    /// In-memory transport for testing
    Mock(MockConfig),
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self::Mock(MockConfig::default())
    }
}

/// SocketCAN configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SocketCanConfig {
    /// CAN interface name (e.g., "can0")
    #[serde(default = "default_interface")]
    pub interface: String,
}

fn default_interface() -> String {
    "can0".to_string()
}

impl Default for SocketCanConfig {
    fn default() -> Self {
        Self {
            interface: default_interface(),
        }
    }
}

/// Mock transport configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MockConfig {
    /// Simulated send latency in milliseconds
    #[serde(default)]
    pub latency_ms: u64,
    /// Answer every sent First frame with a continue-to-send flow control
    #[serde(default)]
    pub auto_flow_control: bool,
}

// =============================================================================
// Driver / Correlator Configuration
// =============================================================================

/// Receive driver configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverConfig {
    /// Our own source address
    #[serde(default = "default_tester_address")]
    pub tester_address: u8,
    /// J1939 priority of sent frames
    #[serde(default = "default_priority")]
    pub priority: u8,
    /// Time an incomplete reassembly may wait for its next frame
    #[serde(default = "default_session_timeout_ms")]
    pub session_timeout_ms: u64,
    /// Sleep between polls of an empty inbound queue
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_tester_address() -> u8 {
    DEFAULT_TESTER_ADDRESS
}

fn default_priority() -> u8 {
    DEFAULT_PRIORITY
}

fn default_session_timeout_ms() -> u64 {
    1000
}

fn default_poll_interval_ms() -> u64 {
    1
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            tester_address: default_tester_address(),
            priority: default_priority(),
            session_timeout_ms: default_session_timeout_ms(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl DriverConfig {
    pub fn session_timeout(&self) -> Duration {
        Duration::from_millis(self.session_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Request/response correlation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrelatorConfig {
    /// Deadline for each attempt in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Number of attempts before giving up
    #[serde(default = "default_retries")]
    pub retries: u32,
}

fn default_timeout_ms() -> u64 {
    500
}

fn default_retries() -> u32 {
    3
}

impl Default for CorrelatorConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            retries: default_retries(),
        }
    }
}

impl CorrelatorConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Parse an address written as decimal or `0x` hex
pub fn parse_address(s: &str) -> Option<u8> {
    let s = s.trim();
    match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u8::from_str_radix(hex, 16).ok(),
        None => s.parse().ok(),
    }
}
