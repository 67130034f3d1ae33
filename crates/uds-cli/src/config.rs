//! Configuration file handling for uds-cli

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use j1939_uds::config::SocketCanConfig;
use j1939_uds::{J1939UdsConfig, TransportConfig};

/// Load the node configuration
///
/// An explicit path must exist. Without one, the default config file is
/// used when present, else built-in defaults (SocketCAN on `can0`).
pub fn load(path: Option<&Path>) -> Result<J1939UdsConfig> {
    if let Some(path) = path {
        return J1939UdsConfig::load(path)
            .with_context(|| format!("Failed to load config file: {}", path.display()));
    }

    match config_path() {
        Some(default) if default.exists() => J1939UdsConfig::load(&default)
            .with_context(|| format!("Failed to load config file: {}", default.display())),
        _ => Ok(J1939UdsConfig {
            transport: TransportConfig::SocketCan(SocketCanConfig {
                interface: "can0".to_string(),
            }),
            ..Default::default()
        }),
    }
}

/// Default config file path (`<config dir>/uds-cli/config.toml`)
pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("uds-cli").join("config.toml"))
}

/// Apply command-line overrides
pub fn merge_with_args(
    mut config: J1939UdsConfig,
    interface: Option<&str>,
    tester: Option<u8>,
) -> J1939UdsConfig {
    if let Some(interface) = interface {
        config.transport = TransportConfig::SocketCan(SocketCanConfig {
            interface: interface.to_string(),
        });
    }
    if let Some(tester) = tester {
        config.driver.tester_address = tester;
    }
    config
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interface_override_selects_socketcan() {
        let config = merge_with_args(J1939UdsConfig::default(), Some("vcan0"), Some(0xFA));
        match config.transport {
            TransportConfig::SocketCan(cfg) => assert_eq!(cfg.interface, "vcan0"),
            other => panic!("unexpected transport {:?}", other),
        }
        assert_eq!(config.driver.tester_address, 0xFA);
    }

    #[test]
    fn test_missing_explicit_config_is_an_error() {
        assert!(load(Some(Path::new("/nonexistent/uds-cli.toml"))).is_err());
    }
}
