//! Shared component registry and J1939 source-address names

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::config::parse_address;
use crate::{Error, Result};

/// Field names written by the request correlator
pub mod field {
    pub const VIN: &str = "VIN from ISO";
    pub const ECU_SERIAL_NUMBER: &str = "ECU Serial Number from ISO";
    pub const ECU_SOFTWARE_VERSION: &str = "ECU Software Version from ISO";
    pub const ECU_HARDWARE_VERSION: &str = "ECU Hardware Version from ISO";
}

/// Name returned for addresses missing from the table
pub const UNKNOWN_SOURCE: &str = "Unknown";

/// Preferred source addresses (SAE J1939 Appendix B, Table B2)
const J1939_SOURCE_ADDRESSES: &[(u8, &str)] = &[
    (0, "Engine #1"),
    (1, "Engine #2"),
    (2, "Turbocharger"),
    (3, "Transmission #1"),
    (4, "Transmission #2"),
    (5, "Shift Console - Primary"),
    (6, "Shift Console - Secondary"),
    (7, "Power TakeOff - (Main or Rear)"),
    (8, "Axle - Steering"),
    (9, "Axle - Drive #1"),
    (10, "Axle - Drive #2"),
    (11, "Brakes - System Controller"),
    (12, "Brakes - Steer Axle"),
    (13, "Brakes - Drive axle #1"),
    (14, "Brakes - Drive Axle #2"),
    (15, "Retarder - Engine"),
    (16, "Retarder - Driveline"),
    (17, "Cruise Control"),
    (18, "Fuel System"),
    (19, "Steering Controller"),
    (23, "Instrument Cluster #1"),
    (24, "Trip Recorder"),
    (25, "Passenger-Operator Climate Control #1"),
    (28, "Vehicle Navigation"),
    (29, "Vehicle Security"),
    (33, "Body Controller"),
    (37, "Off Vehicle Gateway"),
    (40, "Headway Controller"),
    (41, "Retarder, Exhaust, Engine #1"),
    (49, "Cab Controller - Primary"),
    (61, "Exhaust Emission Controller"),
    (71, "Chassis Controller #1"),
    (128, "Reserved for Future Use"),
    (248, "File Server / Printer"),
    (249, "Off Board Diagnostic-Service Tool #1"),
    (250, "Off Board Diagnostic-Service Tool #2"),
    (251, "On-Board Data Logger"),
    (252, "Reserved for Experimental Use"),
    (253, "Reserved for OEM"),
    (254, "Null Address"),
    (255, "GLOBAL (All-Any Node)"),
];

/// Resolves J1939 source addresses to human-readable node names
#[derive(Debug, Clone)]
pub struct SourceNames {
    names: HashMap<u8, String>,
}

impl Default for SourceNames {
    fn default() -> Self {
        Self {
            names: J1939_SOURCE_ADDRESSES
                .iter()
                .map(|(address, name)| (*address, name.to_string()))
                .collect(),
        }
    }
}

impl SourceNames {
    pub fn new() -> Self {
        Self::default()
    }

    /// Built-in names plus overrides keyed by decimal or `0x` hex address
    pub fn with_overrides(overrides: &HashMap<String, String>) -> Result<Self> {
        let mut names = Self::default();
        for (key, name) in overrides {
            let address = parse_address(key)
                .ok_or_else(|| Error::Config(format!("Invalid source address: {}", key)))?;
            names.insert(address, name.clone());
        }
        Ok(names)
    }

    pub fn insert(&mut self, address: u8, name: impl Into<String>) {
        self.names.insert(address, name.into());
    }

    pub fn name(&self, address: u8) -> &str {
        self.names
            .get(&address)
            .map(String::as_str)
            .unwrap_or(UNKNOWN_SOURCE)
    }
}

/// Thread-safe mapping of component name to field name to value
///
/// Cloning yields another handle to the same registry.
#[derive(Debug, Clone, Default)]
pub struct ComponentRegistry {
    components: Arc<RwLock<BTreeMap<String, BTreeMap<String, String>>>>,
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set one field, creating the component entry if needed
    pub fn update(&self, component: &str, field: &str, value: impl Into<String>) {
        self.components
            .write()
            .entry(component.to_string())
            .or_default()
            .insert(field.to_string(), value.into());
    }

    pub fn get(&self, component: &str, field: &str) -> Option<String> {
        self.components.read().get(component)?.get(field).cloned()
    }

    pub fn component(&self, component: &str) -> Option<BTreeMap<String, String>> {
        self.components.read().get(component).cloned()
    }

    pub fn snapshot(&self) -> BTreeMap<String, BTreeMap<String, String>> {
        self.components.read().clone()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.snapshot())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_names() {
        let names = SourceNames::new();
        assert_eq!(names.name(0), "Engine #1");
        assert_eq!(names.name(0xF9), "Off Board Diagnostic-Service Tool #1");
        assert_eq!(names.name(0x9A), UNKNOWN_SOURCE);
    }

    #[test]
    fn test_source_name_overrides() {
        let mut overrides = HashMap::new();
        overrides.insert("0x9A".to_string(), "Gateway".to_string());
        overrides.insert("0".to_string(), "Main Engine".to_string());
        let names = SourceNames::with_overrides(&overrides).unwrap();
        assert_eq!(names.name(0x9A), "Gateway");
        assert_eq!(names.name(0), "Main Engine");

        overrides.insert("engine".to_string(), "Bad".to_string());
        assert!(SourceNames::with_overrides(&overrides).is_err());
    }

    #[test]
    fn test_registry_shared_between_handles() {
        let registry = ComponentRegistry::new();
        let handle = registry.clone();
        handle.update("Engine #1 on J1939", field::VIN, "1XPXDP9X7JD480090");

        assert_eq!(
            registry.get("Engine #1 on J1939", field::VIN).as_deref(),
            Some("1XPXDP9X7JD480090")
        );
        assert!(registry.get("Engine #1 on J1939", field::ECU_SERIAL_NUMBER).is_none());
        assert_eq!(registry.snapshot().len(), 1);
        assert!(registry.to_json().unwrap().contains("VIN from ISO"));
    }
}
