//! Decoded UDS message records and the ordered message log
//!
//! Records serialize with the field names of the recorded-trace format so a
//! monitored session can be saved and replayed later.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::Path;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};

use super::{decode, service_name};

/// One decoded UDS message (display only, never mutated after creation)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UdsMessage {
    #[serde(rename = "SA")]
    pub source_address: u8,
    #[serde(rename = "Source", default)]
    pub source_name: String,
    #[serde(rename = "DA")]
    pub destination_address: u8,
    /// Service identifier as two upper-case hex digits
    #[serde(rename = "SID")]
    pub sid: String,
    #[serde(rename = "Service Name", default)]
    pub service_name: String,
    #[serde(rename = "Meaning", default)]
    pub meaning: String,
    #[serde(rename = "Value", default)]
    pub value: String,
    #[serde(rename = "Units", default)]
    pub units: String,
    #[serde(rename = "Raw Bytes", default)]
    pub raw_bytes: String,
    /// Base64 of the full UDS payload, SID included
    #[serde(rename = "Encoded Bytes")]
    pub encoded_bytes: String,
    #[serde(rename = "Raw Hexadecimal", default)]
    pub raw_hexadecimal: String,
}

impl UdsMessage {
    /// Decode a complete UDS payload; `None` for an empty payload
    pub fn from_payload(
        source_address: u8,
        source_name: impl Into<String>,
        destination_address: u8,
        payload: &[u8],
    ) -> Option<Self> {
        let (&sid, params) = payload.split_first()?;
        let decoded = decode(sid, params);
        Some(Self {
            source_address,
            source_name: source_name.into(),
            destination_address,
            sid: format!("{:02X}", sid),
            service_name: service_name(sid),
            meaning: decoded.meaning,
            value: decoded.value,
            units: decoded.units,
            raw_bytes: bytes_repr(params),
            encoded_bytes: BASE64.encode(payload),
            raw_hexadecimal: hex_string(params),
        })
    }

    /// Service identifier parsed from the hex `SID` field
    pub fn sid_byte(&self) -> Option<u8> {
        u8::from_str_radix(self.sid.trim(), 16).ok()
    }

    /// The full UDS payload recovered from `Encoded Bytes`
    pub fn payload(&self) -> Result<Vec<u8>, base64::DecodeError> {
        BASE64.decode(self.encoded_bytes.trim())
    }
}

/// Space-separated upper-case hex, e.g. `F1 90 56`
pub fn hex_string(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 3);
    for (i, byte) in bytes.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        let _ = write!(out, "{:02X}", byte);
    }
    out
}

/// Byte-literal rendering, e.g. `b'\xf1\x90VIN'`
pub fn bytes_repr(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2 + 3);
    out.push_str("b'");
    for &byte in bytes {
        match byte {
            b'\\' => out.push_str("\\\\"),
            b'\'' => out.push_str("\\'"),
            b'\t' => out.push_str("\\t"),
            b'\n' => out.push_str("\\n"),
            b'\r' => out.push_str("\\r"),
            0x20..=0x7E => out.push(byte as char),
            _ => {
                let _ = write!(out, "\\x{:02x}", byte);
            }
        }
    }
    out.push('\'');
    out
}

/// Ordered log of decoded messages keyed by a monotonically increasing index
///
/// Indices start at 1. The log serializes as a JSON object with string keys
/// in index order, which is the recorded-trace format.
#[derive(Debug, Clone, Default)]
pub struct UdsMessageLog {
    messages: BTreeMap<u64, UdsMessage>,
    next_index: u64,
}

impl UdsMessageLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message, returning its index
    pub fn push(&mut self, message: UdsMessage) -> u64 {
        self.next_index += 1;
        self.messages.insert(self.next_index, message);
        self.next_index
    }

    pub fn get(&self, index: u64) -> Option<&UdsMessage> {
        self.messages.get(&index)
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u64, &UdsMessage)> {
        self.messages.iter().map(|(index, message)| (*index, message))
    }

    /// Messages recorded after `index`, for incremental display
    pub fn since(&self, index: u64) -> impl Iterator<Item = (u64, &UdsMessage)> {
        self.messages
            .range(index + 1..)
            .map(|(index, message)| (*index, message))
    }

    pub fn last_index(&self) -> u64 {
        self.next_index
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Write the log as a recorded trace
    pub fn save(&self, path: impl AsRef<Path>) -> crate::Result<()> {
        let json = self.to_json()?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

impl Serialize for UdsMessageLog {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.messages.len()))?;
        for (index, message) in &self.messages {
            map.serialize_entry(&index.to_string(), message)?;
        }
        map.end()
    }
}
