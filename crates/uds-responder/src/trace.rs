//! Recorded UDS traces
//!
//! A trace is a JSON object mapping string indices ("1", "2", ...) to
//! decoded UDS message records, as written by a passive monitor.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use j1939_uds::frame::FrameError;
use j1939_uds::{UdsMessage, UdsMessageLog};
use thiserror::Error;

/// Errors raised while loading a trace or building a response table from it
#[derive(Debug, Error)]
pub enum TraceError {
    #[error("Failed to read trace {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid trace JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Record {index}: invalid Encoded Bytes: {source}")]
    Base64 {
        index: u64,
        source: base64::DecodeError,
    },

    #[error("Invalid record index: {0:?}")]
    BadIndex(String),

    #[error("Record {index}: SID {sid:?} does not match payload")]
    SidMismatch { index: u64, sid: String },

    #[error("Record {0}: empty payload")]
    EmptyPayload(u64),

    #[error("Record {index}: {source}")]
    Segment { index: u64, source: FrameError },
}

/// One record of a trace with its numeric index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceRecord {
    pub index: u64,
    pub message: UdsMessage,
}

impl TraceRecord {
    /// The full UDS payload, checked against the record's SID
    pub fn payload(&self) -> Result<Vec<u8>, TraceError> {
        let payload = self.message.payload().map_err(|source| TraceError::Base64 {
            index: self.index,
            source,
        })?;
        let first = *payload.first().ok_or(TraceError::EmptyPayload(self.index))?;
        if self.message.sid_byte() != Some(first) {
            return Err(TraceError::SidMismatch {
                index: self.index,
                sid: self.message.sid.clone(),
            });
        }
        Ok(payload)
    }
}

/// Records of a trace in index order
#[derive(Debug, Clone, Default)]
pub struct RecordedTrace {
    records: Vec<TraceRecord>,
}

impl RecordedTrace {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, TraceError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| TraceError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&content)
    }

    /// Parse a trace; indices are sorted numerically, not lexically
    pub fn from_json(json: &str) -> Result<Self, TraceError> {
        let raw: BTreeMap<String, UdsMessage> = serde_json::from_str(json)?;
        let mut records = raw
            .into_iter()
            .map(|(key, message)| {
                let index = key
                    .trim()
                    .parse::<u64>()
                    .map_err(|_| TraceError::BadIndex(key.clone()))?;
                Ok(TraceRecord { index, message })
            })
            .collect::<Result<Vec<_>, TraceError>>()?;
        records.sort_by_key(|record| record.index);
        Ok(Self { records })
    }

    pub fn from_log(log: &UdsMessageLog) -> Self {
        Self {
            records: log
                .iter()
                .map(|(index, message)| TraceRecord {
                    index,
                    message: message.clone(),
                })
                .collect(),
        }
    }

    pub fn records(&self) -> &[TraceRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[test]
    fn test_indices_sorted_numerically() {
        let json = r#"{
            "10": {"SA": 0, "DA": 249, "SID": "7E", "Encoded Bytes": "fgA="},
            "2": {"SA": 249, "DA": 0, "SID": "3E", "Encoded Bytes": "PgA="},
            "1": {"SA": 249, "DA": 0, "SID": "3E", "Encoded Bytes": "PgA="}
        }"#;
        let trace = RecordedTrace::from_json(json).unwrap();
        let indices: Vec<u64> = trace.records().iter().map(|r| r.index).collect();
        assert_eq!(indices, vec![1, 2, 10]);
        assert_eq!(trace.records()[2].payload().unwrap(), vec![0x7E, 0x00]);
    }

    #[test]
    fn test_bad_index_rejected() {
        let json = r#"{"first": {"SA": 249, "DA": 0, "SID": "3E", "Encoded Bytes": "PgA="}}"#;
        assert!(matches!(
            RecordedTrace::from_json(json),
            Err(TraceError::BadIndex(_))
        ));
    }

    #[rstest]
    #[case("IvGQ", "22", Some(vec![0x22, 0xF1, 0x90]))]
    #[case("PgA=", "22", None)]
    #[case("not base64!", "22", None)]
    #[case("", "22", None)]
    fn test_record_payload(
        #[case] encoded: &str,
        #[case] sid: &str,
        #[case] expected: Option<Vec<u8>>,
    ) {
        let json = format!(
            r#"{{"1": {{"SA": 249, "DA": 0, "SID": "{sid}", "Encoded Bytes": "{encoded}"}}}}"#
        );
        let trace = RecordedTrace::from_json(&json).unwrap();
        assert_eq!(trace.records()[0].payload().ok(), expected);
    }

    #[test]
    fn test_payload_error_kinds() {
        let json = r#"{
            "1": {"SA": 249, "DA": 0, "SID": "22", "Encoded Bytes": "PgA="},
            "2": {"SA": 249, "DA": 0, "SID": "22", "Encoded Bytes": "not base64!"},
            "3": {"SA": 249, "DA": 0, "SID": "22", "Encoded Bytes": ""}
        }"#;
        let trace = RecordedTrace::from_json(json).unwrap();
        assert!(matches!(
            trace.records()[0].payload(),
            Err(TraceError::SidMismatch { index: 1, .. })
        ));
        assert!(matches!(
            trace.records()[1].payload(),
            Err(TraceError::Base64 { index: 2, .. })
        ));
        assert!(matches!(
            trace.records()[2].payload(),
            Err(TraceError::EmptyPayload(3))
        ));
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            RecordedTrace::load("/nonexistent/trace.json"),
            Err(TraceError::Io { .. })
        ));
    }
}
