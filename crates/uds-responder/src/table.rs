//! Response table built from a recorded trace
//!
//! Each request sent by the tester is paired with the message that follows
//! it from any other node. The response is stored pre-segmented into 8-byte
//! ISO-TP frames, keyed by the destination the request was sent to and the
//! request's first three payload bytes (SID plus two parameter bytes).

use std::collections::HashMap;

use j1939_uds::frame::{segment_with_single_max, FILL_BYTE, FRAME_LEN};
use tracing::debug;

use crate::trace::{RecordedTrace, TraceError};

/// Request bytes that take part in the lookup key
pub const REQUEST_PREFIX_LEN: usize = 3;

/// Longest response sent as a Single frame; anything longer gets a First frame
pub const RESPONSE_SINGLE_FRAME_MAX: usize = 6;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestKey {
    pub destination: u8,
    pub prefix: Vec<u8>,
}

impl RequestKey {
    pub fn new(destination: u8, request: &[u8]) -> Self {
        let len = request.len().min(REQUEST_PREFIX_LEN);
        Self {
            destination,
            prefix: request[..len].to_vec(),
        }
    }
}

/// A canned response ready to transmit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseEntry {
    pub payload: Vec<u8>,
    pub frames: Vec<[u8; FRAME_LEN]>,
}

impl ResponseEntry {
    pub fn new(payload: Vec<u8>) -> Result<Self, j1939_uds::FrameError> {
        let frames = segment_with_single_max(&payload, FILL_BYTE, RESPONSE_SINGLE_FRAME_MAX)?;
        Ok(Self { payload, frames })
    }
}

/// Read-only after construction
#[derive(Debug, Clone, Default)]
pub struct ResponseTable {
    entries: HashMap<RequestKey, ResponseEntry>,
}

impl ResponseTable {
    /// Pair tester requests with the responses that follow them
    ///
    /// A tester message followed by another tester message has no response;
    /// the second one becomes the next request candidate. Messages from
    /// other nodes that do not follow a tester request are skipped. Any
    /// record that takes part in a pair must decode, or the build fails.
    pub fn from_trace(trace: &RecordedTrace, tester_address: u8) -> Result<Self, TraceError> {
        let mut table = Self::default();
        let records = trace.records();

        let mut i = 0;
        while i < records.len() {
            let request = &records[i];
            i += 1;
            if request.message.source_address != tester_address {
                continue;
            }
            let Some(response) = records.get(i) else {
                break;
            };
            if response.message.source_address == tester_address {
                continue;
            }
            i += 1;

            let request_payload = request.payload()?;
            let response_payload = response.payload()?;
            let key = RequestKey::new(request.message.destination_address, &request_payload);
            let entry =
                ResponseEntry::new(response_payload).map_err(|source| TraceError::Segment {
                    index: response.index,
                    source,
                })?;

            debug!(
                destination = format!("0x{:02X}", key.destination),
                prefix = ?key.prefix,
                frames = entry.frames.len(),
                "Response table entry"
            );
            if table.entries.insert(key, entry).is_some() {
                debug!(index = request.index, "Later recording replaces earlier response");
            }
        }

        Ok(table)
    }

    pub fn insert(&mut self, key: RequestKey, entry: ResponseEntry) {
        self.entries.insert(key, entry);
    }

    /// Response for a request payload sent to `destination`
    pub fn lookup(&self, destination: u8, request: &[u8]) -> Option<&ResponseEntry> {
        self.entries.get(&RequestKey::new(destination, request))
    }

    pub fn keys(&self) -> impl Iterator<Item = &RequestKey> {
        self.entries.keys()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use j1939_uds::{UdsMessage, UdsMessageLog};
    use pretty_assertions::assert_eq;

    fn log_of(messages: &[(u8, u8, &[u8])]) -> RecordedTrace {
        let mut log = UdsMessageLog::new();
        for (source, destination, payload) in messages {
            log.push(UdsMessage::from_payload(*source, "", *destination, payload).unwrap());
        }
        RecordedTrace::from_log(&log)
    }

    #[test]
    fn test_segmented_response_frames() {
        let mut response = vec![0x62, 0xF1, 0x90];
        response.extend_from_slice(b"1XPXDP");
        let trace = log_of(&[
            (0xF9, 0x00, &[0x22, 0xF1, 0x90]),
            (0x00, 0xF9, response.as_slice()),
        ]);

        let table = ResponseTable::from_trace(&trace, 0xF9).unwrap();
        let entry = table.lookup(0x00, &[0x22, 0xF1, 0x90]).unwrap();
        assert_eq!(
            entry.frames,
            vec![
                [0x10, 0x09, 0x62, 0xF1, 0x90, b'1', b'X', b'P'],
                [0x21, b'X', b'D', b'P', 0xFF, 0xFF, 0xFF, 0xFF],
            ]
        );
    }

    #[test]
    fn test_short_response_is_padded_single_frame() {
        let trace = log_of(&[(0xF9, 0x00, &[0x3E, 0x00]), (0x00, 0xF9, &[0x7E, 0x00])]);
        let table = ResponseTable::from_trace(&trace, 0xF9).unwrap();
        let entry = table.lookup(0x00, &[0x3E, 0x00]).unwrap();
        assert_eq!(
            entry.frames,
            vec![[0x02, 0x7E, 0x00, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF]]
        );
    }

    #[test]
    fn test_seven_byte_response_uses_first_frame() {
        let entry = ResponseEntry::new(vec![0x62, 0xF1, 0x90, 1, 2, 3, 4]).unwrap();
        assert_eq!(
            entry.frames,
            vec![
                [0x10, 0x07, 0x62, 0xF1, 0x90, 1, 2, 3],
                [0x21, 4, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF],
            ]
        );
    }

    #[test]
    fn test_pairing_skips_unanswered_requests() {
        let trace = log_of(&[
            (0x00, 0xFF, &[0x7E, 0x00]),
            (0xF9, 0x00, &[0x10, 0x01]),
            (0xF9, 0x00, &[0x22, 0xF1, 0x8C]),
            (0x00, 0xF9, &[0x62, 0xF1, 0x8C, b'S', b'N']),
            (0xF9, 0x03, &[0x22, 0xF1, 0x90]),
        ]);
        let table = ResponseTable::from_trace(&trace, 0xF9).unwrap();

        assert_eq!(table.len(), 1);
        assert!(table.lookup(0x00, &[0x10, 0x01]).is_none());
        assert_eq!(
            table.lookup(0x00, &[0x22, 0xF1, 0x8C, 0x00]).unwrap().payload,
            vec![0x62, 0xF1, 0x8C, b'S', b'N']
        );
        // Same prefix at another node is a different key
        assert!(table.lookup(0x03, &[0x22, 0xF1, 0x8C]).is_none());
    }

    #[test]
    fn test_corrupt_record_fails_build() {
        let json = r#"{
            "1": {"SA": 249, "DA": 0, "SID": "22", "Encoded Bytes": "IvGQ"},
            "2": {"SA": 0, "DA": 249, "SID": "62", "Encoded Bytes": "%%%"}
        }"#;
        let trace = RecordedTrace::from_json(json).unwrap();
        assert!(matches!(
            ResponseTable::from_trace(&trace, 0xF9),
            Err(TraceError::Base64 { index: 2, .. })
        ));
    }

    #[test]
    fn test_request_key_prefix() {
        assert_eq!(RequestKey::new(0, &[0x22, 0xF1, 0x90, 0x00]).prefix, vec![0x22, 0xF1, 0x90]);
        assert_eq!(RequestKey::new(0, &[0x3E]).prefix, vec![0x3E]);
    }
}
