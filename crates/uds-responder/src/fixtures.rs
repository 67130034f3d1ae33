//! Fixed answers to J1939 request-PGN frames
//!
//! These are scripted, not table driven: a vehicle identification request
//! is answered over the J1939 transport protocol (TP.CM RTS followed by
//! TP.DT packets, no CTS handshake) and an address-claimed request is
//! answered by repeating the claim.

use std::time::Duration;

use j1939_uds::frame::FILL_BYTE;
use j1939_uds::j1939::{pdu_format, DEFAULT_PRIORITY, GLOBAL_ADDRESS};
use j1939_uds::J1939Frame;

use crate::config::FixtureConfig;
use crate::error::ResponderError;

/// Parameter group numbers used by the fixtures
pub mod pgn {
    pub const VEHICLE_IDENTIFICATION: u32 = 0xFEEC;
    pub const ADDRESS_CLAIMED: u32 = 0xEE00;
    pub const TP_CM: u32 = 0xEC00;
    pub const TP_DT: u32 = 0xEB00;
}

/// TP.CM control byte: request to send
pub const TP_CM_RTS: u8 = 0x10;

/// Priority of transport protocol frames
pub const TP_PRIORITY: u8 = 7;

/// Largest payload the J1939 transport protocol carries (255 packets of 7)
pub const TP_MAX_PAYLOAD: usize = 1785;

const TP_DT_PAYLOAD: usize = 7;
const NAME_LEN: usize = 8;
const DELAY_AFTER_RTS: Duration = Duration::from_millis(20);
const DELAY_BETWEEN_PACKETS: Duration = Duration::from_millis(10);
const DELAY_BETWEEN_CLAIMS: Duration = Duration::from_millis(10);

/// A frame and how long to pause after sending it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledFrame {
    pub frame: J1939Frame,
    pub delay_after: Duration,
}

/// PGN requested by a request-PGN frame (3 bytes, little endian)
pub fn requested_pgn(data: &[u8]) -> Option<u32> {
    let b = data.get(0..3)?;
    Some(u32::from_le_bytes([b[0], b[1], b[2], 0]))
}

/// Segment `payload` into a TP.CM RTS frame followed by TP.DT frames
pub fn transport_frames(
    pgn: u32,
    payload: &[u8],
    source: u8,
    destination: u8,
) -> Result<Vec<J1939Frame>, ResponderError> {
    if payload.is_empty() || payload.len() > TP_MAX_PAYLOAD {
        return Err(ResponderError::Fixture(format!(
            "Transport payload length {} outside 1..={}",
            payload.len(),
            TP_MAX_PAYLOAD
        )));
    }

    let size = (payload.len() as u16).to_le_bytes();
    let packets = payload.len().div_ceil(TP_DT_PAYLOAD) as u8;
    let pgn_bytes = pgn.to_le_bytes();
    let rts = [
        TP_CM_RTS,
        size[0],
        size[1],
        packets,
        0xFF,
        pgn_bytes[0],
        pgn_bytes[1],
        pgn_bytes[2],
    ];

    let mut frames = Vec::with_capacity(packets as usize + 1);
    frames.push(J1939Frame::new(pgn::TP_CM, TP_PRIORITY, source, destination, rts));
    for (i, chunk) in payload.chunks(TP_DT_PAYLOAD).enumerate() {
        let mut data = [FILL_BYTE; 8];
        data[0] = (i + 1) as u8;
        data[1..1 + chunk.len()].copy_from_slice(chunk);
        frames.push(J1939Frame::new(pgn::TP_DT, TP_PRIORITY, source, destination, data));
    }
    Ok(frames)
}

#[derive(Debug, Clone)]
pub struct Fixtures {
    ecu_address: u8,
    vin: Vec<u8>,
    name: Vec<u8>,
    claim_repeats: u32,
}

impl Fixtures {
    pub fn new(config: &FixtureConfig) -> Result<Self, ResponderError> {
        if config.name.len() != NAME_LEN {
            return Err(ResponderError::Fixture(format!(
                "NAME must be {} bytes, got {}",
                NAME_LEN,
                config.name.len()
            )));
        }
        let vin = config.vin.as_bytes().to_vec();
        // Reject lengths the transport protocol cannot carry
        transport_frames(pgn::VEHICLE_IDENTIFICATION, &vin, 0, 0)?;

        Ok(Self {
            ecu_address: config.ecu_address,
            vin,
            name: config.name.clone(),
            claim_repeats: config.claim_repeats,
        })
    }

    /// Address answering globally addressed requests
    pub fn ecu_address(&self) -> u8 {
        self.ecu_address
    }

    /// Frames answering `request`, or `None` if it is not a handled request
    pub fn answer(&self, request: &J1939Frame) -> Option<Vec<ScheduledFrame>> {
        if request.pdu_format() != pdu_format::REQUEST {
            return None;
        }
        let requested = requested_pgn(&request.data)?;
        let source = if request.destination == GLOBAL_ADDRESS {
            self.ecu_address
        } else {
            request.destination
        };

        match requested {
            pgn::VEHICLE_IDENTIFICATION => {
                let frames = transport_frames(requested, &self.vin, source, request.source).ok()?;
                Some(
                    frames
                        .into_iter()
                        .enumerate()
                        .map(|(i, frame)| ScheduledFrame {
                            frame,
                            delay_after: if i == 0 {
                                DELAY_AFTER_RTS
                            } else {
                                DELAY_BETWEEN_PACKETS
                            },
                        })
                        .collect(),
                )
            }
            pgn::ADDRESS_CLAIMED => {
                let claim = J1939Frame::new(
                    pgn::ADDRESS_CLAIMED,
                    DEFAULT_PRIORITY,
                    source,
                    GLOBAL_ADDRESS,
                    self.name.clone(),
                );
                Some(
                    (0..self.claim_repeats)
                        .map(|_| ScheduledFrame {
                            frame: claim.clone(),
                            delay_after: DELAY_BETWEEN_CLAIMS,
                        })
                        .collect(),
                )
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn request_for(pgn_bytes: [u8; 3], destination: u8) -> J1939Frame {
        J1939Frame::new(0xEA00, 6, 0xF9, destination, pgn_bytes)
    }

    #[test]
    fn test_vin_answer_frames() {
        let fixtures = Fixtures::new(&FixtureConfig::default()).unwrap();
        let answer = fixtures.answer(&request_for([0xEC, 0xFE, 0x00], 0x00)).unwrap();

        let ids: Vec<u32> = answer.iter().map(|s| s.frame.can_id()).collect();
        assert_eq!(ids, vec![0x1CECF900, 0x1CEBF900, 0x1CEBF900, 0x1CEBF900]);

        let data: Vec<Vec<u8>> = answer.iter().map(|s| s.frame.data.clone()).collect();
        assert_eq!(
            data,
            vec![
                vec![0x10, 0x12, 0x00, 0x03, 0xFF, 0xEC, 0xFE, 0x00],
                vec![0x01, 0x31, 0x58, 0x50, 0x58, 0x44, 0x50, 0x39],
                vec![0x02, 0x58, 0x37, 0x4A, 0x44, 0x34, 0x38, 0x30],
                vec![0x03, 0x30, 0x39, 0x30, 0x2A, 0xFF, 0xFF, 0xFF],
            ]
        );
        assert_eq!(answer[0].delay_after, Duration::from_millis(20));
        assert_eq!(answer[1].delay_after, Duration::from_millis(10));
    }

    #[test]
    fn test_address_claim_answer() {
        let fixtures = Fixtures::new(&FixtureConfig::default()).unwrap();
        let answer = fixtures.answer(&request_for([0x00, 0xEE, 0x00], 0xFF)).unwrap();

        assert_eq!(answer.len(), 10);
        for scheduled in &answer {
            assert_eq!(scheduled.frame.can_id(), 0x18EEFF00);
            assert_eq!(
                scheduled.frame.data,
                vec![0xF7, 0x02, 0xA1, 0x01, 0x00, 0x00, 0x00, 0x10]
            );
        }
    }

    #[test]
    fn test_unhandled_requests() {
        let fixtures = Fixtures::new(&FixtureConfig::default()).unwrap();
        assert!(fixtures.answer(&request_for([0xE5, 0xFE, 0x00], 0x00)).is_none());
        assert!(fixtures
            .answer(&J1939Frame::iso_tp(0xF9, 0x00, vec![0xEC, 0xFE, 0x00]))
            .is_none());
        assert!(fixtures
            .answer(&J1939Frame::new(0xEA00, 6, 0xF9, 0x00, vec![0xEC]))
            .is_none());
    }

    #[test]
    fn test_invalid_fixture_config() {
        let config = FixtureConfig {
            name: vec![0x01, 0x02],
            ..Default::default()
        };
        assert!(Fixtures::new(&config).is_err());

        let config = FixtureConfig {
            vin: String::new(),
            ..Default::default()
        };
        assert!(Fixtures::new(&config).is_err());
    }
}
