//! J1939 addressing for frames carried on a 29-bit CAN identifier

use serde::{Deserialize, Serialize};

/// PGN used for ISO 15765-2 (ISO-TP) traffic carried over J1939
pub const ISO_PGN: u32 = 0xDA00;

/// Default J1939 priority for diagnostic traffic
pub const DEFAULT_PRIORITY: u8 = 6;

/// Global (broadcast) destination address
pub const GLOBAL_ADDRESS: u8 = 0xFF;

/// PDU format bytes this crate dispatches on
pub mod pdu_format {
    /// ISO-TP / UDS (PGN 0xDA00)
    pub const ISO_TP: u8 = 0xDA;
    /// Request PGN (PGN 0xEA00)
    pub const REQUEST: u8 = 0xEA;
    /// Transport protocol connection management (PGN 0xEC00)
    pub const TP_CM: u8 = 0xEC;
    /// Transport protocol data transfer (PGN 0xEB00)
    pub const TP_DT: u8 = 0xEB;
    /// Address claimed (PGN 0xEE00)
    pub const ADDRESS_CLAIMED: u8 = 0xEE;
}

/// A J1939 frame: addressing metadata plus up to 8 data bytes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct J1939Frame {
    pub priority: u8,
    /// Parameter group number; for PDU1 formats the PS byte is zero
    pub pgn: u32,
    pub source: u8,
    pub destination: u8,
    pub data: Vec<u8>,
}

impl J1939Frame {
    pub fn new(
        pgn: u32,
        priority: u8,
        source: u8,
        destination: u8,
        data: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            priority,
            pgn,
            source,
            destination,
            data: data.into(),
        }
    }

    /// Build an ISO-TP frame on PGN 0xDA00 at the default priority
    pub fn iso_tp(source: u8, destination: u8, data: impl Into<Vec<u8>>) -> Self {
        Self::new(ISO_PGN, DEFAULT_PRIORITY, source, destination, data)
    }

    /// Decode a 29-bit extended CAN identifier
    pub fn from_can_id(can_id: u32, data: &[u8]) -> Self {
        let priority = ((can_id >> 26) & 0x07) as u8;
        let page = (can_id >> 16) & 0x3FF;
        let pf = ((can_id >> 16) & 0xFF) as u8;
        let ps = ((can_id >> 8) & 0xFF) as u8;
        let source = (can_id & 0xFF) as u8;

        let (pgn, destination) = if pf < 240 {
            (page << 8, ps)
        } else {
            ((page << 8) | ps as u32, GLOBAL_ADDRESS)
        };

        Self {
            priority,
            pgn,
            source,
            destination,
            data: data.to_vec(),
        }
    }

    /// Encode addressing into a 29-bit extended CAN identifier
    pub fn can_id(&self) -> u32 {
        let ps = if self.pdu_format() < 240 {
            self.destination as u32
        } else {
            self.pgn & 0xFF
        };
        ((self.priority as u32 & 0x07) << 26)
            | ((self.pgn & 0x3FF00) << 8)
            | (ps << 8)
            | self.source as u32
    }

    /// PDU format (PF) byte of the PGN
    pub fn pdu_format(&self) -> u8 {
        ((self.pgn >> 8) & 0xFF) as u8
    }

    pub fn is_iso_tp(&self) -> bool {
        self.pgn == ISO_PGN
    }
}
