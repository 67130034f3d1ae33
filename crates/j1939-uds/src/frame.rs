//! ISO 15765-2 frame classification and segmentation
//!
//! The Protocol Control Information (PCI) is the high nibble of the first
//! data byte:
//!
//! | PCI | Frame        | Layout                                      |
//! |-----|--------------|---------------------------------------------|
//! | 0   | Single       | `[len] [payload; len]`                      |
//! | 1   | First        | `[1 \| len>>8] [len & 0xFF] [payload; 6]`   |
//! | 2   | Consecutive  | `[2 \| seq] [payload; 7]`                   |
//! | 3   | Flow control | `[3 \| status] [block size] [STmin ms]`     |
//!
//! Classification is pure: frames are borrowed, never copied.

use std::time::Duration;

use thiserror::Error;

/// Fill byte used when padding outbound frames to 8 bytes
pub const FILL_BYTE: u8 = 0xFF;

/// CAN classic data field length
pub const FRAME_LEN: usize = 8;

/// Largest payload expressible by the 12-bit First frame length
pub const MAX_PAYLOAD_LEN: usize = 0x0FFF;

/// Payload bytes carried by a First frame
pub const FIRST_FRAME_PAYLOAD: usize = 6;

/// Payload bytes carried by a Consecutive frame
pub const CONSECUTIVE_FRAME_PAYLOAD: usize = 7;

/// Largest payload carried by a Single frame
pub const SINGLE_FRAME_MAX: usize = 7;

/// PCI nibble values
pub mod pci {
    pub const SINGLE_FRAME: u8 = 0x0;
    pub const FIRST_FRAME: u8 = 0x1;
    pub const CONSECUTIVE_FRAME: u8 = 0x2;
    pub const FLOW_CONTROL: u8 = 0x3;
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("Empty data field")]
    Empty,

    #[error("Malformed frame: PCI nibble 0x{0:X} is not a valid frame type")]
    Malformed(u8),

    #[error("{kind:?} frame too short: {len} bytes")]
    TooShort { kind: FrameKind, len: usize },

    #[error("Payload of {0} bytes exceeds the 12-bit ISO-TP length")]
    PayloadTooLong(usize),
}

/// Frame type selected by the PCI nibble
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Single,
    First,
    Consecutive,
    FlowControl,
}

impl FrameKind {
    pub fn from_pci(byte0: u8) -> Result<Self, FrameError> {
        match high_nibble(byte0) {
            pci::SINGLE_FRAME => Ok(Self::Single),
            pci::FIRST_FRAME => Ok(Self::First),
            pci::CONSECUTIVE_FRAME => Ok(Self::Consecutive),
            pci::FLOW_CONTROL => Ok(Self::FlowControl),
            other => Err(FrameError::Malformed(other)),
        }
    }
}

/// Flow status carried in the low nibble of a flow-control frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowStatus {
    ContinueToSend,
    Wait,
    Overflow,
    Reserved(u8),
}

impl From<u8> for FlowStatus {
    fn from(value: u8) -> Self {
        match value {
            0 => Self::ContinueToSend,
            1 => Self::Wait,
            2 => Self::Overflow,
            other => Self::Reserved(other),
        }
    }
}

impl From<FlowStatus> for u8 {
    fn from(status: FlowStatus) -> Self {
        match status {
            FlowStatus::ContinueToSend => 0,
            FlowStatus::Wait => 1,
            FlowStatus::Overflow => 2,
            FlowStatus::Reserved(v) => v & 0x0F,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SingleFrame<'a> {
    pub length: u8,
    pub payload: &'a [u8],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FirstFrame<'a> {
    /// Declared total message length (12 bits)
    pub length: u16,
    pub payload: &'a [u8],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConsecutiveFrame<'a> {
    /// Sequence number, wraps 15 -> 0
    pub sequence: u8,
    pub payload: &'a [u8],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlowControlFrame {
    pub status: FlowStatus,
    pub block_size: u8,
    /// Minimum separation time (STmin) in milliseconds
    pub separation_time: u8,
}

impl FlowControlFrame {
    /// STmin as a duration
    ///
    /// 0x00-0x7F are milliseconds. 0xF1-0xF9 (100-900 us) round up to 1 ms.
    /// Reserved values mean the maximum, 127 ms.
    pub fn min_separation(&self) -> Duration {
        match self.separation_time {
            ms @ 0x00..=0x7F => Duration::from_millis(ms as u64),
            0xF1..=0xF9 => Duration::from_millis(1),
            _ => Duration::from_millis(0x7F),
        }
    }
}

/// A classified ISO-TP frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsoTpFrame<'a> {
    Single(SingleFrame<'a>),
    First(FirstFrame<'a>),
    Consecutive(ConsecutiveFrame<'a>),
    FlowControl(FlowControlFrame),
}

impl<'a> IsoTpFrame<'a> {
    /// Classify a raw data field by its PCI nibble
    pub fn classify(data: &'a [u8]) -> Result<Self, FrameError> {
        let byte0 = *data.first().ok_or(FrameError::Empty)?;
        match FrameKind::from_pci(byte0)? {
            FrameKind::Single => Ok(Self::Single(dissect_single_frame(data)?)),
            FrameKind::First => Ok(Self::First(dissect_first_frame(data)?)),
            FrameKind::Consecutive => Ok(Self::Consecutive(dissect_consecutive_frame(data)?)),
            FrameKind::FlowControl => Ok(Self::FlowControl(dissect_fc_frame(data)?)),
        }
    }

    pub fn kind(&self) -> FrameKind {
        match self {
            Self::Single(_) => FrameKind::Single,
            Self::First(_) => FrameKind::First,
            Self::Consecutive(_) => FrameKind::Consecutive,
            Self::FlowControl(_) => FrameKind::FlowControl,
        }
    }
}

pub fn high_nibble(byte: u8) -> u8 {
    (byte & 0xF0) >> 4
}

pub fn low_nibble(byte: u8) -> u8 {
    byte & 0x0F
}

/// Single frame: length = byte 0, payload = `data[1..1 + length]` (truncated)
pub fn dissect_single_frame(data: &[u8]) -> Result<SingleFrame<'_>, FrameError> {
    let length = *data.first().ok_or(FrameError::Empty)?;
    let rest = &data[1..];
    let end = (length as usize).min(rest.len());
    Ok(SingleFrame {
        length,
        payload: &rest[..end],
    })
}

/// First frame: 12-bit length from the low nibble of byte 0 and byte 1
pub fn dissect_first_frame(data: &[u8]) -> Result<FirstFrame<'_>, FrameError> {
    if data.len() < 2 {
        return Err(FrameError::TooShort {
            kind: FrameKind::First,
            len: data.len(),
        });
    }
    let length = ((low_nibble(data[0]) as u16) << 8) | data[1] as u16;
    Ok(FirstFrame {
        length,
        payload: &data[2..],
    })
}

/// Consecutive frame: sequence number in the low nibble of byte 0
pub fn dissect_consecutive_frame(data: &[u8]) -> Result<ConsecutiveFrame<'_>, FrameError> {
    let byte0 = *data.first().ok_or(FrameError::Empty)?;
    Ok(ConsecutiveFrame {
        sequence: low_nibble(byte0),
        payload: &data[1..],
    })
}

/// Flow-control frame: status, block size, separation time (ms)
pub fn dissect_fc_frame(data: &[u8]) -> Result<FlowControlFrame, FrameError> {
    if data.len() < 3 {
        return Err(FrameError::TooShort {
            kind: FrameKind::FlowControl,
            len: data.len(),
        });
    }
    Ok(FlowControlFrame {
        status: FlowStatus::from(low_nibble(data[0])),
        block_size: data[1],
        separation_time: data[2],
    })
}

/// Flow control authorizing the full message with no separation time
pub fn continue_to_send() -> [u8; FRAME_LEN] {
    flow_control(FlowStatus::ContinueToSend, 0, 0)
}

pub fn flow_control(status: FlowStatus, block_size: u8, separation_time: u8) -> [u8; FRAME_LEN] {
    let mut frame = [0u8; FRAME_LEN];
    frame[0] = (pci::FLOW_CONTROL << 4) | u8::from(status);
    frame[1] = block_size;
    frame[2] = separation_time;
    frame
}

/// Split a payload into 8-byte ISO-TP frames padded with `fill`
///
/// Payloads of up to 7 bytes become a single frame; longer payloads become a
/// First frame followed by Consecutive frames numbered 1, 2, ... 15, 0, 1, ...
pub fn segment(payload: &[u8], fill: u8) -> Result<Vec<[u8; FRAME_LEN]>, FrameError> {
    segment_with_single_max(payload, fill, SINGLE_FRAME_MAX)
}

/// [`segment`] with a custom Single frame limit
///
/// Payloads longer than `single_max` (clamped to [`SINGLE_FRAME_MAX`]) are
/// sent as First plus Consecutive frames.
pub fn segment_with_single_max(
    payload: &[u8],
    fill: u8,
    single_max: usize,
) -> Result<Vec<[u8; FRAME_LEN]>, FrameError> {
    if payload.len() > MAX_PAYLOAD_LEN {
        return Err(FrameError::PayloadTooLong(payload.len()));
    }

    if payload.len() <= single_max.min(SINGLE_FRAME_MAX) {
        let mut frame = [fill; FRAME_LEN];
        frame[0] = payload.len() as u8;
        frame[1..1 + payload.len()].copy_from_slice(payload);
        return Ok(vec![frame]);
    }

    let len = payload.len();
    let mut frames = Vec::with_capacity(1 + (len - FIRST_FRAME_PAYLOAD).div_ceil(7));

    let mut first = [fill; FRAME_LEN];
    first[0] = (pci::FIRST_FRAME << 4) | ((len >> 8) as u8 & 0x0F);
    first[1] = (len & 0xFF) as u8;
    first[2..].copy_from_slice(&payload[..FIRST_FRAME_PAYLOAD]);
    frames.push(first);

    for (index, chunk) in payload[FIRST_FRAME_PAYLOAD..]
        .chunks(CONSECUTIVE_FRAME_PAYLOAD)
        .enumerate()
    {
        let mut frame = [fill; FRAME_LEN];
        frame[0] = (pci::CONSECUTIVE_FRAME << 4) | ((index + 1) as u8 & 0x0F);
        frame[1..1 + chunk.len()].copy_from_slice(chunk);
        frames.push(frame);
    }

    Ok(frames)
}
