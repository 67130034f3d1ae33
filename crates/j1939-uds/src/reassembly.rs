//! Multi-frame reassembly, one session per originating node address
//!
//! A session is opened by a First frame and filled by Consecutive frames.
//! Sequence numbers are only four bits wide, so a Consecutive frame with
//! sequence `n` is placed in the first empty slot among `n, n + 16, n + 32, ...`.
//! Each session carries a deadline refreshed on every accepted frame;
//! [`ReassemblyManager::sweep_expired`] evicts sessions whose sender went
//! silent.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::frame::{self, ConsecutiveFrame, FirstFrame, FIRST_FRAME_PAYLOAD};

/// Default time a session may wait for its next Consecutive frame (ISO N_Cr)
pub const DEFAULT_SESSION_TIMEOUT: Duration = Duration::from_millis(1000);

/// Whether received First frames are acknowledged with flow control
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReceiveMode {
    /// Participate in the exchange: answer First frames with flow control
    #[default]
    Active,
    /// Observe only: another node is servicing the session
    Passive,
}

/// In-progress reassembly of one multi-frame message
#[derive(Debug)]
pub struct ReassemblySession {
    source: u8,
    destination: u8,
    declared_length: usize,
    chunks: Vec<Option<Vec<u8>>>,
    deadline: Instant,
}

impl ReassemblySession {
    fn new(source: u8, destination: u8, first: &FirstFrame<'_>, deadline: Instant) -> Self {
        let declared_length = first.length as usize;
        let remaining = declared_length.saturating_sub(FIRST_FRAME_PAYLOAD);
        let slots = remaining.div_ceil(frame::CONSECUTIVE_FRAME_PAYLOAD) + 1;

        let mut chunks = vec![None; slots];
        chunks[0] = Some(first.payload.to_vec());

        Self {
            source,
            destination,
            declared_length,
            chunks,
            deadline,
        }
    }

    /// Place a chunk at `sequence`, `sequence + 16`, ... whichever is empty first
    fn add_chunk(&mut self, sequence: u8, payload: &[u8]) -> bool {
        let mut index = sequence as usize;
        while index < self.chunks.len() {
            if self.chunks[index].is_none() {
                self.chunks[index] = Some(payload.to_vec());
                return true;
            }
            index += 16;
        }
        false
    }

    pub fn is_full(&self) -> bool {
        self.chunks.iter().all(Option::is_some)
    }

    pub fn declared_length(&self) -> usize {
        self.declared_length
    }

    pub fn slots(&self) -> usize {
        self.chunks.len()
    }

    fn into_payload(self) -> ReassembledPayload {
        let mut data: Vec<u8> = self.chunks.into_iter().flatten().flatten().collect();
        data.truncate(self.declared_length);
        ReassembledPayload {
            source: self.source,
            destination: self.destination,
            data,
        }
    }
}

/// A completed multi-frame message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReassembledPayload {
    pub source: u8,
    pub destination: u8,
    pub data: Vec<u8>,
}

/// Outcome of feeding a Consecutive frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsecutiveOutcome {
    /// Chunk stored
    Accepted,
    /// No open session for this source; frame dropped
    Orphan,
    /// Every candidate slot already holds data; frame dropped
    Overflow,
}

/// Protocol anomalies observed by the manager
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReassemblyStats {
    pub sessions_started: u64,
    pub sessions_completed: u64,
    pub orphan_consecutive_frames: u64,
    pub session_overflows: u64,
    pub duplicate_first_frames: u64,
    pub expired_sessions: u64,
}

/// Tracks open reassembly sessions keyed by source address
///
/// Exactly one task owns the manager; it is not shared behind a lock.
#[derive(Debug)]
pub struct ReassemblyManager {
    sessions: HashMap<u8, ReassemblySession>,
    session_timeout: Duration,
    stats: ReassemblyStats,
}

impl Default for ReassemblyManager {
    fn default() -> Self {
        Self::new(DEFAULT_SESSION_TIMEOUT)
    }
}

impl ReassemblyManager {
    pub fn new(session_timeout: Duration) -> Self {
        Self {
            sessions: HashMap::new(),
            session_timeout,
            stats: ReassemblyStats::default(),
        }
    }

    /// Open a session for `source` unless one is already in progress
    ///
    /// Returns the flow-control frame to send back to `source`, or `None`
    /// when a session already exists or the manager is observing passively.
    pub fn on_first_frame(
        &mut self,
        source: u8,
        destination: u8,
        first: &FirstFrame<'_>,
        mode: ReceiveMode,
        now: Instant,
    ) -> Option<[u8; frame::FRAME_LEN]> {
        if self.sessions.contains_key(&source) {
            self.stats.duplicate_first_frames += 1;
            debug!(
                source = format!("0x{:02X}", source),
                "First frame ignored, session already in progress"
            );
            return None;
        }

        let deadline = now + self.session_timeout;
        let session = ReassemblySession::new(source, destination, first, deadline);
        debug!(
            source = format!("0x{:02X}", source),
            length = session.declared_length(),
            slots = session.slots(),
            "Reassembly session started"
        );
        self.sessions.insert(source, session);
        self.stats.sessions_started += 1;

        match mode {
            ReceiveMode::Active => Some(frame::continue_to_send()),
            ReceiveMode::Passive => None,
        }
    }

    pub fn on_consecutive_frame(
        &mut self,
        source: u8,
        consecutive: &ConsecutiveFrame<'_>,
        now: Instant,
    ) -> ConsecutiveOutcome {
        let Some(session) = self.sessions.get_mut(&source) else {
            self.stats.orphan_consecutive_frames += 1;
            debug!(
                source = format!("0x{:02X}", source),
                sequence = consecutive.sequence,
                "Consecutive frame without open session dropped"
            );
            return ConsecutiveOutcome::Orphan;
        };

        if session.add_chunk(consecutive.sequence, consecutive.payload) {
            session.deadline = now + self.session_timeout;
            ConsecutiveOutcome::Accepted
        } else {
            self.stats.session_overflows += 1;
            warn!(
                source = format!("0x{:02X}", source),
                sequence = consecutive.sequence,
                slots = session.slots(),
                "Consecutive frame overflows session, dropped"
            );
            ConsecutiveOutcome::Overflow
        }
    }

    /// Extract the message for `source` once every slot is filled
    pub fn on_frame_complete(&mut self, source: u8) -> Option<ReassembledPayload> {
        if !self.sessions.get(&source)?.is_full() {
            return None;
        }
        let session = self.sessions.remove(&source)?;
        self.stats.sessions_completed += 1;
        Some(session.into_payload())
    }

    /// Evict sessions whose deadline has passed; returns the evicted sources
    pub fn sweep_expired(&mut self, now: Instant) -> Vec<u8> {
        let expired: Vec<u8> = self
            .sessions
            .iter()
            .filter(|(_, session)| session.deadline <= now)
            .map(|(source, _)| *source)
            .collect();

        for source in &expired {
            self.sessions.remove(source);
            self.stats.expired_sessions += 1;
            warn!(
                source = format!("0x{:02X}", source),
                "Incomplete reassembly session expired"
            );
        }
        expired
    }

    pub fn has_session(&self, source: u8) -> bool {
        self.sessions.contains_key(&source)
    }

    pub fn active_sessions(&self) -> usize {
        self.sessions.len()
    }

    pub fn stats(&self) -> ReassemblyStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{dissect_consecutive_frame, dissect_first_frame, segment, FILL_BYTE};
    use pretty_assertions::assert_eq;

    fn feed(manager: &mut ReassemblyManager, payload: &[u8]) -> Option<ReassembledPayload> {
        let now = Instant::now();
        let frames = segment(payload, FILL_BYTE).unwrap();
        let first = dissect_first_frame(&frames[0]).unwrap();
        manager.on_first_frame(0x00, 0xF9, &first, ReceiveMode::Active, now);
        for raw in &frames[1..] {
            let cf = dissect_consecutive_frame(raw).unwrap();
            assert_eq!(
                manager.on_consecutive_frame(0x00, &cf, now),
                ConsecutiveOutcome::Accepted
            );
        }
        manager.on_frame_complete(0x00)
    }

    #[test]
    fn test_round_trip_lengths() {
        for len in [8usize, 13, 14, 20, 111, 112, 113, 500, 4095] {
            let payload: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
            let mut manager = ReassemblyManager::default();
            let done = feed(&mut manager, &payload).expect("message completes");
            assert_eq!(done.data.len(), len);
            assert_eq!(done.data, payload);
            assert_eq!(done.source, 0x00);
            assert_eq!(done.destination, 0xF9);
            assert_eq!(manager.active_sessions(), 0);
        }
    }

    #[test]
    fn test_declared_length_truncates_slack() {
        // 6 + 7 + 2: final chunk carries five padding bytes
        let payload = [0x11u8; 15];
        let mut manager = ReassemblyManager::default();
        let done = feed(&mut manager, &payload).unwrap();
        assert_eq!(done.data.len(), 15);
    }

    #[test]
    fn test_sequence_wraparound_twenty_chunks() {
        // 6 + 19 * 7 = 139 bytes -> 20 chunks, sequences 1..15, 0, 1, 2, 3
        let payload: Vec<u8> = (0..139u32).map(|i| i as u8).collect();
        let mut manager = ReassemblyManager::default();
        let done = feed(&mut manager, &payload).unwrap();
        assert_eq!(done.data, payload);
    }

    #[test]
    fn test_first_frame_flow_control_by_mode() {
        let mut manager = ReassemblyManager::default();
        let now = Instant::now();
        let raw = [0x10, 0x14, 1, 2, 3, 4, 5, 6];
        let first = dissect_first_frame(&raw).unwrap();

        let fc = manager.on_first_frame(0x00, 0xF9, &first, ReceiveMode::Active, now);
        assert_eq!(fc, Some([0x30, 0, 0, 0, 0, 0, 0, 0]));

        // Second First frame from the same source keeps the existing session
        let fc = manager.on_first_frame(0x00, 0xF9, &first, ReceiveMode::Active, now);
        assert_eq!(fc, None);
        assert_eq!(manager.stats().duplicate_first_frames, 1);

        let fc = manager.on_first_frame(0x03, 0xF9, &first, ReceiveMode::Passive, now);
        assert_eq!(fc, None);
        assert!(manager.has_session(0x03));
    }

    #[test]
    fn test_orphan_consecutive_dropped() {
        let mut manager = ReassemblyManager::default();
        let raw = [0x21, 1, 2, 3, 4, 5, 6, 7];
        let cf = dissect_consecutive_frame(&raw).unwrap();
        let outcome = manager.on_consecutive_frame(0x17, &cf, Instant::now());
        assert_eq!(outcome, ConsecutiveOutcome::Orphan);
        assert_eq!(manager.stats().orphan_consecutive_frames, 1);
        assert_eq!(manager.active_sessions(), 0);
    }

    #[test]
    fn test_overflow_rejected_without_corruption() {
        let mut manager = ReassemblyManager::default();
        let now = Instant::now();
        // 20 bytes -> first frame + 2 consecutive slots
        let raw_ff = [0x10, 20, 1, 2, 3, 4, 5, 6];
        let first = dissect_first_frame(&raw_ff).unwrap();
        manager.on_first_frame(0x00, 0xF9, &first, ReceiveMode::Passive, now);

        let raw_cf = [0x21, 7, 8, 9, 10, 11, 12, 13];
        let cf = dissect_consecutive_frame(&raw_cf).unwrap();
        assert_eq!(
            manager.on_consecutive_frame(0x00, &cf, now),
            ConsecutiveOutcome::Accepted
        );
        assert_eq!(
            manager.on_consecutive_frame(0x00, &cf, now),
            ConsecutiveOutcome::Overflow
        );
        assert_eq!(manager.stats().session_overflows, 1);
        assert!(manager.on_frame_complete(0x00).is_none());

        let raw_cf2 = [0x22, 14, 15, 16, 17, 18, 19, 20];
        let cf2 = dissect_consecutive_frame(&raw_cf2).unwrap();
        manager.on_consecutive_frame(0x00, &cf2, now);
        let done = manager.on_frame_complete(0x00).unwrap();
        assert_eq!(done.data, (1..=20).collect::<Vec<u8>>());
    }

    #[test]
    fn test_sweep_evicts_stale_sessions() {
        let mut manager = ReassemblyManager::new(Duration::from_millis(100));
        let start = Instant::now();
        let raw = [0x10, 0x20, 1, 2, 3, 4, 5, 6];
        let first = dissect_first_frame(&raw).unwrap();
        manager.on_first_frame(0x00, 0xF9, &first, ReceiveMode::Passive, start);
        manager.on_first_frame(0x03, 0xF9, &first, ReceiveMode::Passive, start);

        // Activity on 0x03 refreshes its deadline
        let raw_cf = [0x21, 0, 0, 0, 0, 0, 0, 0];
        let cf = dissect_consecutive_frame(&raw_cf).unwrap();
        manager.on_consecutive_frame(0x03, &cf, start + Duration::from_millis(80));

        let evicted = manager.sweep_expired(start + Duration::from_millis(120));
        assert_eq!(evicted, vec![0x00]);
        assert!(manager.has_session(0x03));
        assert_eq!(manager.stats().expired_sessions, 1);

        // A fresh First frame from the evicted source starts over
        let fc = manager.on_first_frame(
            0x00,
            0xF9,
            &first,
            ReceiveMode::Active,
            start + Duration::from_millis(130),
        );
        assert!(fc.is_some());
    }
}
