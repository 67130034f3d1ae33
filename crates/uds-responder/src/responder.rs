//! Scripted ECU responder
//!
//! Serves a [`ResponseTable`] on the bus. ISO-TP requests are reassembled
//! (answering First frames with flow control), looked up by destination
//! and request prefix, and answered from the destination back to the
//! requester. Request-PGN frames go to the [`Fixtures`].
//!
//! Only ISO-TP traffic addressed to a simulated node is handled: a
//! destination that appears in the table or the fixtures' ECU address.
//! Everything else belongs to real nodes on the bus and is left alone.
//!
//! Transmission of a multi-frame response pauses for flow control after
//! the First frame and after every full block. Frames that arrive while
//! waiting are deferred and served afterwards in arrival order.

use std::collections::{BTreeSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use j1939_uds::frame::{FlowControlFrame, FlowStatus, FRAME_LEN};
use j1939_uds::j1939::{pdu_format, DEFAULT_PRIORITY};
use j1939_uds::reassembly::{ConsecutiveOutcome, ReassembledPayload};
use j1939_uds::{IsoTpFrame, J1939Frame, ReassemblyManager, ReceiveMode, TransportAdapter, ISO_PGN};
use tokio::sync::broadcast::{self, error::TryRecvError};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::ResponderConfig;
use crate::fixtures::Fixtures;
use crate::table::ResponseTable;

/// Flow-control Wait frames tolerated in a row before giving up
const MAX_WAIT_FRAMES: u32 = 10;

const ACK_POLL_INTERVAL: Duration = Duration::from_millis(1);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResponderStats {
    /// Complete ISO-TP requests received
    pub requests: u64,
    /// Responses transmitted in full
    pub responses: u64,
    /// Requests with no table entry
    pub unmatched: u64,
    /// Flow-control waits that ran out
    pub ack_timeouts: u64,
    /// Responses abandoned on overflow, Wait limit or send failure
    pub aborted: u64,
    pub fixtures_sent: u64,
    pub malformed_frames: u64,
    pub lagged_frames: u64,
    /// ISO-TP frames addressed to nodes this responder does not simulate
    pub foreign_frames: u64,
}

/// Result of waiting for the peer's flow control
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Acknowledgement {
    Continue(FlowControlFrame),
    TimedOut,
    Abort,
}

pub struct ScriptedResponder {
    transport: Arc<dyn TransportAdapter>,
    inbound: broadcast::Receiver<J1939Frame>,
    table: ResponseTable,
    fixtures: Option<Fixtures>,
    simulated: BTreeSet<u8>,
    reassembly: ReassemblyManager,
    deferred: VecDeque<J1939Frame>,
    ack_timeout: Duration,
    inter_frame_delay: Duration,
    poll_interval: Duration,
    stats: ResponderStats,
}

impl ScriptedResponder {
    pub fn new(
        transport: Arc<dyn TransportAdapter>,
        table: ResponseTable,
        fixtures: Option<Fixtures>,
        config: &ResponderConfig,
    ) -> Self {
        let inbound = transport.subscribe();
        let mut simulated: BTreeSet<u8> = table.keys().map(|key| key.destination).collect();
        if let Some(fixtures) = &fixtures {
            simulated.insert(fixtures.ecu_address());
        }
        Self {
            transport,
            inbound,
            table,
            fixtures,
            simulated,
            reassembly: ReassemblyManager::new(config.session_timeout()),
            deferred: VecDeque::new(),
            ack_timeout: config.ack_timeout(),
            inter_frame_delay: config.inter_frame_delay(),
            poll_interval: config.poll_interval(),
            stats: ResponderStats::default(),
        }
    }

    pub fn table(&self) -> &ResponseTable {
        &self.table
    }

    pub fn stats(&self) -> ResponderStats {
        self.stats
    }

    /// Whether ISO-TP traffic to `address` is answered
    pub fn simulates(&self, address: u8) -> bool {
        self.simulated.contains(&address)
    }

    /// Serve until `running` clears
    pub async fn run(&mut self, running: Arc<AtomicBool>) {
        info!(
            entries = self.table.len(),
            fixtures = self.fixtures.is_some(),
            "Scripted responder started"
        );
        while running.load(Ordering::SeqCst) {
            if !self.poll_once().await {
                tokio::time::sleep(self.poll_interval).await;
            }
        }
        info!(stats = ?self.stats, "Scripted responder stopped");
    }

    pub fn spawn(mut self, running: Arc<AtomicBool>) -> JoinHandle<Self> {
        tokio::spawn(async move {
            self.run(running).await;
            self
        })
    }

    /// Handle one queued frame; `false` when nothing was queued
    pub async fn poll_once(&mut self) -> bool {
        self.reassembly.sweep_expired(Instant::now());
        let Some(frame) = self.next_frame() else {
            return false;
        };
        match frame.pdu_format() {
            pdu_format::ISO_TP => self.handle_iso_tp(&frame).await,
            pdu_format::REQUEST => self.handle_request_pgn(&frame).await,
            _ => {}
        }
        true
    }

    fn next_frame(&mut self) -> Option<J1939Frame> {
        if let Some(frame) = self.deferred.pop_front() {
            return Some(frame);
        }
        loop {
            match self.inbound.try_recv() {
                Ok(frame) => return Some(frame),
                Err(TryRecvError::Lagged(skipped)) => {
                    self.stats.lagged_frames += skipped;
                    warn!(skipped, "Inbound frame queue overflowed, frames lost");
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return None,
            }
        }
    }

    async fn handle_iso_tp(&mut self, frame: &J1939Frame) {
        if !self.simulates(frame.destination) {
            self.stats.foreign_frames += 1;
            return;
        }

        let classified = match IsoTpFrame::classify(&frame.data) {
            Ok(classified) => classified,
            Err(e) => {
                self.stats.malformed_frames += 1;
                warn!(
                    source = format!("0x{:02X}", frame.source),
                    data = ?frame.data,
                    error = %e,
                    "Malformed ISO-TP frame dropped"
                );
                return;
            }
        };

        let request = match classified {
            IsoTpFrame::Single(single) => Some(ReassembledPayload {
                source: frame.source,
                destination: frame.destination,
                data: single.payload.to_vec(),
            }),
            IsoTpFrame::First(first) => {
                let flow_control = self.reassembly.on_first_frame(
                    frame.source,
                    frame.destination,
                    &first,
                    ReceiveMode::Active,
                    Instant::now(),
                );
                if let Some(fc) = flow_control {
                    self.send_iso(frame.destination, frame.source, &fc).await;
                }
                self.reassembly.on_frame_complete(frame.source)
            }
            IsoTpFrame::Consecutive(consecutive) => {
                match self
                    .reassembly
                    .on_consecutive_frame(frame.source, &consecutive, Instant::now())
                {
                    ConsecutiveOutcome::Accepted => self.reassembly.on_frame_complete(frame.source),
                    ConsecutiveOutcome::Orphan | ConsecutiveOutcome::Overflow => None,
                }
            }
            IsoTpFrame::FlowControl(_) => {
                debug!(
                    source = format!("0x{:02X}", frame.source),
                    "Unsolicited flow control ignored"
                );
                None
            }
        };

        if let Some(request) = request {
            self.respond(request).await;
        }
    }

    async fn respond(&mut self, request: ReassembledPayload) {
        self.stats.requests += 1;
        let Some(entry) = self.table.lookup(request.destination, &request.data) else {
            self.stats.unmatched += 1;
            debug!(
                source = format!("0x{:02X}", request.source),
                destination = format!("0x{:02X}", request.destination),
                request = ?request.data,
                "No recorded response"
            );
            return;
        };
        let frames = entry.frames.clone();

        debug!(
            destination = format!("0x{:02X}", request.destination),
            request = ?request.data,
            frames = frames.len(),
            "Replaying recorded response"
        );
        if self
            .transmit(request.destination, request.source, &frames)
            .await
        {
            self.stats.responses += 1;
        } else {
            self.stats.aborted += 1;
        }
    }

    /// Send pre-segmented frames, pacing by the peer's flow control
    async fn transmit(&mut self, source: u8, destination: u8, frames: &[[u8; FRAME_LEN]]) -> bool {
        let mut separation = self.inter_frame_delay;
        let mut block_size = 0u8;
        let mut sent_in_block = 0u8;

        for (i, data) in frames.iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(separation).await;
            }
            if !self.send_iso(source, destination, data).await {
                return false;
            }
            if i + 1 == frames.len() {
                break;
            }

            let block_done = if i == 0 {
                true
            } else {
                sent_in_block = sent_in_block.saturating_add(1);
                block_size > 0 && sent_in_block >= block_size
            };
            if !block_done {
                continue;
            }
            sent_in_block = 0;

            match self.wait_for_ack(source, destination).await {
                Acknowledgement::Continue(fc) => {
                    block_size = fc.block_size;
                    separation = fc.min_separation().max(self.inter_frame_delay);
                }
                Acknowledgement::TimedOut => {
                    debug!(
                        peer = format!("0x{:02X}", destination),
                        "No flow control, continuing"
                    );
                }
                Acknowledgement::Abort => return false,
            }
        }
        true
    }

    /// Wait for flow control sent by `peer` to `local`
    async fn wait_for_ack(&mut self, local: u8, peer: u8) -> Acknowledgement {
        let mut deadline = Instant::now() + self.ack_timeout;
        let mut waits = 0u32;

        loop {
            let frame = match self.inbound.try_recv() {
                Ok(frame) => frame,
                Err(TryRecvError::Lagged(skipped)) => {
                    self.stats.lagged_frames += skipped;
                    warn!(skipped, "Inbound frame queue overflowed, frames lost");
                    continue;
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => {
                    if Instant::now() >= deadline {
                        self.stats.ack_timeouts += 1;
                        return Acknowledgement::TimedOut;
                    }
                    tokio::time::sleep(ACK_POLL_INTERVAL).await;
                    continue;
                }
            };

            let Some(fc) = flow_control_from(&frame, local, peer) else {
                self.deferred.push_back(frame);
                continue;
            };

            match fc.status {
                FlowStatus::ContinueToSend => return Acknowledgement::Continue(fc),
                FlowStatus::Wait if waits < MAX_WAIT_FRAMES => {
                    waits += 1;
                    deadline = Instant::now() + self.ack_timeout;
                }
                FlowStatus::Wait => {
                    warn!(peer = format!("0x{:02X}", peer), "Too many flow-control waits");
                    return Acknowledgement::Abort;
                }
                FlowStatus::Overflow => {
                    warn!(peer = format!("0x{:02X}", peer), "Peer reported overflow");
                    return Acknowledgement::Abort;
                }
                FlowStatus::Reserved(status) => {
                    warn!(
                        peer = format!("0x{:02X}", peer),
                        status, "Invalid flow status"
                    );
                    return Acknowledgement::Abort;
                }
            }
        }
    }

    async fn handle_request_pgn(&mut self, frame: &J1939Frame) {
        let Some(answer) = self.fixtures.as_ref().and_then(|f| f.answer(frame)) else {
            debug!(
                source = format!("0x{:02X}", frame.source),
                data = ?frame.data,
                "Request PGN not answered"
            );
            return;
        };

        debug!(
            source = format!("0x{:02X}", frame.source),
            frames = answer.len(),
            "Sending fixture"
        );
        for scheduled in answer {
            if let Err(e) = self.transport.send(&scheduled.frame).await {
                warn!(error = %e, "Failed to send fixture frame");
                return;
            }
            tokio::time::sleep(scheduled.delay_after).await;
        }
        self.stats.fixtures_sent += 1;
    }

    async fn send_iso(&self, source: u8, destination: u8, data: &[u8]) -> bool {
        let frame = J1939Frame::new(ISO_PGN, DEFAULT_PRIORITY, source, destination, data);
        match self.transport.send(&frame).await {
            Ok(()) => true,
            Err(e) => {
                warn!(
                    can_id = format!("0x{:08X}", frame.can_id()),
                    error = %e,
                    "Failed to send frame"
                );
                false
            }
        }
    }
}

fn flow_control_from(frame: &J1939Frame, local: u8, peer: u8) -> Option<FlowControlFrame> {
    if !frame.is_iso_tp() || frame.source != peer || frame.destination != local {
        return None;
    }
    match IsoTpFrame::classify(&frame.data).ok()? {
        IsoTpFrame::FlowControl(fc) => Some(fc),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FixtureConfig;
    use crate::table::{RequestKey, ResponseEntry};
    use j1939_uds::config::MockConfig;
    use j1939_uds::transport::mock::MockTransportAdapter;
    use pretty_assertions::assert_eq;

    const ECU: u8 = 0x00;
    const TESTER: u8 = 0xF9;

    fn vin_response() -> Vec<u8> {
        let mut response = vec![0x62, 0xF1, 0x90];
        response.extend_from_slice(b"1XPXDP9X7JD480090");
        response
    }

    fn responder(mock: &Arc<MockTransportAdapter>, fixtures: bool) -> ScriptedResponder {
        let mut table = ResponseTable::default();
        table.insert(
            RequestKey::new(ECU, &[0x22, 0xF1, 0x90]),
            ResponseEntry::new(vin_response()).unwrap(),
        );
        table.insert(
            RequestKey::new(ECU, &[0x2E, 0xF1, 0x90]),
            ResponseEntry::new(vec![0x6E, 0xF1, 0x90]).unwrap(),
        );
        let fixtures = fixtures.then(|| Fixtures::new(&FixtureConfig::default()).unwrap());
        let config = ResponderConfig {
            ack_timeout_ms: 5,
            inter_frame_delay_ms: 0,
            ..Default::default()
        };
        ScriptedResponder::new(mock.clone(), table, fixtures, &config)
    }

    fn from_tester(data: &[u8]) -> J1939Frame {
        J1939Frame::iso_tp(TESTER, ECU, data)
    }

    fn sent_data(mock: &MockTransportAdapter) -> Vec<Vec<u8>> {
        mock.sent_frames().into_iter().map(|f| f.data).collect()
    }

    #[tokio::test]
    async fn test_single_frame_request_gets_flow_controlled_response() {
        let mock = Arc::new(MockTransportAdapter::new(&MockConfig::default()));
        let mut responder = responder(&mock, false);

        mock.inject_incoming(from_tester(&[0x03, 0x22, 0xF1, 0x90, 0, 0, 0, 0]));
        mock.inject_incoming(from_tester(&[0x30, 0x00, 0x00, 0, 0, 0, 0, 0]));
        assert!(responder.poll_once().await);

        let sent = mock.sent_frames();
        assert_eq!(sent.len(), 3);
        assert!(sent.iter().all(|f| f.can_id() == 0x18DAF900));
        assert_eq!(sent[0].data, vec![0x10, 0x14, 0x62, 0xF1, 0x90, b'1', b'X', b'P']);
        assert_eq!(sent[2].data[0], 0x22);
        assert_eq!(responder.stats().responses, 1);
        assert_eq!(responder.stats().ack_timeouts, 0);
    }

    #[tokio::test]
    async fn test_missing_flow_control_times_out_and_continues() {
        let mock = Arc::new(MockTransportAdapter::new(&MockConfig::default()));
        let mut responder = responder(&mock, false);

        mock.inject_incoming(from_tester(&[0x03, 0x22, 0xF1, 0x90, 0, 0, 0, 0]));
        responder.poll_once().await;

        assert_eq!(mock.sent_frames().len(), 3);
        assert_eq!(responder.stats().ack_timeouts, 1);
        assert_eq!(responder.stats().responses, 1);
    }

    #[tokio::test]
    async fn test_block_size_requests_another_flow_control() {
        let mock = Arc::new(MockTransportAdapter::new(&MockConfig::default()));
        let mut responder = responder(&mock, false);

        mock.inject_incoming(from_tester(&[0x03, 0x22, 0xF1, 0x90, 0, 0, 0, 0]));
        mock.inject_incoming(from_tester(&[0x30, 0x01, 0x00, 0, 0, 0, 0, 0]));
        mock.inject_incoming(from_tester(&[0x30, 0x01, 0x00, 0, 0, 0, 0, 0]));
        responder.poll_once().await;

        assert_eq!(mock.sent_frames().len(), 3);
        assert_eq!(responder.stats().ack_timeouts, 0);
        assert!(!responder.poll_once().await);
    }

    #[tokio::test]
    async fn test_overflow_aborts_response() {
        let mock = Arc::new(MockTransportAdapter::new(&MockConfig::default()));
        let mut responder = responder(&mock, false);

        mock.inject_incoming(from_tester(&[0x03, 0x22, 0xF1, 0x90, 0, 0, 0, 0]));
        mock.inject_incoming(from_tester(&[0x32, 0x00, 0x00, 0, 0, 0, 0, 0]));
        responder.poll_once().await;

        assert_eq!(mock.sent_frames().len(), 1);
        assert_eq!(responder.stats().aborted, 1);
        assert_eq!(responder.stats().responses, 0);
    }

    #[tokio::test]
    async fn test_frames_during_ack_wait_are_deferred() {
        let mock = Arc::new(MockTransportAdapter::new(&MockConfig::default()));
        let mut responder = responder(&mock, false);

        mock.inject_incoming(from_tester(&[0x03, 0x22, 0xF1, 0x90, 0, 0, 0, 0]));
        mock.inject_incoming(from_tester(&[0x02, 0x3E, 0x00, 0, 0, 0, 0, 0]));
        mock.inject_incoming(from_tester(&[0x30, 0x00, 0x00, 0, 0, 0, 0, 0]));
        responder.poll_once().await;
        assert_eq!(responder.stats().requests, 1);

        // Tester present was held back, then served (no entry for it)
        assert!(responder.poll_once().await);
        assert_eq!(responder.stats().requests, 2);
        assert_eq!(responder.stats().unmatched, 1);
    }

    #[tokio::test]
    async fn test_multi_frame_request() {
        let mock = Arc::new(MockTransportAdapter::new(&MockConfig::default()));
        let mut responder = responder(&mock, false);

        mock.inject_incoming(from_tester(&[0x10, 0x0A, 0x2E, 0xF1, 0x90, 0x01, 0x02, 0x03]));
        mock.inject_incoming(from_tester(&[0x21, 0x04, 0x05, 0x06, 0x07, 0, 0, 0]));
        responder.poll_once().await;
        responder.poll_once().await;

        assert_eq!(
            sent_data(&mock),
            vec![
                vec![0x30, 0, 0, 0, 0, 0, 0, 0],
                vec![0x03, 0x6E, 0xF1, 0x90, 0xFF, 0xFF, 0xFF, 0xFF],
            ]
        );
        assert_eq!(mock.sent_frames()[0].can_id(), 0x18DAF900);
    }

    #[tokio::test]
    async fn test_unmatched_and_malformed_requests() {
        let mock = Arc::new(MockTransportAdapter::new(&MockConfig::default()));
        let mut responder = responder(&mock, false);

        mock.inject_incoming(from_tester(&[0x03, 0x22, 0xF1, 0x8C]));
        mock.inject_incoming(from_tester(&[0x45, 0x22, 0xF1, 0x90]));
        responder.poll_once().await;
        responder.poll_once().await;

        assert!(mock.sent_frames().is_empty());
        assert_eq!(responder.stats().unmatched, 1);
        assert_eq!(responder.stats().malformed_frames, 1);
    }

    #[tokio::test]
    async fn test_traffic_between_other_nodes_is_left_alone() {
        let mock = Arc::new(MockTransportAdapter::new(&MockConfig::default()));
        let mut responder = responder(&mock, false);
        assert!(responder.simulates(ECU));
        assert!(!responder.simulates(TESTER));

        // A real ECU's multi-frame response to the tester
        mock.inject_incoming(J1939Frame::iso_tp(
            0x17,
            TESTER,
            [0x10, 0x14, 0x62, 0xF1, 0x90, 1, 2, 3],
        ));
        // Same request the table knows, but sent to another node
        mock.inject_incoming(J1939Frame::iso_tp(TESTER, 0x03, [0x03, 0x22, 0xF1, 0x90]));
        assert!(responder.poll_once().await);
        assert!(responder.poll_once().await);

        assert!(mock.sent_frames().is_empty());
        assert_eq!(responder.stats().foreign_frames, 2);
        assert_eq!(responder.stats().requests, 0);
    }

    #[tokio::test]
    async fn test_fixture_address_is_simulated() {
        let mock = Arc::new(MockTransportAdapter::new(&MockConfig::default()));
        let config = ResponderConfig::default();
        let fixtures = Fixtures::new(&FixtureConfig {
            ecu_address: 0x17,
            ..Default::default()
        })
        .unwrap();
        let responder =
            ScriptedResponder::new(mock.clone(), ResponseTable::default(), Some(fixtures), &config);

        assert!(responder.simulates(0x17));
        assert!(!responder.simulates(ECU));
    }

    #[tokio::test]
    async fn test_request_pgn_answered_by_fixtures() {
        let mock = Arc::new(MockTransportAdapter::new(&MockConfig::default()));
        let mut responder = responder(&mock, true);

        mock.inject_incoming(J1939Frame::new(0xEA00, 6, TESTER, ECU, [0xEC, 0xFE, 0x00]));
        responder.poll_once().await;

        let ids: Vec<u32> = mock.sent_frames().iter().map(|f| f.can_id()).collect();
        assert_eq!(ids, vec![0x1CECF900, 0x1CEBF900, 0x1CEBF900, 0x1CEBF900]);
        assert_eq!(responder.stats().fixtures_sent, 1);
    }

    #[tokio::test]
    async fn test_request_pgn_ignored_without_fixtures() {
        let mock = Arc::new(MockTransportAdapter::new(&MockConfig::default()));
        let mut responder = responder(&mock, false);

        mock.inject_incoming(J1939Frame::new(0xEA00, 6, TESTER, ECU, [0xEC, 0xFE, 0x00]));
        assert!(responder.poll_once().await);
        assert!(mock.sent_frames().is_empty());
    }
}
