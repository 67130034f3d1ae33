//! Responder end to end: a tester and the responder on a linked mock bus
//!
//! The tester side is the real driver and correlator from `j1939-uds`, so
//! flow control, reassembly and matching run exactly as on hardware.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use j1939_uds::config::{CorrelatorConfig, DriverConfig, MockConfig};
use j1939_uds::registry::field;
use j1939_uds::transport::mock::MockTransportAdapter;
use j1939_uds::{
    ComponentRegistry, IsoTpDriver, J1939Frame, RequestCorrelator, SourceNames, TransportAdapter,
    UdsMessage, UdsMessageLog,
};
use pretty_assertions::assert_eq;
use uds_responder::{
    FixtureConfig, Fixtures, RecordedTrace, ResponderConfig, ResponderStats, ResponseTable,
    ScriptedResponder,
};

const ENGINE: u8 = 0x00;
const TESTER: u8 = 0xF9;

struct Bench {
    correlator: RequestCorrelator,
    tester: Arc<MockTransportAdapter>,
    running: Arc<AtomicBool>,
    handle: tokio::task::JoinHandle<ScriptedResponder>,
}

impl Bench {
    fn start(trace: &RecordedTrace, fixtures: bool) -> Self {
        let (tester, ecu) = MockTransportAdapter::linked_pair(&MockConfig::default());
        let tester = Arc::new(tester);

        let config = ResponderConfig::default();
        let table = ResponseTable::from_trace(trace, TESTER).unwrap();
        let fixtures = fixtures.then(|| Fixtures::new(&FixtureConfig::default()).unwrap());
        let running = Arc::new(AtomicBool::new(true));
        let handle = ScriptedResponder::new(Arc::new(ecu), table, fixtures, &config)
            .spawn(running.clone());

        let driver = IsoTpDriver::new(
            tester.clone(),
            &DriverConfig::default(),
            Arc::new(SourceNames::new()),
        );
        let correlator =
            RequestCorrelator::new(driver, ComponentRegistry::new(), &CorrelatorConfig::default());

        Self {
            correlator,
            tester,
            running,
            handle,
        }
    }

    async fn stop(self) -> ResponderStats {
        self.running.store(false, Ordering::SeqCst);
        self.handle.await.unwrap().stats()
    }
}

fn recorded(pairs: &[(&[u8], &[u8])]) -> UdsMessageLog {
    let mut log = UdsMessageLog::new();
    for (request, response) in pairs {
        log.push(UdsMessage::from_payload(TESTER, "Tester", ENGINE, request).unwrap());
        log.push(UdsMessage::from_payload(ENGINE, "Engine #1", TESTER, response).unwrap());
    }
    log
}

#[tokio::test]
async fn test_recorded_response_replayed_bit_for_bit() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("engine.json");
    recorded(&[(&[0x22, 0xF1, 0x90], &[0x62, 0xF1, 0x90, 0x56, 0x49, 0x4E])])
        .save(&path)
        .unwrap();

    let trace = RecordedTrace::load(&path).unwrap();
    let mut bench = Bench::start(&trace, false);

    let response = bench
        .correlator
        .read_data_by_identifier(&[0xF1, 0x90], ENGINE, Duration::from_millis(500))
        .await
        .unwrap();
    assert_eq!(response, Some(vec![0x62, 0xF1, 0x90, 0x56, 0x49, 0x4E]));
    assert_eq!(
        bench
            .correlator
            .registry()
            .get("Engine #1 on J1939", field::VIN)
            .as_deref(),
        Some("VIN")
    );

    let stats = bench.stop().await;
    assert_eq!(stats.requests, 1);
    assert_eq!(stats.responses, 1);
}

#[tokio::test]
async fn test_multi_frame_response_with_flow_control() {
    let mut vin = vec![0x62, 0xF1, 0x90];
    vin.extend_from_slice(b"1XPXDP9X7JD480090");
    let log = recorded(&[(&[0x22, 0xF1, 0x90], &vin)]);
    let mut bench = Bench::start(&RecordedTrace::from_log(&log), false);

    let response = bench
        .correlator
        .read_data_by_identifier(&[0xF1, 0x90], ENGINE, Duration::from_millis(500))
        .await
        .unwrap();
    assert_eq!(response, Some(vin));

    // Request, then continue-to-send for the First frame
    let sent: Vec<Vec<u8>> = bench.tester.sent_frames().into_iter().map(|f| f.data).collect();
    assert_eq!(
        sent,
        vec![
            vec![0x03, 0x22, 0xF1, 0x90, 0x00, 0x00, 0x00, 0x00],
            vec![0x30, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00],
        ]
    );

    let stats = bench.stop().await;
    assert_eq!(stats.responses, 1);
    assert_eq!(stats.ack_timeouts, 0);
}

#[tokio::test]
async fn test_seven_byte_response_sent_as_first_frame() {
    let response = [0x62, 0xF1, 0x8C, 0x53, 0x4E, 0x30, 0x31];
    let log = recorded(&[(&[0x22, 0xF1, 0x8C], &response)]);
    let mut bench = Bench::start(&RecordedTrace::from_log(&log), false);

    let received = bench
        .correlator
        .read_data_by_identifier(&[0xF1, 0x8C], ENGINE, Duration::from_millis(500))
        .await
        .unwrap();
    assert_eq!(received, Some(response.to_vec()));

    // The tester had to acknowledge a First frame
    let sent: Vec<Vec<u8>> = bench.tester.sent_frames().into_iter().map(|f| f.data).collect();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[1], vec![0x30, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00]);

    let stats = bench.stop().await;
    assert_eq!(stats.responses, 1);
}

#[tokio::test]
async fn test_unrecorded_request_is_not_answered() {
    let log = recorded(&[(&[0x22, 0xF1, 0x90], &[0x62, 0xF1, 0x90, 0x56, 0x49, 0x4E])]);
    let mut bench = Bench::start(&RecordedTrace::from_log(&log), false);

    let response = bench
        .correlator
        .read_data_by_identifier(&[0xF1, 0x8C], ENGINE, Duration::from_millis(50))
        .await
        .unwrap();
    assert_eq!(response, None);

    let stats = bench.stop().await;
    assert_eq!(stats.unmatched, 3);
    assert_eq!(stats.responses, 0);
}

#[tokio::test]
async fn test_vin_fixture_over_transport_protocol() {
    let log = UdsMessageLog::new();
    let bench = Bench::start(&RecordedTrace::from_log(&log), true);
    let mut rx = bench.tester.subscribe();

    let request = J1939Frame::new(0xEA00, 6, TESTER, ENGINE, [0xEC, 0xFE, 0x00]);
    bench.tester.send(&request).await.unwrap();

    let mut received = Vec::new();
    while received.len() < 4 {
        let frame = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        received.push(frame);
    }

    assert_eq!(received[0].can_id(), 0x1CECF900);
    assert_eq!(
        received[0].data,
        vec![0x10, 0x12, 0x00, 0x03, 0xFF, 0xEC, 0xFE, 0x00]
    );
    let vin: Vec<u8> = received[1..]
        .iter()
        .flat_map(|f| f.data[1..].to_vec())
        .take(18)
        .collect();
    assert_eq!(vin, b"1XPXDP9X7JD480090*".to_vec());

    let stats = bench.stop().await;
    assert_eq!(stats.fixtures_sent, 1);
}
