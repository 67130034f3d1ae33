//! ISO-TP receive driver over J1939
//!
//! The driver is the single consumer of the inbound frame stream and the only
//! mutator of its [`ReassemblyManager`]. It classifies each ISO-TP frame,
//! feeds reassembly, answers First frames with flow control in active mode,
//! and hands completed messages to the caller. In passive mode it only
//! observes and records decoded messages into a [`UdsMessageLog`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;
use tokio::sync::broadcast::{self, error::TryRecvError};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::DriverConfig;
use crate::frame::{IsoTpFrame, FRAME_LEN};
use crate::j1939::{J1939Frame, DEFAULT_PRIORITY, ISO_PGN};
use crate::reassembly::{ConsecutiveOutcome, ReassemblyManager, ReassemblyStats, ReceiveMode};
use crate::registry::SourceNames;
use crate::transport::{TransportAdapter, TransportError};
use crate::uds::{service_id, session_type, UdsMessage, UdsMessageLog};

/// A complete UDS message taken off the bus
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedMessage {
    pub pgn: u32,
    pub priority: u8,
    pub source: u8,
    pub destination: u8,
    /// UDS payload, SID first
    pub data: Vec<u8>,
}

impl ReceivedMessage {
    pub fn sid(&self) -> Option<u8> {
        self.data.first().copied()
    }
}

/// Receive-side counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DriverStats {
    pub frames_received: u64,
    pub malformed_frames: u64,
    /// Frames lost because the inbound channel overflowed
    pub lagged_frames: u64,
    pub single_frames: u64,
    pub reassembly: ReassemblyStats,
}

pub struct IsoTpDriver {
    transport: Arc<dyn TransportAdapter>,
    inbound: broadcast::Receiver<J1939Frame>,
    reassembly: ReassemblyManager,
    mode: ReceiveMode,
    config: DriverConfig,
    source_names: Arc<SourceNames>,
    log: Option<Arc<RwLock<UdsMessageLog>>>,
    stats: DriverStats,
}

impl IsoTpDriver {
    /// Active driver: First frames are answered with flow control
    pub fn new(
        transport: Arc<dyn TransportAdapter>,
        config: &DriverConfig,
        source_names: Arc<SourceNames>,
    ) -> Self {
        let inbound = transport.subscribe();
        Self {
            transport,
            inbound,
            reassembly: ReassemblyManager::new(config.session_timeout()),
            mode: ReceiveMode::Active,
            config: config.clone(),
            source_names,
            log: None,
            stats: DriverStats::default(),
        }
    }

    /// Passive driver recording every message into a fresh log
    pub fn passive(
        transport: Arc<dyn TransportAdapter>,
        config: &DriverConfig,
        source_names: Arc<SourceNames>,
    ) -> Self {
        Self::new(transport, config, source_names)
            .with_mode(ReceiveMode::Passive)
            .with_log(Arc::new(RwLock::new(UdsMessageLog::new())))
    }

    pub fn with_mode(mut self, mode: ReceiveMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_log(mut self, log: Arc<RwLock<UdsMessageLog>>) -> Self {
        self.log = Some(log);
        self
    }

    pub fn mode(&self) -> ReceiveMode {
        self.mode
    }

    pub fn log(&self) -> Option<Arc<RwLock<UdsMessageLog>>> {
        self.log.clone()
    }

    pub fn source_names(&self) -> &SourceNames {
        &self.source_names
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    pub fn stats(&self) -> DriverStats {
        DriverStats {
            reassembly: self.reassembly.stats(),
            ..self.stats
        }
    }

    /// Send raw ISO-TP frame data on PGN 0xDA00 from the tester address
    pub async fn send_message(&self, data: &[u8], destination: u8) -> Result<(), TransportError> {
        let frame = J1939Frame::new(
            ISO_PGN,
            self.config.priority,
            self.config.tester_address,
            destination,
            data,
        );
        self.transport.send(&frame).await
    }

    /// Request a default diagnostic session with the positive response suppressed
    pub async fn init_session(&self, destination: u8) -> Result<(), TransportError> {
        let mut request = [0u8; FRAME_LEN];
        request[0] = 0x02;
        request[1] = service_id::DIAGNOSTIC_SESSION_CONTROL;
        request[2] = session_type::SUPPRESS_POSITIVE_RESPONSE | session_type::DEFAULT;
        info!(
            destination = format!("0x{:02X}", destination),
            "Initializing diagnostic session"
        );
        self.send_message(&request, destination).await
    }

    /// Drain queued frames until one completes a message
    ///
    /// Returns `None` once the queue is empty. Expired reassembly sessions
    /// are swept on every call.
    pub async fn read_message(&mut self) -> Option<ReceivedMessage> {
        self.reassembly.sweep_expired(Instant::now());

        loop {
            let frame = match self.inbound.try_recv() {
                Ok(frame) => frame,
                Err(TryRecvError::Lagged(skipped)) => {
                    self.stats.lagged_frames += skipped;
                    warn!(skipped, "Inbound frame queue overflowed, frames lost");
                    continue;
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return None,
            };

            if let Some(message) = self.handle_frame(&frame).await {
                self.record(&message);
                return Some(message);
            }
        }
    }

    async fn handle_frame(&mut self, frame: &J1939Frame) -> Option<ReceivedMessage> {
        if !frame.is_iso_tp() {
            return None;
        }
        self.stats.frames_received += 1;

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
                return None;
            }
        };

        match classified {
            IsoTpFrame::Single(single) => {
                self.stats.single_frames += 1;
                Some(ReceivedMessage {
                    pgn: frame.pgn,
                    priority: frame.priority,
                    source: frame.source,
                    destination: frame.destination,
                    data: single.payload.to_vec(),
                })
            }
            IsoTpFrame::First(first) => {
                let flow_control = self.reassembly.on_first_frame(
                    frame.source,
                    frame.destination,
                    &first,
                    self.mode,
                    Instant::now(),
                );
                if let Some(fc) = flow_control {
                    if let Err(e) = self.send_message(&fc, frame.source).await {
                        warn!(
                            source = format!("0x{:02X}", frame.source),
                            error = %e,
                            "Failed to send flow control"
                        );
                    }
                }
                // A declared length of six bytes or less is already complete
                self.complete(frame.source)
            }
            IsoTpFrame::Consecutive(consecutive) => {
                match self
                    .reassembly
                    .on_consecutive_frame(frame.source, &consecutive, Instant::now())
                {
                    ConsecutiveOutcome::Accepted => self.complete(frame.source),
                    ConsecutiveOutcome::Orphan | ConsecutiveOutcome::Overflow => None,
                }
            }
            IsoTpFrame::FlowControl(fc) => {
                debug!(
                    source = format!("0x{:02X}", frame.source),
                    status = ?fc.status,
                    "Flow control ignored by receiver"
                );
                None
            }
        }
    }

    fn complete(&mut self, source: u8) -> Option<ReceivedMessage> {
        let payload = self.reassembly.on_frame_complete(source)?;
        debug!(
            source = format!("0x{:02X}", payload.source),
            length = payload.data.len(),
            "Multi-frame message complete"
        );
        Some(ReceivedMessage {
            pgn: ISO_PGN,
            priority: DEFAULT_PRIORITY,
            source: payload.source,
            destination: payload.destination,
            data: payload.data,
        })
    }

    fn record(&self, message: &ReceivedMessage) {
        let Some(log) = &self.log else {
            return;
        };
        let name = self.source_names.name(message.source);
        if let Some(decoded) =
            UdsMessage::from_payload(message.source, name, message.destination, &message.data)
        {
            log.write().push(decoded);
        }
    }

    /// Poll continuously until `running` clears, returning the driver afterwards
    pub fn spawn_monitor(mut self, running: Arc<AtomicBool>) -> JoinHandle<Self> {
        tokio::spawn(async move {
            let poll_interval = self.config.poll_interval();
            info!(mode = ?self.mode, "UDS monitor started");
            while running.load(Ordering::SeqCst) {
                match self.read_message().await {
                    Some(_) => tokio::task::yield_now().await,
                    None => tokio::time::sleep(poll_interval).await,
                }
            }
            info!("UDS monitor stopped");
            self
        })
    }
}
