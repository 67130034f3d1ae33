//! Mock transport adapter for testing

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::broadcast;

use super::{TransportAdapter, TransportError, INBOUND_CHANNEL_CAPACITY};
use crate::config::MockConfig;
use crate::frame::{self, FrameKind};
use crate::j1939::J1939Frame;

/// In-memory transport
///
/// A standalone adapter records what it sends and answers from scripted
/// replies. Two adapters from [`MockTransportAdapter::linked_pair`] behave
/// like two nodes on one bus: what one sends, the other receives.
pub struct MockTransportAdapter {
    config: MockConfig,
    connected: AtomicBool,
    incoming_tx: broadcast::Sender<J1939Frame>,
    peer_tx: Option<broadcast::Sender<J1939Frame>>,
    sent: RwLock<Vec<J1939Frame>>,
    /// Scripted replies keyed by a data prefix of the sent frame
    responses: RwLock<Vec<(Vec<u8>, Vec<J1939Frame>)>>,
}

impl MockTransportAdapter {
    pub fn new(config: &MockConfig) -> Self {
        let (incoming_tx, _) = broadcast::channel(INBOUND_CHANNEL_CAPACITY);
        Self::with_channels(config, incoming_tx, None)
    }

    /// Two adapters wired back to back
    pub fn linked_pair(config: &MockConfig) -> (Self, Self) {
        let (a_tx, _) = broadcast::channel(INBOUND_CHANNEL_CAPACITY);
        let (b_tx, _) = broadcast::channel(INBOUND_CHANNEL_CAPACITY);
        let a = Self::with_channels(config, a_tx.clone(), Some(b_tx.clone()));
        let b = Self::with_channels(config, b_tx, Some(a_tx));
        (a, b)
    }

    fn with_channels(
        config: &MockConfig,
        incoming_tx: broadcast::Sender<J1939Frame>,
        peer_tx: Option<broadcast::Sender<J1939Frame>>,
    ) -> Self {
        Self {
            config: config.clone(),
            connected: AtomicBool::new(true),
            incoming_tx,
            peer_tx,
            sent: RwLock::new(Vec::new()),
            responses: RwLock::new(Vec::new()),
        }
    }

    /// Reply with `frames` whenever a sent frame's data starts with `prefix`
    pub fn add_response(&self, prefix: Vec<u8>, frames: Vec<J1939Frame>) {
        self.responses.write().push((prefix, frames));
    }

    /// Inject an inbound frame (simulates another node transmitting)
    pub fn inject_incoming(&self, frame: J1939Frame) {
        let _ = self.incoming_tx.send(frame);
    }

    /// Every frame sent so far, in order
    pub fn sent_frames(&self) -> Vec<J1939Frame> {
        self.sent.read().clone()
    }

    pub fn clear_sent(&self) {
        self.sent.write().clear();
    }

    /// Set connection state
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    fn find_response(&self, data: &[u8]) -> Option<Vec<J1939Frame>> {
        let responses = self.responses.read();

        // First try exact match
        if let Some((_, frames)) = responses.iter().find(|(prefix, _)| prefix == data) {
            return Some(frames.clone());
        }

        // Then try prefix match
        responses
            .iter()
            .find(|(prefix, _)| data.starts_with(prefix))
            .map(|(_, frames)| frames.clone())
    }

    /// Continue-to-send flow control from the addressed node
    fn flow_control_for(frame: &J1939Frame) -> Option<J1939Frame> {
        let byte0 = *frame.data.first()?;
        if !frame.is_iso_tp() || FrameKind::from_pci(byte0).ok()? != FrameKind::First {
            return None;
        }
        Some(J1939Frame::new(
            frame.pgn,
            frame.priority,
            frame.destination,
            frame.source,
            frame::continue_to_send(),
        ))
    }
}

#[async_trait]
impl TransportAdapter for MockTransportAdapter {
    async fn send(&self, frame: &J1939Frame) -> Result<(), TransportError> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(TransportError::ConnectionClosed);
        }

        // Simulate latency
        if self.config.latency_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.config.latency_ms)).await;
        }

        tracing::debug!(
            can_id = format!("0x{:08X}", frame.can_id()),
            data = ?frame.data,
            "Mock transport: sent frame"
        );
        self.sent.write().push(frame.clone());

        if let Some(peer) = &self.peer_tx {
            let _ = peer.send(frame.clone());
        }

        if self.config.auto_flow_control {
            if let Some(fc) = Self::flow_control_for(frame) {
                let _ = self.incoming_tx.send(fc);
            }
        }

        if let Some(replies) = self.find_response(&frame.data) {
            for reply in replies {
                let _ = self.incoming_tx.send(reply);
            }
        }

        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<J1939Frame> {
        self.incoming_tx.subscribe()
    }

    async fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_send_records_and_replies() {
        let mock = MockTransportAdapter::new(&MockConfig::default());
        let reply = J1939Frame::iso_tp(0x00, 0xF9, vec![0x02, 0x7E, 0x00]);
        mock.add_response(vec![0x02, 0x3E], vec![reply.clone()]);

        let mut rx = mock.subscribe();
        let request = J1939Frame::iso_tp(0xF9, 0x00, vec![0x02, 0x3E, 0x00, 0, 0, 0, 0, 0]);
        mock.send(&request).await.unwrap();

        assert_eq!(mock.sent_frames(), vec![request]);
        assert_eq!(rx.try_recv().unwrap(), reply);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_auto_flow_control() {
        let mock = MockTransportAdapter::new(&MockConfig {
            auto_flow_control: true,
            ..Default::default()
        });
        let mut rx = mock.subscribe();
        let first = J1939Frame::iso_tp(
            0x00,
            0xF9,
            vec![0x10, 0x09, 0x62, 0xF1, 0x90, 0x31, 0x58, 0x50],
        );
        mock.send(&first).await.unwrap();

        let fc = rx.try_recv().unwrap();
        assert_eq!(fc.source, 0xF9);
        assert_eq!(fc.destination, 0x00);
        assert_eq!(fc.data, vec![0x30, 0, 0, 0, 0, 0, 0, 0]);
    }

    #[tokio::test]
    async fn test_linked_pair_delivers_to_peer_only() {
        let (a, b) = MockTransportAdapter::linked_pair(&MockConfig::default());
        let mut a_rx = a.subscribe();
        let mut b_rx = b.subscribe();

        let frame = J1939Frame::iso_tp(0xF9, 0x00, vec![0x02, 0x10, 0x81]);
        a.send(&frame).await.unwrap();

        assert_eq!(b_rx.try_recv().unwrap(), frame);
        assert!(a_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_disconnected_send_fails() {
        let mock = MockTransportAdapter::new(&MockConfig::default());
        mock.set_connected(false);
        assert!(!mock.is_connected().await);
        let result = mock.send(&J1939Frame::iso_tp(0xF9, 0x00, vec![0x01, 0x3E])).await;
        assert!(matches!(result, Err(TransportError::ConnectionClosed)));
    }
}
