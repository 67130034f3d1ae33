//! Transport adapter trait

use async_trait::async_trait;
use tokio::sync::broadcast;

use super::TransportError;
use crate::j1939::J1939Frame;

/// Bus-agnostic interface for sending and receiving J1939 frames
///
/// Implementations must be safe for concurrent use: the receive driver, the
/// correlator and the responder may all send through the same adapter.
#[async_trait]
pub trait TransportAdapter: Send + Sync {
    /// Send one frame (fire-and-forget, no delivery acknowledgment)
    async fn send(&self, frame: &J1939Frame) -> Result<(), TransportError>;

    /// Subscribe to inbound frames
    ///
    /// Each receiver sees every frame received after it subscribed, in bus
    /// order. Slow receivers lose the oldest frames.
    fn subscribe(&self) -> broadcast::Receiver<J1939Frame>;

    /// Check if the transport is connected
    async fn is_connected(&self) -> bool;
}
