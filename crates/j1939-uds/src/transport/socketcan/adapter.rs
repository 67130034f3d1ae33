//! SocketCAN adapter using raw CAN frames with 29-bit J1939 identifiers

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use socketcan::{CanFrame, CanSocket, EmbeddedFrame, ExtendedId, Frame, Socket};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::config::SocketCanConfig;
use crate::j1939::J1939Frame;
use crate::transport::{TransportAdapter, TransportError, INBOUND_CHANNEL_CAPACITY};

/// Raw SocketCAN adapter
///
/// A blocking listener publishes every extended data frame as a
/// [`J1939Frame`]. Standard-ID, remote and error frames are ignored.
pub struct SocketCanAdapter {
    interface: String,
    socket: Arc<Mutex<CanSocket>>,
    connected: Arc<AtomicBool>,
    incoming_tx: broadcast::Sender<J1939Frame>,
    listener_handle: Mutex<Option<JoinHandle<()>>>,
}

impl SocketCanAdapter {
    pub async fn new(config: &SocketCanConfig) -> Result<Self, TransportError> {
        let socket = Self::open_socket(&config.interface)?;

        let (incoming_tx, _) = broadcast::channel(INBOUND_CHANNEL_CAPACITY);

        let adapter = Self {
            interface: config.interface.clone(),
            socket: Arc::new(Mutex::new(socket)),
            connected: Arc::new(AtomicBool::new(true)),
            incoming_tx,
            listener_handle: Mutex::new(None),
        };

        adapter.start_listener();

        tracing::info!(interface = %adapter.interface, "SocketCAN transport opened");
        Ok(adapter)
    }

    fn open_socket(interface: &str) -> Result<CanSocket, TransportError> {
        let socket = CanSocket::open(interface).map_err(|e| {
            TransportError::ConnectionFailed(format!(
                "Failed to open CAN socket {}: {}",
                interface, e
            ))
        })?;

        // Non-blocking so the listener can observe the connected flag
        socket.set_nonblocking(true).map_err(|e| {
            TransportError::InvalidConfig(format!("Failed to set non-blocking: {}", e))
        })?;

        Ok(socket)
    }

    fn start_listener(&self) {
        let socket = self.socket.clone();
        let incoming_tx = self.incoming_tx.clone();
        let connected = self.connected.clone();

        let handle = tokio::task::spawn_blocking(move || {
            while connected.load(Ordering::SeqCst) {
                let result = socket.lock().read_frame();
                match result {
                    Ok(CanFrame::Data(frame)) if EmbeddedFrame::is_extended(&frame) => {
                        let j1939 = J1939Frame::from_can_id(frame.raw_id(), frame.data());
                        tracing::trace!(
                            can_id = format!("0x{:08X}", frame.raw_id()),
                            data = ?j1939.data,
                            "Frame received"
                        );
                        // No receivers is not an error
                        let _ = incoming_tx.send(j1939);
                    }
                    Ok(_) => {}
                    Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                        std::thread::sleep(Duration::from_millis(1));
                    }
                    Err(e) => {
                        tracing::error!(?e, "SocketCAN read error");
                        std::thread::sleep(Duration::from_millis(100));
                    }
                }
            }
            tracing::debug!("SocketCAN listener stopped");
        });

        *self.listener_handle.lock() = Some(handle);
    }
}

#[async_trait]
impl TransportAdapter for SocketCanAdapter {
    async fn send(&self, frame: &J1939Frame) -> Result<(), TransportError> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(TransportError::ConnectionClosed);
        }

        let can_id = frame.can_id();
        let id = ExtendedId::new(can_id).ok_or_else(|| {
            TransportError::SendFailed(format!("Invalid extended CAN ID: 0x{:X}", can_id))
        })?;
        let can_frame = CanFrame::new(id, &frame.data).ok_or_else(|| {
            TransportError::SendFailed(format!("Invalid CAN data length: {}", frame.data.len()))
        })?;

        let socket = self.socket.clone();
        tokio::task::spawn_blocking(move || {
            socket
                .lock()
                .write_frame(&can_frame)
                .map_err(|e| TransportError::SendFailed(e.to_string()))
        })
        .await
        .map_err(|e| TransportError::SendFailed(format!("Task join error: {}", e)))??;

        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<J1939Frame> {
        self.incoming_tx.subscribe()
    }

    async fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

impl Drop for SocketCanAdapter {
    fn drop(&mut self) {
        self.connected.store(false, Ordering::SeqCst);
        if let Some(handle) = self.listener_handle.lock().take() {
            handle.abort();
        }
    }
}
