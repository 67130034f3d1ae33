//! Transport layer for J1939 frames
//!
//! This module provides transport adapters for the CAN bus:
//! - SocketCAN adapter with raw 29-bit frames (Linux only)
//! - Mock adapter for testing, including a back-to-back linked pair
//!
//! # Example
//!
//! ```ignore
//! use j1939_uds::transport::{create_transport, TransportAdapter};
//! use j1939_uds::config::TransportConfig;
//!
//! let config = TransportConfig::Mock(Default::default());
//! let transport = create_transport(&config).await?;
//! transport.send(&J1939Frame::iso_tp(0xF9, 0x00, [0x02, 0x3E, 0x00])).await?;
//! ```

mod adapter;
pub mod error;
pub mod mock;

#[cfg(all(target_os = "linux", feature = "socketcan"))]
pub mod socketcan;

pub use adapter::TransportAdapter;
pub use error::TransportError;

use std::sync::Arc;

use crate::config::TransportConfig;

/// Capacity of each inbound broadcast channel
pub const INBOUND_CHANNEL_CAPACITY: usize = 1024;

/// Create a transport adapter based on configuration
pub async fn create_transport(
    config: &TransportConfig,
) -> Result<Arc<dyn TransportAdapter>, TransportError> {
    match config {
        #[cfg(all(target_os = "linux", feature = "socketcan"))]
        TransportConfig::SocketCan(cfg) => {
            let adapter = socketcan::SocketCanAdapter::new(cfg).await?;
            Ok(Arc::new(adapter))
        }
        #[cfg(not(all(target_os = "linux", feature = "socketcan")))]
        TransportConfig::SocketCan(_) => Err(TransportError::Unsupported(
            "SocketCAN requires Linux and the 'socketcan' feature".to_string(),
        )),
        TransportConfig::Mock(cfg) => {
            let adapter = mock::MockTransportAdapter::new(cfg);
            Ok(Arc::new(adapter))
        }
    }
}
