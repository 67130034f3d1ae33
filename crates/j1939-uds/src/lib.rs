//! j1939-uds - ISO-TP over J1939 reassembly and UDS interpretation
//!
//! This crate reconstructs multi-frame ISO 15765-2 messages carried in SAE
//! J1939 PGN 0xDA00 frames, interprets the payloads as UDS (ISO 14229-1)
//! and correlates requests with their responses.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    RequestCorrelator                        │
//! │  read_data_by_identifier / exchange ──► ComponentRegistry   │
//! │                          │                                  │
//! │                    ┌─────┴─────┐      ┌───────────────┐     │
//! │                    │IsoTpDriver│─────►│ UdsMessageLog │     │
//! │                    │ (receive) │      │ (passive)     │     │
//! │                    └─────┬─────┘      └───────────────┘     │
//! │              ┌───────────┴───────────┐                      │
//! │      ┌───────┴───────┐      ┌────────┴─────────┐            │
//! │      │ IsoTpFrame    │      │ReassemblyManager │            │
//! │      │ (classify)    │      │ (per source)     │            │
//! │      └───────────────┘      └──────────────────┘            │
//! │                          │                                  │
//! │                 ┌────────┴────────┐                         │
//! │                 │TransportAdapter │                         │
//! │                 │(SocketCAN/mock) │                         │
//! │                 └─────────────────┘                         │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod correlator;
pub mod driver;
pub mod error;
pub mod frame;
pub mod j1939;
pub mod reassembly;
pub mod registry;
pub mod transport;
pub mod uds;

pub use config::{CorrelatorConfig, DriverConfig, J1939UdsConfig, TransportConfig};
pub use correlator::RequestCorrelator;
pub use driver::{DriverStats, IsoTpDriver, ReceivedMessage};
pub use error::{Error, Result};
pub use frame::{FrameError, IsoTpFrame};
pub use j1939::{J1939Frame, ISO_PGN};
pub use reassembly::{ReassemblyManager, ReceiveMode};
pub use registry::{ComponentRegistry, SourceNames};
pub use transport::{create_transport, TransportAdapter, TransportError};
pub use uds::{decode, service_name, UdsMessage, UdsMessageLog};
