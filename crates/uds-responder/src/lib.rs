//! uds-responder - Scripted ECU replaying recorded UDS sessions over J1939
//!
//! Provides the pieces behind the `uds-responder` binary.
//!
//! # Modules
//!
//! - [`trace`] - Recorded trace loading and record validation
//! - [`table`] - Request/response pairing and pre-segmented responses
//! - [`fixtures`] - Fixed answers to J1939 request-PGN frames
//! - [`responder`] - The serving loop with flow-control pacing
//! - [`config`] - TOML configuration

pub mod config;
pub mod error;
pub mod fixtures;
pub mod responder;
pub mod table;
pub mod trace;

pub use config::{FixtureConfig, ResponderConfig};
pub use error::ResponderError;
pub use fixtures::Fixtures;
pub use responder::{ResponderStats, ScriptedResponder};
pub use table::{RequestKey, ResponseEntry, ResponseTable};
pub use trace::{RecordedTrace, TraceError, TraceRecord};
