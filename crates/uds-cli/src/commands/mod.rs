//! Command implementations for uds-cli

pub mod decode;
pub mod monitor;
pub mod read;
pub mod session;

pub use decode::decode;
pub use monitor::monitor;
pub use read::read_did;
pub use session::session;
