//! Session lifecycle
//!
//! The registry of live transports, the handshake that opens sessions, the
//! expiry sweeper and the shutdown coordinator.

pub mod handshake;
pub mod manager;
pub mod registry;
pub mod sweeper;

#[cfg(test)]
pub(crate) mod testing;

pub use handshake::{RoutedMessage, SessionRouter, SessionState};
pub use manager::SessionManager;
pub use registry::{SessionId, SessionRegistry};
pub use sweeper::ExpirySweeper;
