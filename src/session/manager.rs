//! Session lifecycle owner and shutdown coordinator

use std::sync::atomic::{AtomicBool, Ordering};

use super::registry::SessionRegistry;
use super::sweeper::ExpirySweeper;
use crate::config::SessionConfig;
use crate::error::Result;

/// Owns the registry and its expiry sweeper.
///
/// [`cleanup`](Self::cleanup) stops the sweeper and closes every session.
/// It is idempotent and also runs when the manager is dropped.
pub struct SessionManager {
    registry: SessionRegistry,
    sweeper: ExpirySweeper,
    config: SessionConfig,
    shut_down: AtomicBool,
}

impl SessionManager {
    /// Build a registry and start its sweeper. Needs a Tokio runtime.
    pub fn new(config: SessionConfig) -> Result<Self> {
        config.validate()?;
        let registry = SessionRegistry::new(config.session_timeout);
        let sweeper = ExpirySweeper::start(&registry, config.sweep_interval)?;

        tracing::info!(
            "Session manager started (timeout: {:?}, sweep interval: {:?})",
            config.session_timeout,
            config.sweep_interval
        );

        Ok(Self {
            registry,
            sweeper,
            config,
            shut_down: AtomicBool::new(false),
        })
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }

    /// Stop the sweeper, then close and remove all sessions. The registry
    /// refuses new sessions from here on.
    ///
    /// Returns the number of sessions closed by this call; a second call
    /// finds nothing left and returns 0.
    pub fn cleanup(&self) -> usize {
        let first = !self.shut_down.swap(true, Ordering::SeqCst);
        self.sweeper.stop();
        let closed = self.registry.shutdown();

        if first {
            tracing::info!("Shutting down: closed {} sessions", closed);
        } else if closed > 0 {
            tracing::debug!("Late cleanup closed {} sessions", closed);
        }
        closed
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        if !self.is_shut_down() {
            self.cleanup();
        }
    }
}
