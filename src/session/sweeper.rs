//! Periodic expiry sweep
//!
//! Backstop for the per-session timers: every interval the registry is
//! scanned and idle sessions are removed. The task holds only a weak
//! registry handle and is a plain Tokio task, so it never keeps the process
//! alive by itself.

use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use super::registry::SessionRegistry;
use crate::error::{GatewayError, Result};

/// Background task calling [`SessionRegistry::sweep_expired`] on a fixed interval
pub struct ExpirySweeper {
    handle: Mutex<Option<JoinHandle<()>>>,
    interval: Duration,
}

impl ExpirySweeper {
    /// Start sweeping `registry` every `interval`. Needs a Tokio runtime.
    pub fn start(registry: &SessionRegistry, interval: Duration) -> Result<Self> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|e| {
            GatewayError::Internal(format!("expiry sweeper needs a Tokio runtime: {}", e))
        })?;
        if interval.is_zero() {
            return Err(GatewayError::Config(
                "sweep interval must be greater than zero".to_string(),
            ));
        }

        let registry = registry.downgrade();
        let first_tick = Instant::now() + interval;
        let handle = runtime.spawn(async move {
            let mut ticker = interval_at(first_tick, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                let Some(registry) = registry.upgrade() else {
                    break;
                };
                let removed = registry.sweep_expired();
                if removed > 0 {
                    tracing::info!(count = removed, "Cleaned up expired sessions");
                }
            }
        });

        tracing::debug!("Expiry sweeper started (interval: {:?})", interval);
        Ok(Self {
            handle: Mutex::new(Some(handle)),
            interval,
        })
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Cancel the recurring sweep. Returns `false` if it was already stopped.
    pub fn stop(&self) -> bool {
        match self.handle.lock().take() {
            Some(handle) => {
                handle.abort();
                tracing::debug!("Expiry sweeper stopped");
                true
            }
            None => false,
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

impl Drop for ExpirySweeper {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.get_mut().take() {
            handle.abort();
        }
    }
}
