//! Session registry
//!
//! Owns every live transport, keyed by a server-generated session id, along
//! with its last-activity timestamp and expiry timer. All bookkeeping for a
//! session sits in one map entry behind one lock, so a session is either
//! fully registered or absent. Removal takes the entry out of the map under
//! the lock and closes the transport after releasing it: whichever path
//! removes the entry first is the only one that closes, and a transport's
//! close notification re-entering [`SessionRegistry::remove`] finds nothing
//! to do.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use uuid::Uuid;

use crate::error::{GatewayError, Result};
use crate::mcp::Transport;

/// Opaque server-generated session identifier
pub type SessionId = String;

struct SessionEntry {
    transport: Arc<dyn Transport>,
    last_activity: Instant,
    timer: Option<JoinHandle<()>>,
}

struct RegistryInner {
    sessions: Mutex<HashMap<SessionId, SessionEntry>>,
    /// Set by `shutdown`. Only read or written with `sessions` locked.
    closed: AtomicBool,
    timeout: Duration,
}

impl Drop for RegistryInner {
    fn drop(&mut self) {
        for entry in self.sessions.get_mut().values_mut() {
            if let Some(timer) = entry.timer.take() {
                timer.abort();
            }
        }
    }
}

/// Map from session id to transport with sliding expiry.
///
/// Cloning is cheap and yields a handle to the same registry. Expiry timers
/// and close notifications only hold weak references, so dropping the last
/// handle releases everything.
#[derive(Clone)]
pub struct SessionRegistry {
    inner: Arc<RegistryInner>,
}

/// Non-owning registry handle for timers, sweepers and close callbacks
#[derive(Clone)]
pub(crate) struct WeakSessionRegistry(Weak<RegistryInner>);

impl WeakSessionRegistry {
    pub(crate) fn upgrade(&self) -> Option<SessionRegistry> {
        self.0.upgrade().map(|inner| SessionRegistry { inner })
    }
}

impl SessionRegistry {
    /// Create an empty registry with the given idle timeout
    pub fn new(timeout: Duration) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                sessions: Mutex::new(HashMap::new()),
                closed: AtomicBool::new(false),
                timeout,
            }),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.inner.timeout
    }

    pub(crate) fn downgrade(&self) -> WeakSessionRegistry {
        WeakSessionRegistry(Arc::downgrade(&self.inner))
    }

    /// Store `transport` under a fresh id and arm its expiry timer.
    ///
    /// Fails once the registry has been shut down; the transport is left
    /// untouched for the caller to dispose of.
    pub fn register(&self, transport: Arc<dyn Transport>) -> Result<SessionId> {
        let session_id = Uuid::new_v4().to_string();
        let now = Instant::now();

        let mut sessions = self.inner.sessions.lock();
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(GatewayError::Internal(
                "session registry is shut down".to_string(),
            ));
        }
        let timer = self.arm_timer(&session_id, now + self.inner.timeout);
        sessions.insert(
            session_id.clone(),
            SessionEntry {
                transport,
                last_activity: now,
                timer,
            },
        );
        drop(sessions);

        tracing::debug!(session_id = %session_id, "Session registered");
        Ok(session_id)
    }

    /// Route the transport's own closure notification to
    /// `remove(session_id, already_closed = true)`.
    pub fn watch_close(&self, session_id: &str, transport: &dyn Transport) {
        let registry = self.downgrade();
        let session_id = session_id.to_string();
        transport.on_close(Box::new(move || {
            if let Some(registry) = registry.upgrade() {
                if registry.remove(&session_id, true) {
                    tracing::info!(session_id = %session_id, "Session closed");
                }
            }
        }));
    }

    pub fn lookup(&self, session_id: &str) -> Option<Arc<dyn Transport>> {
        self.inner
            .sessions
            .lock()
            .get(session_id)
            .map(|entry| entry.transport.clone())
    }

    pub fn contains(&self, session_id: &str) -> bool {
        self.inner.sessions.lock().contains_key(session_id)
    }

    pub fn last_activity(&self, session_id: &str) -> Option<Instant> {
        self.inner
            .sessions
            .lock()
            .get(session_id)
            .map(|entry| entry.last_activity)
    }

    /// Refresh last-activity and re-arm the expiry timer.
    ///
    /// Returns `false` if the session is not registered.
    pub fn touch(&self, session_id: &str) -> bool {
        let now = Instant::now();
        let mut sessions = self.inner.sessions.lock();
        let Some(entry) = sessions.get_mut(session_id) else {
            return false;
        };

        entry.last_activity = now;
        if let Some(timer) = entry.timer.take() {
            timer.abort();
        }
        entry.timer = self.arm_timer(session_id, now + self.inner.timeout);
        true
    }

    /// Remove a session. Idempotent: returns `false` if it was not present.
    ///
    /// Unless `already_closed` is set the transport is closed; close
    /// failures are logged and never returned.
    pub fn remove(&self, session_id: &str, already_closed: bool) -> bool {
        let entry = self.inner.sessions.lock().remove(session_id);
        match entry {
            Some(entry) => {
                dispose(session_id, entry, already_closed);
                true
            }
            None => false,
        }
    }

    /// Remove every session idle for at least the timeout.
    pub fn sweep_expired(&self) -> usize {
        self.sweep_expired_at(Instant::now())
    }

    /// [`sweep_expired`](Self::sweep_expired) against an explicit clock
    /// reading. Each entry is judged under the registry lock, so a session
    /// touched before the sweep reaches it survives.
    pub fn sweep_expired_at(&self, now: Instant) -> usize {
        let timeout = self.inner.timeout;
        let expired: Vec<(SessionId, SessionEntry)> = {
            let mut sessions = self.inner.sessions.lock();
            let ids: Vec<SessionId> = sessions
                .iter()
                .filter(|(_, entry)| is_expired(entry, now, timeout))
                .map(|(id, _)| id.clone())
                .collect();
            ids.into_iter()
                .filter_map(|id| sessions.remove_entry(&id))
                .collect()
        };

        let count = expired.len();
        for (session_id, entry) in expired {
            tracing::info!(session_id = %session_id, "Session expired");
            dispose(&session_id, entry, false);
        }
        count
    }

    /// Close and remove every session.
    pub fn drain_all(&self) -> usize {
        let drained: Vec<(SessionId, SessionEntry)> =
            self.inner.sessions.lock().drain().collect();
        dispose_all(drained)
    }

    /// Refuse further registrations and close every session. The flag is
    /// raised under the same lock that empties the map, so no registration
    /// can slip in between.
    pub fn shutdown(&self) -> usize {
        let drained: Vec<(SessionId, SessionEntry)> = {
            let mut sessions = self.inner.sessions.lock();
            self.inner.closed.store(true, Ordering::SeqCst);
            sessions.drain().collect()
        };
        dispose_all(drained)
    }

    pub fn is_shut_down(&self) -> bool {
        let _sessions = self.inner.sessions.lock();
        self.inner.closed.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.inner.sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.sessions.lock().is_empty()
    }

    pub fn session_ids(&self) -> Vec<SessionId> {
        self.inner.sessions.lock().keys().cloned().collect()
    }

    /// Number of expiry timers still pending
    pub fn armed_timers(&self) -> usize {
        self.inner
            .sessions
            .lock()
            .values()
            .filter(|entry| entry.timer.as_ref().is_some_and(|t| !t.is_finished()))
            .count()
    }

    /// Timer firing path. Presence and deadline are re-checked under the
    /// lock; a stale timer for a touched or removed session does nothing.
    fn expire(&self, session_id: &str) {
        let now = Instant::now();
        let timeout = self.inner.timeout;
        let entry = {
            let mut sessions = self.inner.sessions.lock();
            let due = sessions
                .get(session_id)
                .is_some_and(|entry| is_expired(entry, now, timeout));
            if due {
                sessions.remove(session_id)
            } else {
                None
            }
        };

        if let Some(mut entry) = entry {
            tracing::info!(session_id = %session_id, "Session timeout");
            // Running inside this timer's own task; detach instead of abort.
            entry.timer.take();
            dispose(session_id, entry, false);
        }
    }

    fn arm_timer(&self, session_id: &str, deadline: Instant) -> Option<JoinHandle<()>> {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            tracing::debug!(
                session_id = %session_id,
                "No Tokio runtime; session relies on the sweeper for expiry"
            );
            return None;
        };

        let registry = self.downgrade();
        let session_id = session_id.to_string();
        Some(handle.spawn(async move {
            tokio::time::sleep_until(deadline).await;
            if let Some(registry) = registry.upgrade() {
                registry.expire(&session_id);
            }
        }))
    }
}

fn is_expired(entry: &SessionEntry, now: Instant, timeout: Duration) -> bool {
    now.saturating_duration_since(entry.last_activity) >= timeout
}

fn dispose_all(drained: Vec<(SessionId, SessionEntry)>) -> usize {
    let count = drained.len();
    for (session_id, entry) in drained {
        dispose(&session_id, entry, false);
    }
    count
}

/// Release everything a removed entry holds. Called without the registry
/// lock so a close notification can re-enter the registry.
fn dispose(session_id: &str, entry: SessionEntry, already_closed: bool) {
    if let Some(timer) = entry.timer {
        timer.abort();
    }
    if !already_closed {
        if let Err(e) = entry.transport.close() {
            tracing::warn!(session_id = %session_id, "Error closing transport: {}", e);
        }
    }
}
