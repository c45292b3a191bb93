//! Test doubles shared by the session tests

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};

use crate::context;
use crate::error::{GatewayError, Result};
use crate::mcp::{CloseCallback, Transport, TransportFactory};

/// Records calls; echoes the body together with the credential in scope
#[derive(Default)]
pub(crate) struct MockTransport {
    fail_close: bool,
    fail_messages: bool,
    closed: AtomicBool,
    close_calls: AtomicUsize,
    messages: AtomicUsize,
    callback: Mutex<Option<CloseCallback>>,
}

impl MockTransport {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn failing_close() -> Arc<Self> {
        Arc::new(Self {
            fail_close: true,
            ..Self::default()
        })
    }

    pub(crate) fn failing_messages() -> Arc<Self> {
        Arc::new(Self {
            fail_messages: true,
            ..Self::default()
        })
    }

    pub(crate) fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn messages(&self) -> usize {
        self.messages.load(Ordering::SeqCst)
    }

    /// Close from the remote side: fires the callback without counting as
    /// a `close()` call.
    pub(crate) fn closed_by_peer(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(callback) = self.callback.lock().take() {
            callback();
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn handle_message(&self, body: Value) -> Result<Option<Value>> {
        self.messages.fetch_add(1, Ordering::SeqCst);
        if self.fail_messages {
            return Err(GatewayError::Internal("transport failed mid-message".into()));
        }
        tokio::task::yield_now().await;
        let ctx = context::current_context();
        Ok(Some(json!({
            "jsonrpc": "2.0",
            "id": body.get("id").cloned().unwrap_or(Value::Null),
            "result": {
                "credential": ctx.as_ref().map(|c| c.credential().expose().to_string()),
                "session_id": ctx.as_ref().and_then(|c| c.session_id().map(str::to_string)),
            }
        })))
    }

    fn close(&self) -> Result<()> {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        if self.closed.swap(true, Ordering::SeqCst) {
            return Err(GatewayError::TransportClosed);
        }
        if let Some(callback) = self.callback.lock().take() {
            callback();
        }
        if self.fail_close {
            return Err(GatewayError::Internal("close failed".into()));
        }
        Ok(())
    }

    fn on_close(&self, callback: CloseCallback) {
        if self.is_closed() {
            callback();
        } else {
            *self.callback.lock() = Some(callback);
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Hands out [`MockTransport`]s and keeps them for inspection
#[derive(Default)]
pub(crate) struct MockFactory {
    pub(crate) created: Mutex<Vec<Arc<MockTransport>>>,
    pub(crate) fail_messages: bool,
    pub(crate) fail_create: bool,
}

impl MockFactory {
    pub(crate) fn created(&self) -> Vec<Arc<MockTransport>> {
        self.created.lock().clone()
    }
}

impl TransportFactory for MockFactory {
    fn create(&self) -> Result<Arc<dyn Transport>> {
        if self.fail_create {
            return Err(GatewayError::Internal("factory unavailable".into()));
        }
        let transport = if self.fail_messages {
            MockTransport::failing_messages()
        } else {
            MockTransport::new()
        };
        self.created.lock().push(transport.clone());
        Ok(transport)
    }
}

/// Let spawned timer tasks run after the paused clock moved
pub(crate) async fn settle() {
    for _ in 0..8 {
        tokio::task::yield_now().await;
    }
}
