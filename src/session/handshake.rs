//! Transport handshake state machine
//!
//! Decides, per inbound message, whether it belongs to an existing session,
//! opens a new one, or is rejected. The credential must already be resolved
//! by the caller; classification never runs for unauthenticated requests.

use std::sync::Arc;

use serde_json::Value;

use super::manager::SessionManager;
use super::registry::SessionId;
use crate::context::{run_with_context, Credential, ExecutionContext};
use crate::error::{GatewayError, Result};
use crate::mcp::{is_initialize_request, Transport, TransportFactory};

/// Where an inbound session header points
pub enum SessionState {
    NoSession,
    Known {
        session_id: SessionId,
        transport: Arc<dyn Transport>,
    },
    Unknown {
        session_id: SessionId,
    },
}

impl SessionState {
    /// Classify a session header against the manager's registry.
    /// An empty header counts as absent.
    pub fn classify(manager: &SessionManager, session_id: Option<&str>) -> Self {
        match session_id.filter(|id| !id.is_empty()) {
            None => SessionState::NoSession,
            Some(id) => match manager.registry().lookup(id) {
                Some(transport) => SessionState::Known {
                    session_id: id.to_string(),
                    transport,
                },
                None => SessionState::Unknown {
                    session_id: id.to_string(),
                },
            },
        }
    }
}

impl std::fmt::Debug for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::NoSession => f.write_str("NoSession"),
            SessionState::Known { session_id, .. } => {
                f.debug_struct("Known").field("session_id", session_id).finish()
            }
            SessionState::Unknown { session_id } => {
                f.debug_struct("Unknown").field("session_id", session_id).finish()
            }
        }
    }
}

/// Outcome of routing one message
#[derive(Debug, Clone, PartialEq)]
pub struct RoutedMessage {
    /// Session the message was handled by; sent back in the response header
    pub session_id: SessionId,
    /// `true` when this message opened the session
    pub created: bool,
    /// Response body, `None` when there is nothing to send back
    pub body: Option<Value>,
}

/// Routes messages to session transports, opening sessions on initialize
#[derive(Clone)]
pub struct SessionRouter {
    manager: Arc<SessionManager>,
    factory: Arc<dyn TransportFactory>,
}

impl SessionRouter {
    pub fn new(manager: Arc<SessionManager>, factory: Arc<dyn TransportFactory>) -> Self {
        Self { manager, factory }
    }

    pub fn manager(&self) -> &Arc<SessionManager> {
        &self.manager
    }

    /// Route `body` from an authenticated caller.
    pub async fn route(
        &self,
        credential: Credential,
        session_id: Option<&str>,
        body: Value,
    ) -> Result<RoutedMessage> {
        match SessionState::classify(&self.manager, session_id) {
            SessionState::Known {
                session_id,
                transport,
            } => {
                self.route_existing(credential, session_id, transport, body)
                    .await
            }
            SessionState::NoSession if is_initialize_request(&body) => {
                self.open_session(credential, body).await
            }
            SessionState::NoSession => Err(GatewayError::missing_session()),
            SessionState::Unknown { session_id } => {
                tracing::debug!(session_id = %session_id, "Rejected unknown session");
                Err(GatewayError::unknown_session(&session_id))
            }
        }
    }

    async fn route_existing(
        &self,
        credential: Credential,
        session_id: SessionId,
        transport: Arc<dyn Transport>,
        body: Value,
    ) -> Result<RoutedMessage> {
        let ctx = ExecutionContext::new(credential, Some(session_id.clone()));
        match run_with_context(ctx, transport.handle_message(body)).await {
            Ok(response) => {
                self.manager.registry().touch(&session_id);
                Ok(RoutedMessage {
                    session_id,
                    created: false,
                    body: response,
                })
            }
            Err(e) => {
                tracing::error!(session_id = %session_id, "Error handling message: {}", e);
                Err(GatewayError::Internal(format!(
                    "message handling failed for session {}",
                    session_id
                )))
            }
        }
    }

    async fn open_session(&self, credential: Credential, body: Value) -> Result<RoutedMessage> {
        if self.manager.is_shut_down() {
            return Err(GatewayError::Internal(
                "gateway is shutting down".to_string(),
            ));
        }

        let transport = self.factory.create().map_err(|e| {
            tracing::error!("Failed to create transport: {}", e);
            GatewayError::Internal(format!("transport creation failed: {}", e))
        })?;

        let registry = self.manager.registry();
        let session_id = match registry.register(transport.clone()) {
            Ok(session_id) => session_id,
            Err(e) => {
                tracing::warn!("Session refused: {}", e);
                if let Err(e) = transport.close() {
                    tracing::warn!("Error closing refused transport: {}", e);
                }
                return Err(GatewayError::Internal(
                    "gateway is shutting down".to_string(),
                ));
            }
        };
        registry.watch_close(&session_id, transport.as_ref());
        tracing::info!(session_id = %session_id, "Session initialized");

        let ctx = ExecutionContext::new(credential, Some(session_id.clone()));
        match run_with_context(ctx, transport.handle_message(body)).await {
            Ok(response) => Ok(RoutedMessage {
                session_id,
                created: true,
                body: response,
            }),
            Err(e) => {
                tracing::error!(session_id = %session_id, "Initialize failed: {}", e);
                registry.remove(&session_id, false);
                Err(GatewayError::Internal(format!("initialize failed: {}", e)))
            }
        }
    }
}
