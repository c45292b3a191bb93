//! Streamable HTTP endpoint
//!
//! A single `POST /mcp` route carries every MCP message. Requests are
//! authenticated first, then handed to the [`SessionRouter`] together with
//! the `mcp-session-id` header. Any other method on the endpoint is refused
//! with 405.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde_json::{json, Value};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use uuid::Uuid;

use crate::config::GatewayConfig;
use crate::context::Credential;
use crate::error::{GatewayError, Result};
use crate::mcp::protocol::codes;
use crate::mcp::{McpTransportFactory, ToolCatalog, ToolInvoker, TransportFactory};
use crate::session::{SessionManager, SessionRouter};

/// Header carrying the session id in both directions
pub const SESSION_ID_HEADER: &str = "mcp-session-id";

/// Path of the MCP endpoint
pub const MCP_PATH: &str = "/mcp";

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self);
        }

        let body = json!({
            "jsonrpc": "2.0",
            "error": {
                "code": codes::SERVER_ERROR,
                "message": self.public_message(),
            },
            "id": Uuid::new_v4().to_string(),
        });

        let mut response = (status, Json(body)).into_response();
        if status == StatusCode::METHOD_NOT_ALLOWED {
            response
                .headers_mut()
                .insert(header::ALLOW, HeaderValue::from_static("POST"));
        }
        response
    }
}

/// MCP gateway HTTP server
pub struct HttpServer {
    router: SessionRouter,
    addr: SocketAddr,
}

impl HttpServer {
    /// Wrap an existing session router
    pub fn new(router: SessionRouter, addr: SocketAddr) -> Self {
        Self { router, addr }
    }

    /// Build the full stack from configuration: tool catalog, transport
    /// factory, session manager (which starts the expiry sweeper).
    pub fn from_config(config: &GatewayConfig, invoker: Arc<dyn ToolInvoker>) -> Result<Self> {
        config.validate()?;

        let catalog = match &config.tool_catalog {
            Some(path) => ToolCatalog::from_file(path)?,
            None => ToolCatalog::builtin(),
        };
        let factory: Arc<dyn TransportFactory> = Arc::new(McpTransportFactory::new(
            Arc::new(catalog),
            invoker,
            config.server_info.clone(),
        ));
        let manager = Arc::new(SessionManager::new(config.session)?);

        Ok(Self::new(SessionRouter::new(manager, factory), config.bind_addr))
    }

    pub fn session_router(&self) -> &SessionRouter {
        &self.router
    }

    pub fn manager(&self) -> &Arc<SessionManager> {
        self.router.manager()
    }

    /// Build the axum router
    pub fn router(session_router: SessionRouter) -> Router {
        Router::new()
            .route(MCP_PATH, post(handle_post).fallback(handle_other_method))
            .layer(
                ServiceBuilder::new()
                    .layer(TraceLayer::new_for_http())
                    .layer(CorsLayer::permissive()),
            )
            .with_state(session_router)
    }

    /// Serve until Ctrl-C or SIGTERM, then close every session
    pub async fn start(self) -> Result<()> {
        self.start_with_shutdown(shutdown_signal()).await
    }

    /// Serve until `signal` resolves, then close every session
    pub async fn start_with_shutdown<F>(self, signal: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let manager = self.router.manager().clone();
        let app = Self::router(self.router);

        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        tracing::info!(
            "MCP gateway listening on http://{}{}",
            listener.local_addr()?,
            MCP_PATH
        );

        let served = axum::serve(listener, app)
            .with_graceful_shutdown(signal)
            .await;

        manager.cleanup();
        tracing::info!("Server shutdown complete");
        served?;
        Ok(())
    }
}

async fn handle_post(
    State(router): State<SessionRouter>,
    headers: HeaderMap,
    body: Bytes,
) -> std::result::Result<Response, GatewayError> {
    let authorization = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok());
    let credential = Credential::from_authorization_header(authorization)?;

    let session_id = match headers.get(SESSION_ID_HEADER) {
        Some(value) => Some(value.to_str().map_err(|_| {
            GatewayError::InvalidSession("session ID header is not valid UTF-8".to_string())
        })?),
        None => None,
    };

    // Unparsable bodies are passed on as null: they never open a session
    // and an existing session's transport answers with a parse error.
    let body: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);

    let routed = router.route(credential, session_id, body).await?;

    let mut response = match routed.body {
        Some(body) => (StatusCode::OK, Json(body)).into_response(),
        None => StatusCode::ACCEPTED.into_response(),
    };
    if let Ok(value) = HeaderValue::from_str(&routed.session_id) {
        response.headers_mut().insert(SESSION_ID_HEADER, value);
    }
    Ok(response)
}

async fn handle_other_method(method: Method) -> GatewayError {
    GatewayError::MethodNotAllowed(method.to_string())
}

/// Resolves on Ctrl-C, or SIGTERM on unix
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl-C, shutting down"),
        _ = terminate => tracing::info!("Received SIGTERM, shutting down"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    #[tokio::test]
    async fn test_error_body_shape() {
        let response = GatewayError::missing_session().into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["jsonrpc"], "2.0");
        assert_eq!(body["error"]["code"], -32000);
        assert_eq!(
            body["error"]["message"],
            "Bad Request: invalid session ID or method."
        );
        assert!(Uuid::parse_str(body["id"].as_str().unwrap()).is_ok());
    }

    #[tokio::test]
    async fn test_internal_error_hides_detail() {
        let response = GatewayError::Internal("db password leaked".into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"]["message"], "Internal server error.");
    }

    #[test]
    fn test_method_not_allowed_sets_allow() {
        let response = GatewayError::MethodNotAllowed("GET".into()).into_response();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(response.headers()[header::ALLOW], "POST");
    }
}
