//! Error types for Toolgate

use axum::http::StatusCode;
use thiserror::Error;

/// Result type alias for Toolgate operations
pub type Result<T> = std::result::Result<T, GatewayError>;

/// Main error type for Toolgate
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Authentication required: Please provide your API key via Authorization: Bearer YOUR_KEY header")]
    AuthenticationRequired,

    #[error("Bad Request: {0}")]
    InvalidSession(String),

    #[error("Method Not Allowed: {0}")]
    MethodNotAllowed(String),

    #[error("Transport closed")]
    TransportClosed,

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Tool error: {0}")]
    Tool(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP request error: {0}")]
    #[cfg(feature = "http-invoker")]
    Http(#[from] reqwest::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// Session id absent on a message that cannot open a session
    pub fn missing_session() -> Self {
        GatewayError::InvalidSession("invalid session ID or method.".to_string())
    }

    /// Session id supplied but not registered (never issued, expired or closed)
    pub fn unknown_session(session_id: &str) -> Self {
        GatewayError::InvalidSession(format!("invalid or expired session ID: {}", session_id))
    }

    /// Get error code for MCP protocol
    pub fn code(&self) -> i64 {
        match self {
            GatewayError::InvalidInput(_) => -32602,
            GatewayError::Serialization(_) => -32700,
            GatewayError::MethodNotAllowed(_) => -32601,
            _ => -32000,
        }
    }

    /// HTTP status used when the error terminates a request at the gateway
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::AuthenticationRequired => StatusCode::UNAUTHORIZED,
            GatewayError::InvalidSession(_) | GatewayError::InvalidInput(_) => {
                StatusCode::BAD_REQUEST
            }
            GatewayError::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message exposed to HTTP clients. Internal failures are reported
    /// generically; the detail only goes to the log.
    pub fn public_message(&self) -> String {
        match self.status() {
            StatusCode::INTERNAL_SERVER_ERROR => "Internal server error.".to_string(),
            _ => self.to_string(),
        }
    }
}
