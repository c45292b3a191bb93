//! Toolgate - MCP gateway over streamable HTTP
//!
//! Multiplexes many MCP client sessions over one HTTP endpoint, binds each
//! session to its own protocol transport, and carries the caller's bearer
//! credential through every tool call made on its behalf.

pub mod config;
pub mod context;
pub mod error;
pub mod http;
pub mod mcp;
pub mod session;

pub use config::{GatewayConfig, InvokerConfig, SessionConfig};
pub use context::{Credential, ExecutionContext};
pub use error::{GatewayError, Result};
pub use http::HttpServer;
pub use session::{SessionManager, SessionRegistry, SessionRouter};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
