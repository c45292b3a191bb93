//! MCP (Model Context Protocol) implementation
//!
//! JSON-RPC message types, the per-session transport, the tool catalog and
//! the downstream invoker seam.

pub mod invoker;
pub mod protocol;
pub mod tools;
pub mod transport;

#[cfg(feature = "http-invoker")]
pub use invoker::HttpToolInvoker;
pub use invoker::ToolInvoker;
pub use protocol::{
    is_initialize_request, methods, InitializeResult, McpRequest, McpResponse, ServerInfo,
    ToolCallResult, ToolDefinition,
};
pub use tools::{get_tool_definitions, validate_arguments, ToolCatalog, DEFAULT_TOOL_DEFINITIONS};
pub use transport::{CloseCallback, McpTransport, McpTransportFactory, Transport, TransportFactory};
