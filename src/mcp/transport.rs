//! Per-session protocol transport
//!
//! A [`Transport`] consumes the raw JSON body of every POST addressed to its
//! session and produces the JSON-RPC response body. [`McpTransport`] is the
//! MCP implementation; the session layer only relies on the trait.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};

use super::invoker::ToolInvoker;
use super::protocol::{
    codes, methods, InitializeResult, McpRequest, McpResponse, ServerInfo, ToolCallResult,
    JSONRPC_VERSION,
};
use super::tools::{validate_arguments, ToolCatalog};
use crate::context;
use crate::error::{GatewayError, Result};

/// Invoked once when a transport closes
pub type CloseCallback = Box<dyn FnOnce() + Send + 'static>;

/// Stateful protocol handler bound to one session
#[async_trait]
pub trait Transport: Send + Sync {
    /// Handle one inbound body (a single message or a batch).
    ///
    /// Returns `Ok(None)` when nothing needs to be sent back, e.g. a body
    /// made only of notifications.
    async fn handle_message(&self, body: Value) -> Result<Option<Value>>;

    /// Close the transport. Closing twice is an error.
    fn close(&self) -> Result<()>;

    /// Register the closure notification. If the transport is already
    /// closed the callback runs immediately.
    fn on_close(&self, callback: CloseCallback);

    fn is_closed(&self) -> bool;
}

/// Creates a fresh transport for every accepted handshake
pub trait TransportFactory: Send + Sync {
    fn create(&self) -> Result<Arc<dyn Transport>>;
}

/// MCP JSON-RPC transport
pub struct McpTransport {
    catalog: Arc<ToolCatalog>,
    invoker: Arc<dyn ToolInvoker>,
    server_info: ServerInfo,
    initialized: AtomicBool,
    closed: AtomicBool,
    close_callback: Mutex<Option<CloseCallback>>,
}

impl McpTransport {
    pub fn new(
        catalog: Arc<ToolCatalog>,
        invoker: Arc<dyn ToolInvoker>,
        server_info: ServerInfo,
    ) -> Self {
        Self {
            catalog,
            invoker,
            server_info,
            initialized: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            close_callback: Mutex::new(None),
        }
    }

    /// Handle one element of a body. `None` for notifications.
    async fn handle_value(&self, value: Value) -> Option<McpResponse> {
        let request: McpRequest = match serde_json::from_value(value) {
            Ok(request) => request,
            Err(e) => {
                return Some(McpResponse::error(
                    None,
                    codes::INVALID_REQUEST,
                    format!("Invalid request: {}", e),
                ))
            }
        };

        if request.jsonrpc != JSONRPC_VERSION {
            return Some(McpResponse::error(
                request.id,
                codes::INVALID_REQUEST,
                format!("Unsupported jsonrpc version: {}", request.jsonrpc),
            ));
        }

        let notification = request.is_notification();
        let response = self.dispatch(request).await;
        if notification {
            None
        } else {
            Some(response)
        }
    }

    async fn dispatch(&self, request: McpRequest) -> McpResponse {
        match request.method.as_str() {
            methods::INITIALIZE => {
                if self.initialized.swap(true, Ordering::SeqCst) {
                    McpResponse::error(
                        request.id,
                        codes::INVALID_REQUEST,
                        "Server already initialized",
                    )
                } else {
                    let result = InitializeResult::new(self.server_info.clone());
                    McpResponse::success(request.id, json!(result))
                }
            }
            methods::INITIALIZED | methods::PING => McpResponse::success(request.id, json!({})),
            methods::LIST_TOOLS => {
                let tools = self.catalog.definitions();
                McpResponse::success(request.id, json!({ "tools": tools }))
            }
            methods::CALL_TOOL => self.call_tool(request.id, &request.params).await,
            _ => McpResponse::error(
                request.id,
                codes::METHOD_NOT_FOUND,
                format!("Method not found: {}", request.method),
            ),
        }
    }

    async fn call_tool(&self, id: Option<Value>, params: &Value) -> McpResponse {
        let Some(name) = params.get("name").and_then(Value::as_str) else {
            return McpResponse::error(
                id,
                codes::INVALID_PARAMS,
                "tools/call requires a 'name' field",
            );
        };

        let Some(tool) = self.catalog.get(name) else {
            tracing::warn!(tool = name, "Unknown tool requested");
            let result = ToolCallResult::error(format!("Unknown tool requested: {}", name));
            return McpResponse::success(id, json!(result));
        };

        let arguments = params.get("arguments").cloned().unwrap_or(Value::Null);
        let args = match validate_arguments(tool, arguments) {
            Ok(args) => args,
            Err(e) => return McpResponse::success(id, json!(ToolCallResult::error(e.to_string()))),
        };

        let Some(ctx) = context::current_context() else {
            return McpResponse::from_error(id, &GatewayError::AuthenticationRequired);
        };

        let result = match self.invoker.invoke(tool, args, ctx.credential()).await {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!(
                    tool = name,
                    session_id = ctx.session_id().unwrap_or("-"),
                    "Tool execution failed: {}",
                    e
                );
                ToolCallResult::error(e.to_string())
            }
        };
        McpResponse::success(id, json!(result))
    }
}

#[async_trait]
impl Transport for McpTransport {
    async fn handle_message(&self, body: Value) -> Result<Option<Value>> {
        if self.is_closed() {
            return Err(GatewayError::TransportClosed);
        }

        match body {
            Value::Null => Ok(Some(json!(McpResponse::error(
                None,
                codes::PARSE_ERROR,
                "Parse error: body is not valid JSON",
            )))),
            Value::Array(items) => {
                if items.is_empty() {
                    return Ok(Some(json!(McpResponse::error(
                        None,
                        codes::INVALID_REQUEST,
                        "Invalid request: empty batch",
                    ))));
                }
                let mut responses = Vec::with_capacity(items.len());
                for item in items {
                    if let Some(response) = self.handle_value(item).await {
                        responses.push(response);
                    }
                }
                if responses.is_empty() {
                    Ok(None)
                } else {
                    Ok(Some(serde_json::to_value(responses)?))
                }
            }
            single => match self.handle_value(single).await {
                Some(response) => Ok(Some(serde_json::to_value(response)?)),
                None => Ok(None),
            },
        }
    }

    fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Err(GatewayError::TransportClosed);
        }
        let callback = self.close_callback.lock().take();
        if let Some(callback) = callback {
            callback();
        }
        Ok(())
    }

    fn on_close(&self, callback: CloseCallback) {
        if self.is_closed() {
            callback();
            return;
        }
        *self.close_callback.lock() = Some(callback);
        // close() may have raced in between; make sure the callback still runs.
        if self.is_closed() {
            if let Some(callback) = self.close_callback.lock().take() {
                callback();
            }
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Builds [`McpTransport`]s sharing one catalog and invoker
pub struct McpTransportFactory {
    catalog: Arc<ToolCatalog>,
    invoker: Arc<dyn ToolInvoker>,
    server_info: ServerInfo,
}

impl McpTransportFactory {
    pub fn new(
        catalog: Arc<ToolCatalog>,
        invoker: Arc<dyn ToolInvoker>,
        server_info: ServerInfo,
    ) -> Self {
        Self {
            catalog,
            invoker,
            server_info,
        }
    }
}

impl TransportFactory for McpTransportFactory {
    fn create(&self) -> Result<Arc<dyn Transport>> {
        Ok(Arc::new(McpTransport::new(
            self.catalog.clone(),
            self.invoker.clone(),
            self.server_info.clone(),
        )))
    }
}
