//! Downstream tool invocation
//!
//! A transport hands every validated `tools/call` to a [`ToolInvoker`]
//! together with the credential of the request that triggered it.

use async_trait::async_trait;
use serde_json::{Map, Value};

use super::protocol::{ToolCallResult, ToolDefinition};
use crate::context::Credential;
use crate::error::Result;

/// Executes a tool against the downstream API
#[async_trait]
pub trait ToolInvoker: Send + Sync {
    async fn invoke(
        &self,
        tool: &ToolDefinition,
        params: Map<String, Value>,
        credential: &Credential,
    ) -> Result<ToolCallResult>;
}

/// Flatten a parameter bag into form fields.
///
/// Nested objects become `key[nested]` fields, arrays are comma-joined and
/// null values are dropped.
pub fn flatten_params(params: &Map<String, Value>) -> Vec<(String, String)> {
    let mut fields = Vec::with_capacity(params.len());
    for (key, value) in params {
        match value {
            Value::Null => {}
            Value::Object(nested) => {
                for (nested_key, nested_value) in nested {
                    if let Some(text) = scalar_text(nested_value) {
                        fields.push((format!("{}[{}]", key, nested_key), text));
                    }
                }
            }
            other => {
                if let Some(text) = scalar_text(other) {
                    fields.push((key.clone(), text));
                }
            }
        }
    }
    fields
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Array(items) => Some(
            items
                .iter()
                .filter_map(scalar_text)
                .collect::<Vec<_>>()
                .join(","),
        ),
        other => Some(other.to_string()),
    }
}

#[cfg(feature = "http-invoker")]
pub use http::HttpToolInvoker;

#[cfg(feature = "http-invoker")]
mod http {
    use super::*;
    use crate::config::InvokerConfig;
    use crate::error::GatewayError;

    /// Posts form-encoded parameters to `<base_url>/<tool name>`
    pub struct HttpToolInvoker {
        client: reqwest::Client,
        base_url: String,
        api_key_header: String,
    }

    impl HttpToolInvoker {
        pub fn new(config: &InvokerConfig) -> Result<Self> {
            let client = reqwest::Client::builder()
                .timeout(config.timeout)
                .build()?;
            Ok(Self {
                client,
                base_url: config.base_url.trim_end_matches('/').to_string(),
                api_key_header: config.api_key_header.clone(),
            })
        }

        fn url_for(&self, tool: &ToolDefinition) -> String {
            format!("{}/{}", self.base_url, tool.name.trim_start_matches('/'))
        }
    }

    #[async_trait]
    impl ToolInvoker for HttpToolInvoker {
        async fn invoke(
            &self,
            tool: &ToolDefinition,
            params: Map<String, Value>,
            credential: &Credential,
        ) -> Result<ToolCallResult> {
            let url = self.url_for(tool);
            let fields = flatten_params(&params);
            tracing::debug!(tool = %tool.name, url = %url, fields = fields.len(), "Executing tool");

            let response = self
                .client
                .post(&url)
                .header(self.api_key_header.as_str(), credential.expose())
                .header(reqwest::header::ACCEPT, "application/json")
                .form(&fields)
                .send()
                .await?;

            let status = response.status();
            let text = response.text().await?;

            if !status.is_success() {
                return Err(GatewayError::Tool(format!(
                    "API Error: Status {} - {}",
                    status.as_u16(),
                    text
                )));
            }

            let body = if text.is_empty() {
                format!("(Status: {} - No body content)", status.as_u16())
            } else {
                serde_json::from_str::<Value>(&text)
                    .ok()
                    .and_then(|json| serde_json::to_string_pretty(&json).ok())
                    .unwrap_or(text)
            };

            Ok(ToolCallResult::text(format!(
                "API Response (Status: {}):\n{}",
                status.as_u16(),
                body
            )))
        }
    }

}
