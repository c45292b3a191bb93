//! Toolgate MCP gateway
//!
//! Run with: toolgate-server

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use toolgate::config::{GatewayConfig, InvokerConfig, SessionConfig};
use toolgate::error::Result;
use toolgate::http::HttpServer;
use toolgate::mcp::{HttpToolInvoker, ServerInfo, ToolInvoker};

#[derive(Parser, Debug)]
#[command(name = "toolgate-server")]
#[command(about = "Session-multiplexed MCP gateway over streamable HTTP")]
struct Args {
    /// Port to listen on
    #[arg(long, env = "PORT", default_value = "3000")]
    port: u16,

    /// Idle session timeout in seconds
    #[arg(long, env = "TOOLGATE_SESSION_TIMEOUT", default_value = "1800")]
    session_timeout_secs: u64,

    /// Expiry sweep interval in seconds (default: one sixth of the timeout)
    #[arg(long, env = "TOOLGATE_SWEEP_INTERVAL")]
    sweep_interval_secs: Option<u64>,

    /// JSON file with tool definitions (built-in catalog when unset)
    #[arg(long, env = "TOOLGATE_TOOLS_PATH")]
    tools_path: Option<String>,

    /// Base URL of the downstream API; the tool name is appended
    #[arg(
        long,
        env = "TOOLGATE_API_BASE_URL",
        default_value = "https://www.digistore24.com/api/call"
    )]
    api_base_url: String,

    /// Header carrying the caller's key to the downstream API
    #[arg(long, env = "TOOLGATE_API_KEY_HEADER", default_value = "X-DS-API-KEY")]
    api_key_header: String,

    /// Downstream call timeout in seconds
    #[arg(long, env = "TOOLGATE_INVOKER_TIMEOUT", default_value = "15")]
    invoker_timeout_secs: u64,

    /// Server name reported in the initialize result
    #[arg(long, env = "TOOLGATE_SERVER_NAME", default_value = "toolgate")]
    server_name: String,
}

impl Args {
    fn into_config(self) -> GatewayConfig {
        let timeout = Duration::from_secs(self.session_timeout_secs);
        let mut session = SessionConfig::default().with_timeout(timeout);
        if let Some(secs) = self.sweep_interval_secs {
            session = session.with_sweep_interval(Duration::from_secs(secs));
        }

        GatewayConfig {
            server_info: ServerInfo {
                name: self.server_name,
                ..ServerInfo::default()
            },
            invoker: InvokerConfig {
                base_url: self.api_base_url,
                api_key_header: self.api_key_header,
                timeout: Duration::from_secs(self.invoker_timeout_secs),
            },
            // Expand ~ in path
            tool_catalog: self
                .tools_path
                .map(|path| PathBuf::from(shellexpand::tilde(&path).to_string())),
            ..GatewayConfig::default()
        }
        .with_session(session)
        .with_port(self.port)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging to stderr
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(false),
        )
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = Args::parse().into_config();
    let invoker: Arc<dyn ToolInvoker> = Arc::new(HttpToolInvoker::new(&config.invoker)?);
    let server = HttpServer::from_config(&config, invoker)?;

    tracing::info!("Toolgate MCP gateway starting...");
    server.start().await
}
