//! Gateway configuration

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{GatewayError, Result};
use crate::mcp::ServerInfo;

/// Reference idle timeout for a session (30 minutes)
pub const DEFAULT_SESSION_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Reference sweep interval (one sixth of the session timeout)
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Session lifecycle policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    /// Sliding idle timeout, measured from the last routed message
    pub session_timeout: Duration,
    /// How often the expiry sweeper scans the registry
    pub sweep_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            session_timeout: DEFAULT_SESSION_TIMEOUT,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
        }
    }
}

impl SessionConfig {
    /// Set the timeout; the sweep interval follows at one sixth of it
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.session_timeout = timeout;
        self.sweep_interval = timeout / 6;
        self
    }

    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.session_timeout.is_zero() {
            return Err(GatewayError::Config(
                "session timeout must be greater than zero".to_string(),
            ));
        }
        if self.sweep_interval.is_zero() || self.sweep_interval >= self.session_timeout {
            return Err(GatewayError::Config(format!(
                "sweep interval ({:?}) must be non-zero and shorter than the session timeout ({:?})",
                self.sweep_interval, self.session_timeout
            )));
        }
        Ok(())
    }
}

/// Settings for the outbound HTTP tool invoker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvokerConfig {
    /// Base URL; the tool name is appended as the last path segment
    pub base_url: String,
    /// Header that carries the caller's credential downstream
    pub api_key_header: String,
    /// Per-call timeout
    pub timeout: Duration,
}

impl Default for InvokerConfig {
    fn default() -> Self {
        Self {
            base_url: "https://www.digistore24.com/api/call".to_string(),
            api_key_header: "X-DS-API-KEY".to_string(),
            timeout: Duration::from_secs(15),
        }
    }
}

/// Top-level gateway configuration
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub bind_addr: SocketAddr,
    pub server_info: ServerInfo,
    pub session: SessionConfig,
    pub invoker: InvokerConfig,
    /// JSON tool catalog; the built-in catalog is used when unset
    pub tool_catalog: Option<PathBuf>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 3000)),
            server_info: ServerInfo::default(),
            session: SessionConfig::default(),
            invoker: InvokerConfig::default(),
            tool_catalog: None,
        }
    }
}

impl GatewayConfig {
    pub fn with_port(mut self, port: u16) -> Self {
        self.bind_addr.set_port(port);
        self
    }

    pub fn with_session(mut self, session: SessionConfig) -> Self {
        self.session = session;
        self
    }

    pub fn validate(&self) -> Result<()> {
        self.session.validate()?;
        if self.invoker.base_url.trim().is_empty() {
            return Err(GatewayError::Config("invoker base URL is empty".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_follow_reference_policy() {
        let config = SessionConfig::default();
        assert_eq!(config.session_timeout, Duration::from_secs(1800));
        assert_eq!(config.sweep_interval, config.session_timeout / 6);
        assert!(config.validate().is_ok());
        assert!(GatewayConfig::default().validate().is_ok());
    }

    #[test]
    fn test_with_timeout_derives_interval() {
        let config = SessionConfig::default().with_timeout(Duration::from_secs(60));
        assert_eq!(config.sweep_interval, Duration::from_secs(10));
    }

    #[test]
    fn test_validate_rejects_bad_intervals() {
        let zero = SessionConfig::default().with_timeout(Duration::ZERO);
        assert!(zero.validate().is_err());

        let too_slow = SessionConfig::default().with_sweep_interval(Duration::from_secs(3600));
        assert!(too_slow.validate().is_err());
    }

    #[test]
    fn test_with_port() {
        let config = GatewayConfig::default().with_port(8080);
        assert_eq!(config.bind_addr.port(), 8080);
    }
}
