use crate::core::{AppId, CloneError, Result};
use crate::protocol::DEFAULT_MAX_FRAME_BYTES;
use std::time::Duration;

pub const APP_PORT_VAR: &str = "HC_PORT";
pub const ADMIN_PORT_VAR: &str = "ADMIN_PORT";
pub const HOST_VAR: &str = "CLONECELL_HOST";
pub const APP_ID_VAR: &str = "CLONECELL_APP_ID";
pub const DEFAULT_APP_ID: &str = "clone-test";

/// Endpoint configuration for one RPC channel
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Backend host
    pub host: String,

    /// Backend port
    pub port: u16,

    /// Connection timeout
    pub connect_timeout: Duration,

    /// Per-call timeout
    pub call_timeout: Option<Duration>,

    /// Largest accepted response frame
    pub max_frame_bytes: usize,
}

impl ChannelConfig {
    /// Create a configuration for `localhost:port`
    pub fn new(port: u16) -> Self {
        Self {
            host: "localhost".to_string(),
            port,
            connect_timeout: Duration::from_secs(10),
            call_timeout: Some(Duration::from_secs(30)),
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
        }
    }

    /// Set the host
    pub fn host(mut self, host: &str) -> Self {
        self.host = host.to_string();
        self
    }

    /// Set the port
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set connection timeout
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set per-call timeout
    pub fn call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = Some(timeout);
        self
    }

    /// Disable the per-call timeout
    pub fn no_call_timeout(mut self) -> Self {
        self.call_timeout = None;
        self
    }

    /// Set the frame size limit
    pub fn max_frame_bytes(mut self, bytes: usize) -> Self {
        self.max_frame_bytes = bytes;
        self
    }

    /// Parse from an endpoint string
    ///
    /// Format: "tcp://host:port"
    pub fn from_url(url: &str) -> std::result::Result<Self, String> {
        let rest = url
            .strip_prefix("tcp://")
            .ok_or_else(|| "URL must start with 'tcp://'".to_string())?;
        let rest = rest.trim_end_matches('/');

        let (host, port) = rest
            .rsplit_once(':')
            .ok_or_else(|| "URL must include a port".to_string())?;
        if host.is_empty() {
            return Err("URL must include a host".to_string());
        }
        let port = port.parse().map_err(|_| format!("Invalid port '{}'", port))?;

        Ok(Self::new(port).host(host))
    }

    /// Read the port from an environment variable, host from `CLONECELL_HOST`
    pub fn from_env_port(var: &str) -> Result<Self> {
        let raw = std::env::var(var)
            .map_err(|_| CloneError::Connection(format!("{} is not set", var)))?;
        let port = raw
            .trim()
            .parse()
            .map_err(|_| CloneError::Connection(format!("{}='{}' is not a port", var, raw)))?;

        let mut config = Self::new(port);
        if let Ok(host) = std::env::var(HOST_VAR) {
            if !host.trim().is_empty() {
                config.host = host.trim().to_string();
            }
        }
        Ok(config)
    }

    /// Convert to endpoint string
    pub fn to_url(&self) -> String {
        format!("tcp://{}:{}", self.host, self.port)
    }

    /// Socket address passed to the resolver
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Validate configuration
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.host.trim().is_empty() {
            return Err("host cannot be empty".to_string());
        }

        if self.port == 0 {
            return Err("port must be > 0".to_string());
        }

        if self.max_frame_bytes == 0 {
            return Err("max_frame_bytes must be > 0".to_string());
        }

        Ok(())
    }
}

/// Both endpoints plus the application they act on
#[derive(Debug, Clone)]
pub struct LifecycleConfig {
    pub app_id: AppId,
    pub app: ChannelConfig,
    pub admin: ChannelConfig,
}

impl LifecycleConfig {
    pub fn new(app_id: &str, app: ChannelConfig, admin: ChannelConfig) -> Self {
        Self {
            app_id: app_id.to_string(),
            app,
            admin,
        }
    }

    /// Build from `HC_PORT`, `ADMIN_PORT`, `CLONECELL_HOST` and `CLONECELL_APP_ID`
    pub fn from_env() -> Result<Self> {
        let app = ChannelConfig::from_env_port(APP_PORT_VAR)?;
        let admin = ChannelConfig::from_env_port(ADMIN_PORT_VAR)?;
        let app_id = std::env::var(APP_ID_VAR)
            .ok()
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_APP_ID.to_string());

        Ok(Self::new(&app_id, app, admin))
    }

    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.app_id.trim().is_empty() {
            return Err("app_id cannot be empty".to_string());
        }
        self.app.validate().map_err(|e| format!("app channel: {}", e))?;
        self.admin
            .validate()
            .map_err(|e| format!("admin channel: {}", e))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ChannelConfig::new(8888);
        assert_eq!(config.host, "localhost");
        assert_eq!(config.port, 8888);
        assert_eq!(config.call_timeout, Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_builder_pattern() {
        let config = ChannelConfig::new(1)
            .host("conductor.local")
            .port(4444)
            .connect_timeout(Duration::from_millis(500))
            .no_call_timeout();

        assert_eq!(config.host, "conductor.local");
        assert_eq!(config.port, 4444);
        assert_eq!(config.connect_timeout, Duration::from_millis(500));
        assert!(config.call_timeout.is_none());
    }

    #[test]
    fn test_from_url() {
        let config = ChannelConfig::from_url("tcp://127.0.0.1:65000").unwrap();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 65000);
        assert_eq!(config.to_url(), "tcp://127.0.0.1:65000");
    }

    #[test]
    fn test_invalid_url() {
        assert!(ChannelConfig::from_url("ws://localhost:1").is_err());
        assert!(ChannelConfig::from_url("tcp://localhost").is_err());
        assert!(ChannelConfig::from_url("tcp://:80").is_err());
        assert!(ChannelConfig::from_url("tcp://localhost:http").is_err());
    }

    #[test]
    fn test_validate() {
        assert!(ChannelConfig::new(1).validate().is_ok());
        assert!(ChannelConfig::new(0).validate().is_err());
        assert!(ChannelConfig::new(1).host(" ").validate().is_err());

        let lifecycle = LifecycleConfig::new("", ChannelConfig::new(1), ChannelConfig::new(2));
        assert!(lifecycle.validate().is_err());

        let lifecycle =
            LifecycleConfig::new("clone-test", ChannelConfig::new(1), ChannelConfig::new(0));
        assert!(lifecycle.validate().unwrap_err().starts_with("admin channel"));
    }

    #[test]
    fn test_missing_env_port_is_connection_error() {
        let err = ChannelConfig::from_env_port("CLONECELL_TEST_UNSET_PORT_VAR").unwrap_err();
        assert!(matches!(err, CloneError::Connection(_)));
    }
}
