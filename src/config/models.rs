//! Configuration data structures for Courier.
//!
//! These types map directly to YAML (also JSON / TOML) configuration files. They are
//! serde‑friendly and include defaults so that a minimal config only needs the backend
//! host and the list of forwarded paths. The config is read once at boot and never
//! mutated afterwards.
use std::time::Duration;

use serde::{Deserialize, Serialize};

fn default_listen_addr() -> String {
    "0.0.0.0:80".to_string()
}

fn default_max_body_bytes() -> usize {
    32 * 1024 * 1024
}

/// Root configuration for the gateway.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GatewayConfig {
    /// Socket address the gateway listens on
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    /// Base URL of the single downstream backend
    #[serde(alias = "asyncHost", alias = "asynchost")]
    pub backend_host: String,
    /// Paths forwarded to the backend (POST only). Order is irrelevant; duplicates collapse.
    #[serde(default, alias = "asyncSapRoute", alias = "asyncsaproute")]
    pub routes: Vec<String>,
    /// Upper bound on the captured inbound body
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
    #[serde(default)]
    pub redirect: RedirectConfig,
    #[serde(default)]
    pub shutdown: ShutdownConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl GatewayConfig {
    /// Create a new gateway configuration builder
    pub fn builder() -> GatewayConfigBuilder {
        GatewayConfigBuilder::default()
    }
}

/// Behaviour of the fallback redirect handler.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct RedirectConfig {
    /// Append the original query string to the redirect target
    pub preserve_query: bool,
}

/// Drain settings applied when a termination signal arrives.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct ShutdownConfig {
    /// Parsed by humantime, e.g. "60s", "1m 30s"
    pub grace_period: String,
}

impl ShutdownConfig {
    /// Parse the configured grace period.
    pub fn grace_period(&self) -> Result<Duration, humantime::DurationError> {
        humantime::parse_duration(&self.grace_period)
    }
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            grace_period: "60s".to_string(),
        }
    }
}

/// Console output format for log lines.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// How often the file log rolls over.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogRotation {
    Minutely,
    Hourly,
    #[default]
    Daily,
    Never,
}

/// Optional JSON file sink next to the console output.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct FileLogConfig {
    pub directory: String,
    #[serde(default = "default_log_prefix")]
    pub prefix: String,
    #[serde(default)]
    pub rotation: LogRotation,
}

fn default_log_prefix() -> String {
    "courier.log".to_string()
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is not set
    pub level: String,
    pub format: LogFormat,
    pub file: Option<FileLogConfig>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
            file: None,
        }
    }
}

/// Builder for GatewayConfig to allow for cleaner configuration creation
#[derive(Default)]
pub struct GatewayConfigBuilder {
    listen_addr: Option<String>,
    backend_host: Option<String>,
    routes: Vec<String>,
    max_body_bytes: Option<usize>,
    redirect: Option<RedirectConfig>,
    shutdown: Option<ShutdownConfig>,
    logging: Option<LoggingConfig>,
}

impl GatewayConfigBuilder {
    /// Set the listen address
    pub fn listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.listen_addr = Some(addr.into());
        self
    }

    /// Set the backend base URL
    pub fn backend_host(mut self, host: impl Into<String>) -> Self {
        self.backend_host = Some(host.into());
        self
    }

    /// Add a forwarded path
    pub fn route(mut self, path: impl Into<String>) -> Self {
        self.routes.push(path.into());
        self
    }

    pub fn max_body_bytes(mut self, limit: usize) -> Self {
        self.max_body_bytes = Some(limit);
        self
    }

    /// Keep the query string on fallback redirects
    pub fn preserve_query(mut self, preserve: bool) -> Self {
        self.redirect = Some(RedirectConfig {
            preserve_query: preserve,
        });
        self
    }

    /// Set the drain grace period (humantime syntax)
    pub fn grace_period(mut self, period: impl Into<String>) -> Self {
        self.shutdown = Some(ShutdownConfig {
            grace_period: period.into(),
        });
        self
    }

    pub fn logging(mut self, config: LoggingConfig) -> Self {
        self.logging = Some(config);
        self
    }

    /// Build the final GatewayConfig
    pub fn build(self) -> Result<GatewayConfig, String> {
        let backend_host = self
            .backend_host
            .ok_or_else(|| "backend_host is required".to_string())?;

        Ok(GatewayConfig {
            listen_addr: self.listen_addr.unwrap_or_else(default_listen_addr),
            backend_host,
            routes: self.routes,
            max_body_bytes: self.max_body_bytes.unwrap_or_else(default_max_body_bytes),
            redirect: self.redirect.unwrap_or_default(),
            shutdown: self.shutdown.unwrap_or_default(),
            logging: self.logging.unwrap_or_default(),
        })
    }
}
