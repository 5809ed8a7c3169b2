use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::collections::HashMap;
use std::env;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub server: ServerConfig,
    pub jwt: JwtConfig,
    pub api: ApiConfig,
    #[serde(default)]
    pub websocket: WebSocketConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub shutdown: ShutdownConfig,
    #[serde(default)]
    pub entitlements: EntitlementsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebSocketConfig {
    /// Heartbeat interval in seconds (server sends ping)
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval: u64,
    /// Idle timeout in seconds (disconnect if no inbound activity)
    #[serde(default = "default_connection_timeout")]
    pub connection_timeout: u64,
    /// Stale-connection sweep interval in seconds
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval: u64,
    /// Per-connection outbound buffer (messages). A full buffer marks the
    /// connection as a slow consumer and schedules it for disconnect.
    #[serde(default = "default_send_buffer")]
    pub send_buffer: usize,
}

fn default_heartbeat_interval() -> u64 {
    30
}

fn default_connection_timeout() -> u64 {
    120 // 2 minutes
}

fn default_cleanup_interval() -> u64 {
    60
}

fn default_send_buffer() -> usize {
    32
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    /// Interval in seconds between registry/room census reports
    #[serde(default = "default_report_interval")]
    pub report_interval: u64,
}

fn default_report_interval() -> u64 {
    60
}

#[derive(Debug, Clone, Deserialize)]
pub struct ShutdownConfig {
    /// Seconds to wait for connections to close on their own before forcing cleanup
    #[serde(default = "default_grace_period")]
    pub grace_period: u64,
    /// Suggested reconnect delay sent to clients in the shutdown notice
    #[serde(default = "default_reconnect_after")]
    pub reconnect_after: u64,
}

fn default_grace_period() -> u64 {
    10
}

fn default_reconnect_after() -> u64 {
    5
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: Option<String>,
    pub audience: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    pub key: Option<String>,
}

/// Which stream rooms each tenant may subscribe to.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EntitlementsConfig {
    /// When true, every tenant may subscribe to every stream (development mode)
    #[serde(default)]
    pub open_access: bool,
    /// tenant_id -> stream ids the tenant is entitled to
    #[serde(default)]
    pub grants: HashMap<String, Vec<String>>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8082
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        // Load .env file if exists
        let _ = dotenvy::dotenv();

        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let builder = Config::builder()
            // Start with default values
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8082)?
            .set_default("websocket.heartbeat_interval", 30)?
            .set_default("websocket.connection_timeout", 120)?
            .set_default("websocket.cleanup_interval", 60)?
            .set_default("websocket.send_buffer", 32)?
            .set_default("metrics.report_interval", 60)?
            .set_default("shutdown.grace_period", 10)?
            .set_default("shutdown.reconnect_after", 5)?
            // Load config file if exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // Load from environment variables
            // SERVER_HOST, SERVER_PORT, JWT_SECRET, etc.
            .add_source(
                Environment::default()
                    .separator("_")
                    .try_parsing(true)
                    .list_separator(","),
            );

        builder.build()?.try_deserialize()
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: default_heartbeat_interval(),
            connection_timeout: default_connection_timeout(),
            cleanup_interval: default_cleanup_interval(),
            send_buffer: default_send_buffer(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            report_interval: default_report_interval(),
        }
    }
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            grace_period: default_grace_period(),
            reconnect_after: default_reconnect_after(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let server = ServerConfig::default();
        assert_eq!(server.host, "0.0.0.0");
        assert_eq!(server.port, 8082);

        let ws = WebSocketConfig::default();
        assert_eq!(ws.heartbeat_interval, 30);
        assert_eq!(ws.send_buffer, 32);
    }

    #[test]
    fn test_entitlements_default_is_closed() {
        let entitlements = EntitlementsConfig::default();
        assert!(!entitlements.open_access);
        assert!(entitlements.grants.is_empty());
    }
}
