//! Server and logging configuration types.

use serde::Deserialize;

/// gRPC server configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to.
    pub host: String,
    /// Port for the ledger gRPC service.
    pub port: u16,
    /// Token required in `x-admin-token` metadata for admin-only calls.
    /// Admin calls are rejected when unset.
    pub admin_token: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 50061,
            admin_token: None,
        }
    }
}

impl ServerConfig {
    /// Socket address string for binding.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Log output configuration. Filtering comes from `LOG_ENV_VAR`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}
