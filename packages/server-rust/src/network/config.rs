//! Network configuration types for the gateway's HTTP surface.

use std::time::Duration;

/// Slack added on top of the sync wait budget so the gateway's own 408 is
/// always produced before the transport-level timeout fires.
const REQUEST_TIMEOUT_MARGIN: Duration = Duration::from_secs(5);

/// Top-level network configuration for the gateway.
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// Bind address for the server.
    pub host: String,
    /// Port to listen on. 0 means OS-assigned.
    pub port: u16,
    /// Allowed CORS origins.
    pub cors_origins: Vec<String>,
    /// Maximum time to wait for a request to complete.
    pub request_timeout: Duration,
}

impl NetworkConfig {
    /// Stretches `request_timeout` so it outlasts a sync wait of `budget`.
    #[must_use]
    pub fn covering_sync_budget(mut self, budget: Duration) -> Self {
        self.request_timeout = self.request_timeout.max(budget + REQUEST_TIMEOUT_MARGIN);
        self
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            cors_origins: vec!["*".to_string()],
            request_timeout: Duration::from_secs(30),
        }
    }
}
