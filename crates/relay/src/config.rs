// Relay server configuration.
//
// Centralizes environment variable parsing with defaults for local
// development. CORS origins are read by cors.rs from the same variable set.

use std::net::SocketAddr;
use std::time::Duration;

pub const DEV_JWT_SECRET: &str = "tasklive_local_development_jwt_secret_must_be_32_chars";

/// Core relay server configuration.
///
/// Constructed via [`RelayConfig::from_env`] which reads environment
/// variables and falls back to sensible development defaults.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Listen address (host:port).
    pub listen_addr: SocketAddr,
    /// Secret shared with the REST layer that issues access tokens.
    pub jwt_secret: String,
    /// Credential the task service presents on `/v1/events/*`. Unset
    /// leaves those hooks unmounted.
    pub hook_secret: Option<String>,
    /// Comma-separated CORS origins (or `"*"` for any).
    pub cors_origins: Option<String>,
    /// Log filter directive (e.g. `info`, `tasklive_relay=debug`).
    pub log_filter: String,
    /// Emit logs as JSON lines instead of human-readable text.
    pub log_json: bool,
    /// Frames buffered per connection before further sends are dropped.
    pub outbound_queue_capacity: usize,
    pub heartbeat_interval: Duration,
    /// How long after a ping the connection may stay silent.
    pub heartbeat_timeout: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self::from_env_fn(|_| Err(std::env::VarError::NotPresent))
    }
}

impl RelayConfig {
    /// Parse configuration from environment variables.
    ///
    /// | Variable | Default |
    /// |---|---|
    /// | `TASKLIVE_RELAY_HOST` | `0.0.0.0` |
    /// | `TASKLIVE_RELAY_PORT` | `5000` |
    /// | `TASKLIVE_RELAY_JWT_SECRET` | dev-only placeholder |
    /// | `TASKLIVE_RELAY_HOOK_SECRET` | *(none, event hooks disabled)* |
    /// | `TASKLIVE_RELAY_CORS_ORIGINS` | *(none, cors.rs uses dev defaults)* |
    /// | `TASKLIVE_RELAY_LOG_FILTER` | `info` |
    /// | `TASKLIVE_RELAY_LOG_FORMAT` | `text` (or `json`) |
    /// | `TASKLIVE_RELAY_OUTBOUND_QUEUE` | `256` |
    /// | `TASKLIVE_RELAY_HEARTBEAT_INTERVAL_MS` | `25000` |
    /// | `TASKLIVE_RELAY_HEARTBEAT_TIMEOUT_MS` | `20000` |
    pub fn from_env() -> Self {
        Self::from_env_fn(|key| std::env::var(key))
    }

    /// Testable constructor that accepts an environment lookup function.
    fn from_env_fn<F>(env: F) -> Self
    where
        F: Fn(&str) -> Result<String, std::env::VarError>,
    {
        let host = env("TASKLIVE_RELAY_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let port: u16 =
            env("TASKLIVE_RELAY_PORT").ok().and_then(|v| v.parse().ok()).unwrap_or(5000);
        let listen_addr = format!("{host}:{port}")
            .parse()
            .unwrap_or_else(|_| SocketAddr::from(([0, 0, 0, 0], port)));

        let jwt_secret =
            env("TASKLIVE_RELAY_JWT_SECRET").unwrap_or_else(|_| DEV_JWT_SECRET.into());

        let hook_secret = env("TASKLIVE_RELAY_HOOK_SECRET")
            .ok()
            .map(|secret| secret.trim().to_owned())
            .filter(|secret| !secret.is_empty());

        let cors_origins = env("TASKLIVE_RELAY_CORS_ORIGINS").ok();

        let log_filter = env("TASKLIVE_RELAY_LOG_FILTER").unwrap_or_else(|_| "info".into());
        let log_json = env("TASKLIVE_RELAY_LOG_FORMAT")
            .map(|format| format.trim().eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        let outbound_queue_capacity = env("TASKLIVE_RELAY_OUTBOUND_QUEUE")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .filter(|capacity| *capacity > 0)
            .unwrap_or(256);

        let heartbeat_interval_ms = parse_millis(&env, "TASKLIVE_RELAY_HEARTBEAT_INTERVAL_MS")
            .unwrap_or(25_000);
        let heartbeat_timeout_ms =
            parse_millis(&env, "TASKLIVE_RELAY_HEARTBEAT_TIMEOUT_MS").unwrap_or(20_000);

        Self {
            listen_addr,
            jwt_secret,
            hook_secret,
            cors_origins,
            log_filter,
            log_json,
            outbound_queue_capacity,
            heartbeat_interval: Duration::from_millis(heartbeat_interval_ms),
            heartbeat_timeout: Duration::from_millis(heartbeat_timeout_ms),
        }
    }

    /// Returns true when using the development-only JWT secret.
    pub fn is_dev_jwt_secret(&self) -> bool {
        self.jwt_secret == DEV_JWT_SECRET
    }
}

fn parse_millis<F>(env: &F, key: &str) -> Option<u64>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    env(key).ok().and_then(|v| v.parse::<u64>().ok()).filter(|ms| *ms > 0)
}
