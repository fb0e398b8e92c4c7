//! Configuration types and loading.
//!
//! Config is loaded from a JSON file (e.g. `~/.hookchat/config.json`) and environment.
//! Every field has a default, so a missing file or an empty `{}` is a valid config.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level application config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Outbound webhook relay settings.
    #[serde(default)]
    pub relay: RelayConfig,

    /// Request rate limits.
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

/// Server bind, port, CORS and readiness settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    /// Port for the HTTP server (default 3000). Overridden by HOOKCHAT_PORT env.
    #[serde(default = "default_server_port")]
    pub port: u16,

    /// Bind address (default "127.0.0.1").
    #[serde(default = "default_server_bind")]
    pub bind: String,

    /// Origins allowed by CORS. Empty means http://localhost:<port> and http://127.0.0.1:<port>.
    #[serde(default)]
    pub cors_origins: Vec<String>,

    /// Seconds after startup before /api/health/ready reports ready (default 5).
    #[serde(default = "default_ready_after_secs")]
    pub ready_after_secs: u64,

    /// Environment name reported by health endpoints (default "development"). Overridden by HOOKCHAT_ENV.
    #[serde(default = "default_environment")]
    pub environment: String,
}

/// Webhook relay settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayConfig {
    /// Upper bound on one relay exchange, request through body (default 30).
    #[serde(default = "default_relay_timeout_secs")]
    pub timeout_secs: u64,

    /// Timeout for HEAD requests on /relay/info (default 10).
    #[serde(default = "default_info_timeout_secs")]
    pub info_timeout_secs: u64,

    /// User-Agent sent to webhooks unless the caller overrides it.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Value of the `source` field added to outbound payloads.
    #[serde(default = "default_source")]
    pub source: String,
}

/// Fixed-window rate limits per client address.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitConfig {
    /// Requests allowed per client per global window on every route (default 1000).
    #[serde(default = "default_global_max")]
    pub global_max: u64,

    /// Global window length in seconds (default 900).
    #[serde(default = "default_global_window_secs")]
    pub global_window_secs: u64,

    /// Requests allowed per client per relay window on /relay/* (default 30).
    #[serde(default = "default_relay_max")]
    pub relay_max: u64,

    /// Relay window length in seconds (default 60).
    #[serde(default = "default_relay_window_secs")]
    pub relay_window_secs: u64,
}

fn default_server_port() -> u16 {
    3000
}

fn default_server_bind() -> String {
    "127.0.0.1".to_string()
}

fn default_ready_after_secs() -> u64 {
    5
}

fn default_environment() -> String {
    "development".to_string()
}

fn default_relay_timeout_secs() -> u64 {
    30
}

fn default_info_timeout_secs() -> u64 {
    10
}

fn default_user_agent() -> String {
    format!("Hookchat/{}", env!("CARGO_PKG_VERSION"))
}

fn default_source() -> String {
    "hookchat-interface".to_string()
}

fn default_global_max() -> u64 {
    1000
}

fn default_global_window_secs() -> u64 {
    15 * 60
}

fn default_relay_max() -> u64 {
    30
}

fn default_relay_window_secs() -> u64 {
    60
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_server_port(),
            bind: default_server_bind(),
            cors_origins: Vec::new(),
            ready_after_secs: default_ready_after_secs(),
            environment: default_environment(),
        }
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_relay_timeout_secs(),
            info_timeout_secs: default_info_timeout_secs(),
            user_agent: default_user_agent(),
            source: default_source(),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            global_max: default_global_max(),
            global_window_secs: default_global_window_secs(),
            relay_max: default_relay_max(),
            relay_window_secs: default_relay_window_secs(),
        }
    }
}

/// Trimmed, non-empty value of an environment variable.
fn env_value(name: &str) -> Option<String> {
    std::env::var(name).ok().and_then(|s| {
        let t = s.trim();
        if t.is_empty() {
            None
        } else {
            Some(t.to_string())
        }
    })
}

/// Resolve the server port: env HOOKCHAT_PORT overrides config. Unparseable values are ignored.
pub fn resolve_port(config: &Config) -> u16 {
    port_override(env_value("HOOKCHAT_PORT").as_deref()).unwrap_or(config.server.port)
}

fn port_override(value: Option<&str>) -> Option<u16> {
    let raw = value?;
    match raw.parse::<u16>() {
        Ok(p) => Some(p),
        Err(_) => {
            log::warn!("ignoring invalid HOOKCHAT_PORT value: {}", raw);
            None
        }
    }
}

/// Resolve the environment name: env HOOKCHAT_ENV overrides config.
pub fn resolve_environment(config: &Config) -> String {
    env_value("HOOKCHAT_ENV").unwrap_or_else(|| config.server.environment.clone())
}

/// Origins allowed by CORS: the configured list, or the local origins for the given port.
pub fn resolve_cors_origins(config: &Config, port: u16) -> Vec<String> {
    let configured: Vec<String> = config
        .server
        .cors_origins
        .iter()
        .map(|o| o.trim().trim_end_matches('/').to_string())
        .filter(|o| !o.is_empty())
        .collect();
    if !configured.is_empty() {
        return configured;
    }
    vec![
        format!("http://localhost:{}", port),
        format!("http://127.0.0.1:{}", port),
    ]
}

/// True if the bind address is loopback (127.0.0.1, ::1, etc.).
pub fn is_loopback_bind(bind: &str) -> bool {
    let b = bind.trim();
    b == "127.0.0.1" || b == "::1" || b == "localhost"
}

/// Resolve config path from env or default.
pub fn default_config_path() -> PathBuf {
    std::env::var("HOOKCHAT_CONFIG_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            dirs::home_dir()
                .map(|h| h.join(".hookchat").join("config.json"))
                .unwrap_or_else(|| PathBuf::from("config.json"))
        })
}

/// Load config from the given path, or the default path (or HOOKCHAT_CONFIG_PATH). Missing file => default config.
/// Returns the config and the path that was used.
pub fn load_config(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let path = path.unwrap_or_else(default_config_path);
    let config = if !path.exists() {
        log::debug!("config file not found, using defaults: {}", path.display());
        Config::default()
    } else {
        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        serde_json::from_str(&s)
            .with_context(|| format!("parsing config from {}", path.display()))?
    };
    Ok((config, path))
}
