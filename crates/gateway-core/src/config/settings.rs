//! The gateway's configuration tree (§6) and its startup loader.
//!
//! Grounded on the teacher's `models::settings::Settings` (serde-derived,
//! `#[serde(default)]` throughout so a partial config file is valid) and
//! `config::settings::load_settings` (JSON file, `KAIROS_CONFIG_PATH`-style
//! env override, path-traversal and size-limit protection before parsing).

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// `limits.*` (§6): inbound request size ceilings enforced before a request
/// reaches route resolution.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    pub max_body_size: usize,
    pub max_header_size: usize,
    pub max_total_headers_size: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        LimitsConfig {
            max_body_size: 10 * 1024 * 1024,
            max_header_size: 8 * 1024,
            max_total_headers_size: 32 * 1024,
        }
    }
}

/// `forwarding.*` (§6, §4.4).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ForwardingConfig {
    pub use_rfc7239: bool,
}

impl Default for ForwardingConfig {
    fn default() -> Self {
        ForwardingConfig { use_rfc7239: true }
    }
}

/// `rateLimiting.websocket.{connection,message}` (§6, §4.7).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WsRateLimitConfig {
    pub enabled: bool,
    pub requests_per_window: u64,
    pub window_seconds: u64,
    pub burst_capacity: u64,
}

impl Default for WsRateLimitConfig {
    fn default() -> Self {
        WsRateLimitConfig {
            enabled: true,
            requests_per_window: 60,
            window_seconds: 60,
            burst_capacity: 60,
        }
    }
}

/// `rateLimiting.*` (§6, §4.5).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitingConfig {
    pub enabled: bool,
    pub platform_max_requests_per_window: u64,
    pub platform_max_burst_capacity: u64,
    pub window_seconds: u64,
    pub burst_capacity: u64,
    pub include_headers: bool,
    pub websocket_connection: WsRateLimitConfig,
    pub websocket_message: WsRateLimitConfig,
}

impl Default for RateLimitingConfig {
    fn default() -> Self {
        RateLimitingConfig {
            enabled: true,
            platform_max_requests_per_window: 10_000,
            platform_max_burst_capacity: 10_000,
            window_seconds: 60,
            burst_capacity: 100,
            include_headers: true,
            websocket_connection: WsRateLimitConfig::default(),
            websocket_message: WsRateLimitConfig {
                requests_per_window: 120,
                burst_capacity: 120,
                ..WsRateLimitConfig::default()
            },
        }
    }
}

/// `trustedProxy.*` (§6, §2 component 3).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrustedProxyConfig {
    pub enabled: bool,
    pub proxies: Vec<String>,
}

impl Default for TrustedProxyConfig {
    fn default() -> Self {
        TrustedProxyConfig {
            enabled: false,
            proxies: Vec::new(),
        }
    }
}

/// WebSocket tunables (§6, §4.7): connection capacity and the two timers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebSocketConfig {
    pub max_connections: usize,
    pub idle_timeout_seconds: u64,
    pub max_lifetime_seconds: u64,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        WebSocketConfig {
            max_connections: 10_000,
            idle_timeout_seconds: 5 * 60,
            max_lifetime_seconds: 24 * 60 * 60,
        }
    }
}

/// `cache.local.*` (§6, §4.2): the registry snapshot's TTL and size bound.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalCacheConfig {
    pub ttl_seconds: u64,
    pub max_entries: usize,
}

impl Default for LocalCacheConfig {
    fn default() -> Self {
        LocalCacheConfig {
            ttl_seconds: 30,
            max_entries: 10_000,
        }
    }
}

/// `auth.*` (§6, §4.3): downstream-token minting parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub issuer: String,
    pub default_audience: Option<String>,
    pub require_audience: bool,
    pub downstream_token_ttl_seconds: i64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        AuthConfig {
            issuer: "aussie-gateway".to_string(),
            default_audience: None,
            require_audience: false,
            downstream_token_ttl_seconds: 300,
        }
    }
}

/// Outbound proxy transport tunables (§4.8).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpClientConfig {
    pub connect_timeout_seconds: u64,
    pub request_timeout_seconds: u64,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        HttpClientConfig {
            connect_timeout_seconds: 5,
            request_timeout_seconds: 30,
        }
    }
}

/// The complete, serde-derived gateway configuration tree (§6). Every
/// section defaults independently so a partial config file is valid — the
/// same shape the teacher's `Settings` uses for `jwt`/`rate_limit`/`ai`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub version: u8,
    pub host: String,
    pub port: u16,
    /// The host identifier this instance advertises in the `Via` header (§4.4).
    pub gateway_host: String,
    pub limits: LimitsConfig,
    pub forwarding: ForwardingConfig,
    pub rate_limiting: RateLimitingConfig,
    pub trusted_proxy: TrustedProxyConfig,
    pub websocket: WebSocketConfig,
    pub local_cache: LocalCacheConfig,
    pub auth: AuthConfig,
    pub http_client: HttpClientConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            version: 1,
            host: "0.0.0.0".to_string(),
            port: 5900,
            gateway_host: "aussie-gateway".to_string(),
            limits: LimitsConfig::default(),
            forwarding: ForwardingConfig::default(),
            rate_limiting: RateLimitingConfig::default(),
            trusted_proxy: TrustedProxyConfig::default(),
            websocket: WebSocketConfig::default(),
            local_cache: LocalCacheConfig::default(),
            auth: AuthConfig::default(),
            http_client: HttpClientConfig::default(),
        }
    }
}

const MAX_CONFIG_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// Loads `Settings` from the file at `AUSSIE_CONFIG_PATH` (default
/// `./config.json`), guarding against path traversal outside the working
/// directory and oversized config files before parsing (§6).
pub fn load_settings() -> Result<Settings, Box<dyn std::error::Error>> {
    let config_path = std::env::var("AUSSIE_CONFIG_PATH").unwrap_or_else(|_| "./config.json".to_string());
    let path = Path::new(&config_path);

    if !path.exists() {
        return Err(format!("cannot resolve config path '{config_path}'").into());
    }

    let canonical_path = path.canonicalize()?;
    let current_dir = std::env::current_dir()?;
    if !canonical_path.starts_with(&current_dir) {
        return Err(format!("config path '{config_path}' is outside the working directory").into());
    }

    let metadata = fs::metadata(&canonical_path)?;
    if metadata.len() > MAX_CONFIG_FILE_SIZE {
        return Err(format!("config file too large: {} bytes (max {} bytes)", metadata.len(), MAX_CONFIG_FILE_SIZE).into());
    }

    let raw = fs::read_to_string(&canonical_path)?;
    let settings: Settings = serde_json::from_str(&raw)?;
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings_match_spec_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.rate_limiting.window_seconds, 60);
        assert!(settings.forwarding.use_rfc7239);
        assert_eq!(settings.websocket.idle_timeout_seconds, 300);
        assert_eq!(settings.websocket.max_lifetime_seconds, 86_400);
        assert_eq!(settings.local_cache.ttl_seconds, 30);
    }

    #[test]
    fn partial_json_fills_in_defaults() {
        let settings: Settings = serde_json::from_str(r#"{"port": 8080}"#).unwrap();
        assert_eq!(settings.port, 8080);
        assert_eq!(settings.host, "0.0.0.0");
        assert!(settings.rate_limiting.enabled);
    }

    #[test]
    fn missing_config_file_is_an_error() {
        std::env::set_var("AUSSIE_CONFIG_PATH", "/tmp/does-not-exist-aussie-config.json");
        let result = load_settings();
        std::env::remove_var("AUSSIE_CONFIG_PATH");
        assert!(result.is_err());
    }
}
