//! Configuration validation with detailed error reporting.
//!
//! Grounded on the teacher's `config::validation` module: a `ValidationResult`
//! bucketed into errors/warnings/recommendations, and a `ConfigValidator`
//! that inspects a loaded `Settings` for inconsistent or risky values before
//! the gateway starts serving traffic.

use super::settings::Settings;
use log::{info, warn};

/// Result of configuration validation containing errors, warnings, and
/// recommendations, categorized by severity.
#[derive(Debug, Clone)]
pub struct ValidationResult {
    /// Whether the configuration is valid (no errors).
    pub is_valid: bool,
    /// Critical errors that prevent configuration use.
    pub errors: Vec<String>,
    /// Non-critical issues that should be addressed.
    pub warnings: Vec<String>,
    /// Suggestions for improving configuration.
    pub recommendations: Vec<String>,
}

impl Default for ValidationResult {
    fn default() -> Self {
        Self::new()
    }
}

impl ValidationResult {
    pub fn new() -> Self {
        Self {
            is_valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
            recommendations: Vec::new(),
        }
    }

    pub fn add_error(&mut self, error: String) {
        self.errors.push(error);
        self.is_valid = false;
    }

    pub fn add_warning(&mut self, warning: String) {
        self.warnings.push(warning);
    }

    pub fn add_recommendation(&mut self, recommendation: String) {
        self.recommendations.push(recommendation);
    }

    fn merge(&mut self, other: ValidationResult) {
        if !other.is_valid {
            self.is_valid = false;
        }
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
        self.recommendations.extend(other.recommendations);
    }
}

/// Validates a loaded `Settings` tree, reporting inconsistencies and risky
/// defaults rather than failing fast on the first problem — operators get
/// the full picture in one pass.
pub struct ConfigValidator;

impl ConfigValidator {
    pub fn validate_comprehensive(settings: &Settings) -> ValidationResult {
        let mut result = ValidationResult::new();

        result.merge(Self::validate_network(settings));
        result.merge(Self::validate_limits(settings));
        result.merge(Self::validate_rate_limiting(settings));
        result.merge(Self::validate_trusted_proxy(settings));
        result.merge(Self::validate_websocket(settings));
        result.merge(Self::validate_auth(settings));

        if result.is_valid {
            info!("configuration validated with no errors");
        } else {
            warn!(
                "configuration validation found {} error(s)",
                result.errors.len()
            );
        }

        result
    }

    fn validate_network(settings: &Settings) -> ValidationResult {
        let mut result = ValidationResult::new();

        if settings.port == 0 {
            result.add_error("port must be nonzero".to_string());
        }
        if settings.host.trim().is_empty() {
            result.add_error("host must not be empty".to_string());
        }
        if settings.gateway_host.trim().is_empty() {
            result.add_warning(
                "gateway_host is empty; the Via header will advertise an empty identity"
                    .to_string(),
            );
        }

        result
    }

    fn validate_limits(settings: &Settings) -> ValidationResult {
        let mut result = ValidationResult::new();
        let limits = &settings.limits;

        if limits.max_body_size == 0 {
            result.add_error("limits.max_body_size must be nonzero".to_string());
        }
        if limits.max_header_size == 0 {
            result.add_error("limits.max_header_size must be nonzero".to_string());
        }
        if limits.max_total_headers_size < limits.max_header_size {
            result.add_error(
                "limits.max_total_headers_size must be >= limits.max_header_size".to_string(),
            );
        }
        if limits.max_body_size > 100 * 1024 * 1024 {
            result.add_recommendation(
                "limits.max_body_size exceeds 100MB; consider streaming large payloads instead"
                    .to_string(),
            );
        }

        result
    }

    fn validate_rate_limiting(settings: &Settings) -> ValidationResult {
        let mut result = ValidationResult::new();
        let rl = &settings.rate_limiting;

        if rl.enabled {
            if rl.window_seconds == 0 {
                result.add_error("rate_limiting.window_seconds must be nonzero".to_string());
            }
            if rl.burst_capacity == 0 {
                result.add_error("rate_limiting.burst_capacity must be nonzero".to_string());
            }
            if rl.platform_max_requests_per_window == 0 {
                result.add_error(
                    "rate_limiting.platform_max_requests_per_window must be nonzero".to_string(),
                );
            }
            if rl.burst_capacity > rl.platform_max_burst_capacity {
                result.add_warning(
                    "rate_limiting.burst_capacity exceeds the platform burst ceiling; the ceiling wins".to_string(),
                );
            }
        } else {
            result.add_recommendation(
                "rate_limiting is disabled; the gateway will not protect upstreams from abusive clients"
                    .to_string(),
            );
        }

        for (label, ws_rl) in [
            ("websocket_connection", &rl.websocket_connection),
            ("websocket_message", &rl.websocket_message),
        ] {
            if ws_rl.enabled && ws_rl.window_seconds == 0 {
                result.add_error(format!(
                    "rate_limiting.{label}.window_seconds must be nonzero"
                ));
            }
        }

        result
    }

    fn validate_trusted_proxy(settings: &Settings) -> ValidationResult {
        let mut result = ValidationResult::new();
        let tp = &settings.trusted_proxy;

        if tp.enabled && tp.proxies.is_empty() {
            result.add_warning(
                "trusted_proxy.enabled is true but no proxies are listed; no Forwarded/X-Forwarded-For header will be trusted".to_string(),
            );
        }

        for entry in &tp.proxies {
            if entry.parse::<ipnet::IpNet>().is_err() && entry.parse::<std::net::IpAddr>().is_err()
            {
                result.add_error(format!(
                    "trusted_proxy.proxies entry '{entry}' is not a valid IP address or CIDR block"
                ));
            }
        }

        if !tp.enabled {
            result.add_recommendation(
                "trusted_proxy is disabled; deployments behind a load balancer should enable it and list the balancer's address".to_string(),
            );
        }

        result
    }

    fn validate_websocket(settings: &Settings) -> ValidationResult {
        let mut result = ValidationResult::new();
        let ws = &settings.websocket;

        if ws.max_connections == 0 {
            result.add_error("websocket.max_connections must be nonzero".to_string());
        }
        if ws.idle_timeout_seconds == 0 {
            result.add_error("websocket.idle_timeout_seconds must be nonzero".to_string());
        }
        if ws.max_lifetime_seconds > 0 && ws.max_lifetime_seconds < ws.idle_timeout_seconds {
            result.add_warning(
                "websocket.max_lifetime_seconds is shorter than the idle timeout; the lifetime cap will always fire first".to_string(),
            );
        }

        result
    }

    fn validate_auth(settings: &Settings) -> ValidationResult {
        let mut result = ValidationResult::new();
        let auth = &settings.auth;

        if auth.issuer.trim().is_empty() {
            result.add_error("auth.issuer must not be empty".to_string());
        }
        if auth.require_audience && auth.default_audience.is_none() {
            result.add_warning(
                "auth.require_audience is true with no default_audience; every service must declare its own audience".to_string(),
            );
        }
        if auth.downstream_token_ttl_seconds <= 0 {
            result.add_error("auth.downstream_token_ttl_seconds must be positive".to_string());
        } else if auth.downstream_token_ttl_seconds > 3600 {
            result.add_recommendation(
                "auth.downstream_token_ttl_seconds exceeds one hour; shorter-lived downstream tokens limit replay exposure".to_string(),
            );
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings_are_valid() {
        let result = ConfigValidator::validate_comprehensive(&Settings::default());
        assert!(result.is_valid, "errors: {:?}", result.errors);
    }

    #[test]
    fn zero_port_is_an_error() {
        let mut settings = Settings::default();
        settings.port = 0;
        let result = ConfigValidator::validate_comprehensive(&settings);
        assert!(!result.is_valid);
        assert!(result.errors.iter().any(|e| e.contains("port")));
    }

    #[test]
    fn disabled_rate_limiting_yields_a_recommendation_not_an_error() {
        let mut settings = Settings::default();
        settings.rate_limiting.enabled = false;
        let result = ConfigValidator::validate_comprehensive(&settings);
        assert!(result.is_valid);
        assert!(!result.recommendations.is_empty());
    }

    #[test]
    fn invalid_trusted_proxy_entry_is_an_error() {
        let mut settings = Settings::default();
        settings.trusted_proxy.enabled = true;
        settings.trusted_proxy.proxies = vec!["not-an-ip".to_string()];
        let result = ConfigValidator::validate_comprehensive(&settings);
        assert!(!result.is_valid);
    }

    #[test]
    fn valid_cidr_trusted_proxy_passes() {
        let mut settings = Settings::default();
        settings.trusted_proxy.enabled = true;
        settings.trusted_proxy.proxies = vec!["10.0.0.0/8".to_string(), "192.168.1.1".to_string()];
        let result = ConfigValidator::validate_comprehensive(&settings);
        assert!(result.is_valid, "errors: {:?}", result.errors);
    }
}
