//! The rate-limit engine: algorithm, backends, and effective-limit resolution
//! (§2 component 5, §4.5).

pub mod bucket;
pub mod distributed;
pub mod memory;

pub use bucket::check_and_consume;
pub use distributed::{AtomicRateLimitStore, DistributedRateLimitBackend};
pub use memory::InMemoryRateLimitBackend;

use crate::model::service::{Endpoint, RateLimitOverride, Service};
use crate::model::EffectiveRateLimit;

/// Platform-wide defaults and caps (§6 `rateLimiting.*`).
#[derive(Debug, Clone, Copy)]
pub struct PlatformRateLimitDefaults {
    pub requests_per_window: u64,
    pub window_seconds: u64,
    pub burst_capacity: u64,
    pub max_requests_per_window: u64,
    pub max_burst_capacity: u64,
}

/// Resolves endpoint → service → platform default, capped at the platform
/// maximum for both `requestsPerWindow` and `burstCapacity` (§4.5).
pub fn resolve_effective_limit(
    endpoint: &Endpoint,
    service: &Service,
    defaults: &PlatformRateLimitDefaults,
) -> EffectiveRateLimit {
    let pick = |endpoint_override: Option<&RateLimitOverride>, service_override: Option<&RateLimitOverride>| {
        let requests_per_window = endpoint_override
            .and_then(|o| o.requests_per_window)
            .or_else(|| service_override.and_then(|o| o.requests_per_window))
            .unwrap_or(defaults.requests_per_window);
        let window_seconds = endpoint_override
            .and_then(|o| o.window_seconds)
            .or_else(|| service_override.and_then(|o| o.window_seconds))
            .unwrap_or(defaults.window_seconds);
        let burst_capacity = endpoint_override
            .and_then(|o| o.burst_capacity)
            .or_else(|| service_override.and_then(|o| o.burst_capacity))
            .unwrap_or(defaults.burst_capacity);
        (requests_per_window, window_seconds, burst_capacity)
    };

    let (requests_per_window, window_seconds, burst_capacity) =
        pick(endpoint.rate_limit.as_ref(), service.rate_limit.as_ref());

    EffectiveRateLimit {
        requests_per_window: requests_per_window.min(defaults.max_requests_per_window),
        window_seconds: window_seconds.max(1),
        burst_capacity: burst_capacity.min(defaults.max_burst_capacity),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::service::{EndpointType, Visibility};
    use std::collections::HashSet;

    fn defaults() -> PlatformRateLimitDefaults {
        PlatformRateLimitDefaults {
            requests_per_window: 100,
            window_seconds: 60,
            burst_capacity: 100,
            max_requests_per_window: 1000,
            max_burst_capacity: 1000,
        }
    }

    fn endpoint(rate_limit: Option<RateLimitOverride>) -> Endpoint {
        Endpoint {
            id: "e1".into(),
            path: "/x".into(),
            methods: HashSet::from(["GET".to_string()]),
            endpoint_type: EndpointType::Http,
            visibility: None,
            auth_required: None,
            path_rewrite: None,
            required_permissions: vec![],
            access: None,
            rate_limit,
            sampling: None,
            audience: None,
        }
    }

    fn service(rate_limit: Option<RateLimitOverride>) -> Service {
        Service {
            service_id: "users".into(),
            display_name: "Users".into(),
            base_url: "http://u:3001".into(),
            endpoints: vec![],
            access: None,
            rate_limit,
            sampling: None,
            default_visibility: Visibility::Public,
            default_auth_required: false,
            route_prefix: None,
        }
    }

    #[test]
    fn falls_back_to_platform_default_when_unset() {
        let limit = resolve_effective_limit(&endpoint(None), &service(None), &defaults());
        assert_eq!(limit.requests_per_window, 100);
        assert_eq!(limit.burst_capacity, 100);
    }

    #[test]
    fn endpoint_override_wins_over_service_and_platform() {
        let endpoint_override = RateLimitOverride {
            requests_per_window: Some(5),
            window_seconds: Some(10),
            burst_capacity: Some(5),
        };
        let service_override = RateLimitOverride {
            requests_per_window: Some(50),
            window_seconds: Some(30),
            burst_capacity: Some(50),
        };
        let limit = resolve_effective_limit(&endpoint(Some(endpoint_override)), &service(Some(service_override)), &defaults());
        assert_eq!(limit.requests_per_window, 5);
        assert_eq!(limit.window_seconds, 10);
    }

    #[test]
    fn result_is_capped_at_platform_maximum() {
        let endpoint_override = RateLimitOverride {
            requests_per_window: Some(5000),
            window_seconds: Some(60),
            burst_capacity: Some(5000),
        };
        let limit = resolve_effective_limit(&endpoint(Some(endpoint_override)), &service(None), &defaults());
        assert_eq!(limit.requests_per_window, 1000);
        assert_eq!(limit.burst_capacity, 1000);
    }
}
