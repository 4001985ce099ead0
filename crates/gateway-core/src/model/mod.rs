//! Core value types for the gateway's data model (service registry entries,
//! route matches, rate-limit records, the wire-level request/response shapes,
//! downstream tokens and WebSocket session records).
//!
//! Every type here is a plain value: construction and field access only, no
//! network or storage behavior. Behavior lives in `routing`, `ratelimit`,
//! `auth`, `prepare`, `pipeline` and `transport`, all of which operate on
//! these types.

pub mod access;
pub mod ratelimit;
pub mod request;
pub mod route_match;
pub mod service;
pub mod token;
pub mod ws_session;

pub use access::AccessConfig;
pub use ratelimit::{BucketState, EffectiveRateLimit, RateLimitDecision, RateLimitKey, RateLimitKeyKind};
pub use request::{GatewayRequest, PreparedProxyRequest, ProxyResponse, RequestBody};
pub use route_match::RouteMatch;
pub use service::{Endpoint, EndpointType, Service, Visibility};
pub use token::DownstreamClaims;
pub use ws_session::{CloseIntent, SharedSession, WebSocketProxySession};

/// Reserved first path segments that can never be registered as a `serviceId` (§3, §6).
pub const RESERVED_SERVICE_IDS: &[&str] = &["admin", "gateway", "q"];

/// Validates the `[a-z0-9-]+` / non-reserved invariant on a `serviceId` (§3).
pub fn is_valid_service_id(service_id: &str) -> bool {
    !service_id.is_empty()
        && !RESERVED_SERVICE_IDS.contains(&service_id)
        && service_id
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_reserved_and_malformed_ids() {
        assert!(!is_valid_service_id("admin"));
        assert!(!is_valid_service_id("gateway"));
        assert!(!is_valid_service_id("q"));
        assert!(!is_valid_service_id(""));
        assert!(!is_valid_service_id("Users"));
        assert!(!is_valid_service_id("users_api"));
        assert!(is_valid_service_id("users"));
        assert!(is_valid_service_id("users-v2"));
    }
}
