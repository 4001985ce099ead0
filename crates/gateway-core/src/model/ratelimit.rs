//! Rate-limit value types: keys, resolved limits, bucket state and decisions (§3, §4.5).

use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum RateLimitKeyKind {
    Http,
    WsConn,
    WsMsg,
}

impl fmt::Display for RateLimitKeyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RateLimitKeyKind::Http => "http",
            RateLimitKeyKind::WsConn => "ws_conn",
            RateLimitKeyKind::WsMsg => "ws_msg",
        };
        write!(f, "{s}")
    }
}

/// `(type, serviceId, endpointId?, clientId, wsConnectionId?)` — the unique
/// identity of one token bucket.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RateLimitKey {
    pub kind: RateLimitKeyKind,
    pub service_id: String,
    pub endpoint_id: Option<String>,
    pub client_id: String,
    pub ws_connection_id: Option<String>,
}

impl fmt::Display for RateLimitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}:{}",
            self.kind,
            self.service_id,
            self.endpoint_id.as_deref().unwrap_or("-"),
            self.client_id
        )?;
        if let Some(conn) = &self.ws_connection_id {
            write!(f, ":{conn}")?;
        }
        Ok(())
    }
}

/// Resolved limit for a given key, after endpoint → service → platform-default
/// fallthrough, capped at the platform maximum (§4.5).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EffectiveRateLimit {
    pub requests_per_window: u64,
    pub window_seconds: u64,
    pub burst_capacity: u64,
}

impl EffectiveRateLimit {
    pub fn refill_rate(&self) -> f64 {
        self.requests_per_window as f64 / self.window_seconds as f64
    }
}

/// `(tokens, lastRefillMillis)` — the persisted state of one bucket.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BucketState {
    pub tokens: f64,
    pub last_refill_millis: u64,
}

impl BucketState {
    pub fn initial(limit: &EffectiveRateLimit, now_millis: u64) -> Self {
        BucketState {
            tokens: limit.burst_capacity as f64,
            last_refill_millis: now_millis,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub remaining: u64,
    pub limit: u64,
    pub window_seconds: u64,
    pub reset_at_millis: u64,
    pub retry_after_seconds: u64,
    pub request_count: u64,
    pub new_state: Option<BucketState>,
}
