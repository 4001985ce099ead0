//! The gateway's two request state machines: HTTP (§4.6) and WebSocket (§4.7).
//!
//! Grounded on the teacher's `RouteHandler`/`WebSocketHandler` split — one
//! type per protocol, both built around the same resolved route and shared
//! collaborators — generalized so those collaborators are trait objects
//! (`ports::*`) instead of concrete teacher types, and so route resolution
//! covers both pass-through and gateway mode (DESIGN.md resolution #2)
//! instead of the teacher's single static route table.

pub mod http;
pub mod ws;

use std::net::IpAddr;
use std::sync::Arc;

use crate::auth::AuthEvaluator;
use crate::config::settings::{LimitsConfig, WebSocketConfig};
use crate::error::GatewayError;
use crate::model::route_match::RouteMatch;
use crate::net::TrustedProxyValidator;
use crate::ports::{Metrics, RateLimitBackend, SecurityMonitoring, Tracer, TrafficAttributing};
use crate::prepare::RequestPreparer;
use crate::ratelimit::PlatformRateLimitDefaults;
use crate::routing::ServiceRegistry;
use crate::session_table::SessionTable;
use crate::transport::HttpTransport;

pub use http::HttpPipeline;
pub use ws::WsPipeline;

/// Collaborators shared by both pipelines, wired once at startup (§6).
/// Optional observability ports are `None` when the binary runs without a
/// configured collaborator for them — every call site treats that as a no-op,
/// not an error, since metrics/tracing/security sinks are genuinely optional.
pub struct PipelineContext {
    pub registry: Arc<ServiceRegistry>,
    pub rate_limit_backend: Arc<dyn RateLimitBackend>,
    pub rate_limiting_enabled: bool,
    pub rate_limit_headers_enabled: bool,
    pub http_rate_limit_defaults: PlatformRateLimitDefaults,
    pub ws_connection_rate_limit_defaults: PlatformRateLimitDefaults,
    pub ws_connection_rate_limit_enabled: bool,
    pub ws_message_rate_limit_defaults: PlatformRateLimitDefaults,
    pub ws_message_rate_limit_enabled: bool,
    pub auth: Arc<AuthEvaluator>,
    pub preparer: Arc<RequestPreparer>,
    pub transport: Arc<HttpTransport>,
    pub trusted_proxy: Arc<TrustedProxyValidator>,
    pub limits: LimitsConfig,
    pub websocket: WebSocketConfig,
    pub session_table: Arc<SessionTable>,
    pub metrics: Option<Arc<dyn Metrics>>,
    pub security: Option<Arc<dyn SecurityMonitoring>>,
    pub traffic: Option<Arc<dyn TrafficAttributing>>,
    pub tracer: Option<Arc<dyn Tracer>>,
}

const GATEWAY_MODE_PREFIX: &str = "/gateway";

/// Resolves a request path/method against the registry, selecting
/// pass-through or gateway mode per DESIGN.md resolution #2: a path under
/// `/gateway/...` always resolves in gateway mode; any other first segment is
/// looked up as a `serviceId` in pass-through mode.
pub(crate) async fn resolve_route(registry: &ServiceRegistry, path: &str, method: &str) -> Result<RouteMatch, GatewayError> {
    if let Some(rest) = path.strip_prefix(GATEWAY_MODE_PREFIX) {
        let rest = if rest.is_empty() { "/" } else { rest };
        registry.find_route_gateway_mode(rest, method).await
    } else {
        registry.find_route_pass_through(path, method).await
    }
}

/// Resolves the client's source IP, honoring `X-Forwarded-For` only when the
/// immediate peer is a configured trusted proxy (§2 component 3). Takes the
/// left-most (original client) entry, per RFC 7239 §4 ordering.
pub(crate) fn resolve_client_ip(peer_addr: Option<IpAddr>, forwarded_for: Option<&str>, trusted_proxy: &TrustedProxyValidator) -> Option<IpAddr> {
    if let Some(peer) = peer_addr {
        if trusted_proxy.is_trusted(peer) {
            if let Some(first_hop) = forwarded_for.and_then(|header| header.split(',').next()) {
                if let Ok(parsed) = first_hop.trim().parse::<IpAddr>() {
                    return Some(parsed);
                }
            }
        }
    }
    peer_addr
}

pub(crate) fn current_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
