//! Minimal concrete adapters for the `gateway_core::ports` contracts.
//!
//! The registry repository, auth stores and observability sinks are external
//! collaborators by design (§1/§6) — gateway-core never depends on a concrete
//! implementation. This binary wires in the simplest adapters that make it
//! runnable: a JSON-file-backed service repository (seeded once at startup,
//! mutable in memory for the lifetime of the process) and logging-based
//! stand-ins for metrics/tracing/security/traffic, grounded on the teacher's
//! `MetricsCollector` atomic-counter shape (`routes/metrics.rs`).

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use gateway_core::error::GatewayError;
use gateway_core::model::Service;
use gateway_core::ports::{
    ApiKeyRecord, ApiKeyRepository, GroupRepository, Metrics, RoleRepository, SecurityMonitoring, ServiceRegistrationRepository, SessionRecord,
    SessionRepository, SpanHandle, Tracer, TrafficAttributing,
};
use log::{debug, info, warn};
use tokio::sync::RwLock;

/// Service registry seeded from a JSON file (`Vec<Service>`) at startup.
/// `put`/`delete` only mutate the in-memory copy — there is no external
/// admin surface wired up in this binary (§1 `RouteManager`/admin CRUD is
/// out of scope per DESIGN.md's feature-removal notes).
pub struct StaticServiceRepository {
    services: RwLock<Vec<Service>>,
}

impl StaticServiceRepository {
    pub fn from_file(path: &str) -> Self {
        let services = std::fs::read_to_string(path)
            .ok()
            .and_then(|raw| serde_json::from_str::<Vec<Service>>(&raw).ok())
            .unwrap_or_else(|| {
                warn!("no services file at '{path}' (or it failed to parse); starting with an empty registry");
                Vec::new()
            });
        info!("loaded {} service(s) from '{path}'", services.len());
        StaticServiceRepository {
            services: RwLock::new(services),
        }
    }
}

#[async_trait]
impl ServiceRegistrationRepository for StaticServiceRepository {
    async fn list_services(&self) -> Result<Vec<Service>, GatewayError> {
        Ok(self.services.read().await.clone())
    }

    async fn put_service(&self, service: Service) -> Result<(), GatewayError> {
        let mut guard = self.services.write().await;
        guard.retain(|s| s.service_id != service.service_id);
        guard.push(service);
        Ok(())
    }

    async fn delete_service(&self, service_id: &str) -> Result<(), GatewayError> {
        self.services.write().await.retain(|s| s.service_id != service_id);
        Ok(())
    }
}

/// No API-key store configured: every lookup misses, so the `ApiKeyTokenValidator`
/// reports every credential as an unknown key rather than crashing.
pub struct NoApiKeyRepository;

#[async_trait]
impl ApiKeyRepository for NoApiKeyRepository {
    async fn find_by_hash(&self, _key_hash: &str) -> Result<Option<ApiKeyRecord>, GatewayError> {
        Ok(None)
    }

    async fn find_by_id(&self, _key_id: &str) -> Result<Option<ApiKeyRecord>, GatewayError> {
        Ok(None)
    }
}

/// No session store configured: every lookup misses, so `SessionTokenValidator`
/// always `Skip`s and defers to the next validator in the chain.
pub struct NoSessionRepository;

#[async_trait]
impl SessionRepository for NoSessionRepository {
    async fn find_by_id(&self, _session_id: &str) -> Result<Option<SessionRecord>, GatewayError> {
        Ok(None)
    }
}

/// Flat role→permission map with no external identity provider: every role
/// grants itself as its own permission string. A real deployment wires this
/// to an IAM/role store instead.
pub struct FlatRoleRepository;

#[async_trait]
impl RoleRepository for FlatRoleRepository {
    async fn permissions_for_role(&self, role: &str) -> Result<Vec<String>, GatewayError> {
        Ok(vec![role.to_string()])
    }
}

/// No group hierarchy configured: a group never grants any role.
pub struct NoGroupRepository;

#[async_trait]
impl GroupRepository for NoGroupRepository {
    async fn roles_for_group(&self, _group: &str) -> Result<Vec<String>, GatewayError> {
        Ok(vec![])
    }
}

/// Atomic in-process counters behind the `Metrics` port, grounded on the
/// teacher's `MetricsCollector` (`routes/metrics.rs`). No HTTP surface is
/// exposed for them (DESIGN.md: the spec keeps only the port, not an endpoint).
#[derive(Default)]
pub struct AtomicMetrics {
    requests_total: AtomicU64,
    errors_total: AtomicU64,
    auth_failures_total: AtomicU64,
    rate_limit_exceeded_total: AtomicU64,
    proxy_timeouts_total: AtomicU64,
}

impl Metrics for AtomicMetrics {
    fn incr_requests_total(&self, service_id: &str, status: u16) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
        debug!("request to {service_id} completed with status {status}");
    }

    fn incr_errors_total(&self, classification: &str) {
        self.errors_total.fetch_add(1, Ordering::Relaxed);
        debug!("request failed: {classification}");
    }

    fn incr_auth_failures(&self, reason: &str) {
        self.auth_failures_total.fetch_add(1, Ordering::Relaxed);
        debug!("auth failure: {reason}");
    }

    fn incr_rate_limit_exceeded(&self, service_id: &str) {
        self.rate_limit_exceeded_total.fetch_add(1, Ordering::Relaxed);
        debug!("rate limit exceeded for {service_id}");
    }

    fn observe_upstream_latency_ms(&self, service_id: &str, millis: f64) {
        debug!("upstream latency for {service_id}: {millis:.1}ms");
    }

    fn observe_request_bytes(&self, _service_id: &str, _bytes: u64) {}

    fn observe_response_bytes(&self, _service_id: &str, _bytes: u64) {}

    fn incr_proxy_timeout(&self, host: &str, phase: &str) {
        self.proxy_timeouts_total.fetch_add(1, Ordering::Relaxed);
        warn!("proxy timeout dispatching to {host} during {phase} phase");
    }
}

pub struct LoggingSecurityMonitoring;

impl SecurityMonitoring for LoggingSecurityMonitoring {
    fn record_auth_failure(&self, client_id: &str, reason: &str) {
        warn!("security: auth failure from {client_id}: {reason}");
    }

    fn record_access_denied(&self, client_id: &str, service_id: &str) {
        warn!("security: access denied for {client_id} on service {service_id}");
    }
}

pub struct LoggingTrafficAttributing;

impl TrafficAttributing for LoggingTrafficAttributing {
    fn record(&self, service_id: &str, request_bytes: u64, response_bytes: u64, duration_ms: f64) {
        debug!("traffic: {service_id} req={request_bytes}B resp={response_bytes}B duration={duration_ms:.1}ms");
    }
}

/// No-op tracer: a real deployment swaps this for an OpenTelemetry exporter.
pub struct NoopTracer;

impl Tracer for NoopTracer {
    fn start_client_span(&self, _name: &str) -> Box<dyn SpanHandle> {
        Box::new(NoopSpan)
    }
}

struct NoopSpan;

impl SpanHandle for NoopSpan {
    fn set_attribute(&mut self, _key: &str, _value: &str) {}
    fn record_error(&mut self, _message: &str) {}
    fn end(self: Box<Self>) {}
}
