//! Trait contracts for everything the core treats as an external collaborator
//! (§6): persisted registry/auth state, the rate-limit backend, and the
//! observability sinks. Implementations live outside this crate; the core
//! only ever depends on these traits.

use async_trait::async_trait;

use crate::error::GatewayError;
use crate::model::{BucketState, EffectiveRateLimit, RateLimitDecision, RateLimitKey, Service};

/// CRUD over registered services, backing the service registry (§4.2, §6).
#[async_trait]
pub trait ServiceRegistrationRepository: Send + Sync {
    async fn list_services(&self) -> Result<Vec<Service>, GatewayError>;
    async fn put_service(&self, service: Service) -> Result<(), GatewayError>;
    async fn delete_service(&self, service_id: &str) -> Result<(), GatewayError>;
}

/// A hashed API key record as stored by the out-of-scope admin surface.
#[derive(Debug, Clone)]
pub struct ApiKeyRecord {
    pub key_id: String,
    pub key_hash: String,
    pub owner_sub: String,
    pub roles: Vec<String>,
    pub revoked: bool,
    pub expires_at: Option<chrono::DateTime<chrono::Utc>>,
}

#[async_trait]
pub trait ApiKeyRepository: Send + Sync {
    async fn find_by_hash(&self, key_hash: &str) -> Result<Option<ApiKeyRecord>, GatewayError>;
    async fn find_by_id(&self, key_id: &str) -> Result<Option<ApiKeyRecord>, GatewayError>;
}

#[async_trait]
pub trait RoleRepository: Send + Sync {
    /// Expands a role name into the permission set it grants.
    async fn permissions_for_role(&self, role: &str) -> Result<Vec<String>, GatewayError>;
}

#[async_trait]
pub trait GroupRepository: Send + Sync {
    /// Expands a group name into the roles its members inherit.
    async fn roles_for_group(&self, group: &str) -> Result<Vec<String>, GatewayError>;
}

#[derive(Debug, Clone)]
pub struct SessionRecord {
    pub session_id: String,
    pub user_id: String,
    pub roles: Vec<String>,
    pub groups: Vec<String>,
    pub expires_at: chrono::DateTime<chrono::Utc>,
}

#[async_trait]
pub trait SessionRepository: Send + Sync {
    async fn find_by_id(&self, session_id: &str) -> Result<Option<SessionRecord>, GatewayError>;
}

/// The backend behind the rate-limit engine (§4.5). An in-memory and a
/// distributed implementation both satisfy this; the engine itself is
/// backend-agnostic.
#[async_trait]
pub trait RateLimitBackend: Send + Sync {
    async fn check_and_consume(
        &self,
        key: &RateLimitKey,
        limit: &EffectiveRateLimit,
        now_millis: u64,
    ) -> RateLimitDecision;

    /// Best-effort status read with no consumption, used by tests and
    /// diagnostics (§8 invariant: non-consuming reads never decrease below
    /// the last reported `remaining`, modulo refill).
    async fn peek(&self, key: &RateLimitKey, now_millis: u64) -> Option<BucketState>;

    /// Releases all buckets associated with a WebSocket connection/session on
    /// close (§4.7 cleanup step).
    async fn remove_keys_matching(&self, ws_connection_id: &str);
}

/// Optional cache fronting the registry repository (§6 `ConfigurationCache`).
#[async_trait]
pub trait ConfigurationCache: Send + Sync {
    async fn get(&self, key: &str) -> Option<Vec<u8>>;
    async fn put(&self, key: &str, value: Vec<u8>);
    async fn invalidate(&self, key: &str);
}

/// Counters and histograms emitted at pipeline terminal states (§4.6).
pub trait Metrics: Send + Sync {
    fn incr_requests_total(&self, service_id: &str, status: u16);
    fn incr_errors_total(&self, classification: &str);
    fn incr_auth_failures(&self, reason: &str);
    fn incr_rate_limit_exceeded(&self, service_id: &str);
    fn observe_upstream_latency_ms(&self, service_id: &str, millis: f64);
    fn observe_request_bytes(&self, service_id: &str, bytes: u64);
    fn observe_response_bytes(&self, service_id: &str, bytes: u64);
    /// `proxy_timeout{host, phase}` (§4.8, §8 scenario 6): incremented when an
    /// outbound dispatch exceeds its deadline, tagged with the upstream host
    /// and which phase timed out.
    fn incr_proxy_timeout(&self, host: &str, phase: &str);
}

/// Security-relevant events worth a dedicated audit sink beyond ordinary logs.
pub trait SecurityMonitoring: Send + Sync {
    fn record_auth_failure(&self, client_id: &str, reason: &str);
    fn record_access_denied(&self, client_id: &str, service_id: &str);
}

/// Per-request traffic accounting consumed by billing/analytics collaborators.
pub trait TrafficAttributing: Send + Sync {
    fn record(&self, service_id: &str, request_bytes: u64, response_bytes: u64, duration_ms: f64);
}

/// A single CLIENT-kind span covering the outbound dispatch (§4.6).
pub trait Tracer: Send + Sync {
    fn start_client_span(&self, name: &str) -> Box<dyn SpanHandle>;
}

pub trait SpanHandle: Send {
    fn set_attribute(&mut self, key: &str, value: &str);
    fn record_error(&mut self, message: &str);
    fn end(self: Box<Self>);

    /// The W3C `traceparent` header value identifying this span's trace
    /// context, for injection into the outbound request (§4.8). `None` when
    /// the tracer implementation doesn't propagate a wire-level trace id
    /// (e.g. a no-op tracer).
    fn traceparent(&self) -> Option<String> {
        None
    }
}

/// Outcome of validating one credential against one provider (§4.3 step 3).
pub enum ValidationOutcome {
    /// This provider doesn't recognize the credential shape; try the next one.
    Skip,
    Valid {
        subject: String,
        roles: Vec<String>,
        groups: Vec<String>,
        /// An opaque server-side session identifier distinct from `subject`,
        /// when the credential resolved through one (session cookie/header).
        /// Carried onto `WebSocketProxySession.auth_session_id` so logout
        /// propagation (§4.3, §4.7) can match by session as well as by user.
        session_id: Option<String>,
    },
    Invalid {
        reason: String,
    },
}

#[async_trait]
pub trait TokenValidator: Send + Sync {
    /// Priority used to order providers; higher runs first (§4.3 step 3).
    fn priority(&self) -> i32;
    async fn validate(&self, credential: &str) -> ValidationOutcome;
}
