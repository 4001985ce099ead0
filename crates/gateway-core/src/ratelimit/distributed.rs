//! Distributed rate-limit backend (§4.5, §6 `RateLimiter`): wraps an external
//! atomic store (e.g. a Lua script executed against Redis) behind the same
//! `RateLimitBackend` port the in-memory backend implements, so the pipeline
//! never knows which one it's talking to.
//!
//! The actual store is an out-of-scope external collaborator (§1); this
//! module only owns the degrade-to-allow policy on store failure (§4.5, §7).

use async_trait::async_trait;
use log::warn;

use crate::model::{BucketState, EffectiveRateLimit, RateLimitDecision, RateLimitKey};
use crate::ports::{Metrics, RateLimitBackend};

/// The atomic primitive a distributed store must provide: execute the
/// token-bucket algorithm for one key in a single round trip, with the key
/// expiring at `2 * window_seconds` so abandoned buckets don't accumulate.
#[async_trait]
pub trait AtomicRateLimitStore: Send + Sync {
    async fn execute(&self, key: &RateLimitKey, limit: &EffectiveRateLimit, now_millis: u64) -> Result<RateLimitDecision, String>;
    async fn peek(&self, key: &RateLimitKey) -> Result<Option<BucketState>, String>;
    async fn remove_matching(&self, ws_connection_id: &str) -> Result<(), String>;
}

pub struct DistributedRateLimitBackend<S: AtomicRateLimitStore> {
    store: S,
    metrics: Option<std::sync::Arc<dyn Metrics>>,
}

impl<S: AtomicRateLimitStore> DistributedRateLimitBackend<S> {
    pub fn new(store: S, metrics: Option<std::sync::Arc<dyn Metrics>>) -> Self {
        DistributedRateLimitBackend { store, metrics }
    }

    fn degrade_to_allow(&self, limit: &EffectiveRateLimit, now_millis: u64, err: &str) -> RateLimitDecision {
        warn!("distributed rate-limit store error, degrading to allow: {err}");
        if let Some(metrics) = &self.metrics {
            metrics.incr_errors_total("rate_limit_store_error");
        }
        RateLimitDecision {
            allowed: true,
            remaining: limit.burst_capacity,
            limit: limit.requests_per_window,
            window_seconds: limit.window_seconds,
            reset_at_millis: now_millis,
            retry_after_seconds: 0,
            request_count: 0,
            new_state: None,
        }
    }
}

#[async_trait]
impl<S: AtomicRateLimitStore + Send + Sync> RateLimitBackend for DistributedRateLimitBackend<S> {
    async fn check_and_consume(&self, key: &RateLimitKey, limit: &EffectiveRateLimit, now_millis: u64) -> RateLimitDecision {
        match self.store.execute(key, limit, now_millis).await {
            Ok(decision) => decision,
            Err(err) => self.degrade_to_allow(limit, now_millis, &err),
        }
    }

    async fn peek(&self, key: &RateLimitKey, _now_millis: u64) -> Option<BucketState> {
        self.store.peek(key).await.ok().flatten()
    }

    async fn remove_keys_matching(&self, ws_connection_id: &str) {
        if let Err(err) = self.store.remove_matching(ws_connection_id).await {
            warn!("failed to release distributed rate-limit buckets for {ws_connection_id}: {err}");
        }
    }
}
