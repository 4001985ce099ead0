//! In-memory rate-limit backend (§4.5, §5): a sharded concurrent map keyed by
//! `RateLimitKey`, with per-entry locking so `check_and_consume` is
//! linearizable per key while distinct keys never contend.
//!
//! Tracks `last_access` separately from the algorithm's `last_refill_millis`
//! (DESIGN.md open-question resolution #3): the former drives the cleanup
//! sweep's staleness check and is updated on every read or write, while the
//! latter is pure algorithm state the bucket function owns. Conflating them
//! would let a burst of `peek()` calls (no consumption) keep an otherwise-idle
//! bucket alive indefinitely, or worse, let the cleanup sweep race the
//! refill math.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};

use crate::model::{BucketState, EffectiveRateLimit, RateLimitDecision, RateLimitKey};
use crate::ports::RateLimitBackend;

use super::bucket::check_and_consume;

struct Entry {
    state: BucketState,
    last_access_millis: u64,
}

pub struct InMemoryRateLimitBackend {
    entries: RwLock<ahash::AHashMap<RateLimitKey, Arc<Mutex<Entry>>>>,
}

impl InMemoryRateLimitBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(InMemoryRateLimitBackend {
            entries: RwLock::new(ahash::AHashMap::new()),
        })
    }

    async fn entry_for(&self, key: &RateLimitKey) -> Arc<Mutex<Entry>> {
        if let Some(existing) = self.entries.read().await.get(key) {
            return existing.clone();
        }
        let mut write_guard = self.entries.write().await;
        write_guard
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(Entry { state: BucketState { tokens: 0.0, last_refill_millis: 0 }, last_access_millis: 0 })))
            .clone()
    }

    /// Spawns the 60s cleanup sweep (§4.5). Evicts entries whose
    /// `last_access_millis` is more than `2 * window_millis` old, using the
    /// widest configured window so no backend's bucket is evicted early.
    pub fn spawn_cleanup(self: &Arc<Self>, window_seconds: u64) -> tokio::task::JoinHandle<()> {
        let backend = self.clone();
        let stale_after_millis = 2 * window_seconds * 1000;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(60));
            loop {
                interval.tick().await;
                let now = now_millis();
                let mut write_guard = backend.entries.write().await;
                let mut stale_keys = Vec::new();
                for (key, entry) in write_guard.iter() {
                    let last_access = entry.lock().await.last_access_millis;
                    if now.saturating_sub(last_access) > stale_after_millis {
                        stale_keys.push(key.clone());
                    }
                }
                for key in stale_keys {
                    write_guard.remove(&key);
                }
            }
        })
    }
}

fn now_millis() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}

#[async_trait]
impl RateLimitBackend for InMemoryRateLimitBackend {
    async fn check_and_consume(&self, key: &RateLimitKey, limit: &EffectiveRateLimit, now_millis: u64) -> RateLimitDecision {
        let entry = self.entry_for(key).await;
        let mut guard = entry.lock().await;

        let previous = if guard.last_access_millis == 0 { None } else { Some(guard.state) };
        let (decision, new_state) = check_and_consume(previous, limit, now_millis);

        guard.state = new_state;
        guard.last_access_millis = now_millis;

        decision
    }

    async fn peek(&self, key: &RateLimitKey, _now_millis: u64) -> Option<BucketState> {
        let entries = self.entries.read().await;
        let entry = entries.get(key)?.clone();
        drop(entries);
        let guard = entry.lock().await;
        if guard.last_access_millis == 0 {
            None
        } else {
            Some(guard.state)
        }
    }

    async fn remove_keys_matching(&self, ws_connection_id: &str) {
        let mut write_guard = self.entries.write().await;
        write_guard.retain(|key, _| key.ws_connection_id.as_deref() != Some(ws_connection_id));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RateLimitKeyKind;

    fn key() -> RateLimitKey {
        RateLimitKey {
            kind: RateLimitKeyKind::Http,
            service_id: "users".to_string(),
            endpoint_id: Some("e1".to_string()),
            client_id: "client-1".to_string(),
            ws_connection_id: None,
        }
    }

    fn limit() -> EffectiveRateLimit {
        EffectiveRateLimit {
            requests_per_window: 2,
            window_seconds: 60,
            burst_capacity: 2,
        }
    }

    #[tokio::test]
    async fn first_request_allowed_and_subsequent_rejected() {
        let backend = InMemoryRateLimitBackend::new();
        let k = key();
        let l = limit();

        let d1 = backend.check_and_consume(&k, &l, 0).await;
        assert!(d1.allowed);
        let d2 = backend.check_and_consume(&k, &l, 0).await;
        assert!(d2.allowed);
        let d3 = backend.check_and_consume(&k, &l, 0).await;
        assert!(!d3.allowed);
    }

    #[tokio::test]
    async fn remove_keys_matching_evicts_ws_buckets() {
        let backend = InMemoryRateLimitBackend::new();
        let mut k = key();
        k.ws_connection_id = Some("conn-1".to_string());
        let l = limit();
        backend.check_and_consume(&k, &l, 0).await;
        assert!(backend.peek(&k, 0).await.is_some());
        backend.remove_keys_matching("conn-1").await;
        assert!(backend.peek(&k, 0).await.is_none());
    }

    #[tokio::test]
    async fn peek_does_not_consume() {
        let backend = InMemoryRateLimitBackend::new();
        let k = key();
        let l = limit();
        let decision = backend.check_and_consume(&k, &l, 0).await;
        let peeked = backend.peek(&k, 0).await.unwrap();
        assert_eq!(peeked.tokens, decision.new_state.unwrap().tokens);
    }
}
