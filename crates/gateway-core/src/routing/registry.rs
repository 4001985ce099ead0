//! Service registry: an in-memory indexed view of all registered services and
//! endpoints, refreshed from a repository on a TTL (§4.2).
//!
//! Grounded on the teacher's `RouteManager`/`RouteHandler` split (a hot,
//! read-mostly view rebuilt from config) generalized to pull from a
//! repository port instead of a static file, and published through
//! `ArcSwap` so readers never take a lock (§5).

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use ahash::AHashMap;
use arc_swap::ArcSwap;
use dashmap::DashMap;
use log::warn;
use tokio::sync::Mutex;

use crate::error::GatewayError;
use crate::model::{is_valid_service_id, route_match::RouteMatch, service::Service};
use crate::ports::ServiceRegistrationRepository;

use super::path_matcher::{method_matches, CompiledPattern};

struct CompiledEndpoint {
    pattern: CompiledPattern,
    service: Service,
    endpoint_index: usize,
    registration_order: u64,
}

struct RegistrySnapshot {
    pass_through: AHashMap<String, Service>,
    gateway_endpoints: Vec<CompiledEndpoint>,
    built_at: Instant,
}

impl RegistrySnapshot {
    fn empty() -> Self {
        RegistrySnapshot {
            pass_through: AHashMap::new(),
            gateway_endpoints: Vec::new(),
            built_at: Instant::now(),
        }
    }

    fn from_services(
        services: Vec<Service>,
        max_entries: usize,
        registration_counter: &AtomicU64,
        access_log: &DashMap<String, Instant>,
    ) -> Self {
        let mut services = services;
        if services.len() > max_entries {
            // LRU eviction (§4.2): keep the `max_entries` services most
            // recently touched by `find_service`/`find_route_*`; a service
            // never accessed sorts as least-recently-used and is evicted first.
            services.sort_by_key(|s| std::cmp::Reverse(access_log.get(&s.service_id).map(|t| *t)));
            let evicted: Vec<&str> = services[max_entries..].iter().map(|s| s.service_id.as_str()).collect();
            warn!(
                "registry snapshot at capacity: {} services exceed max_entries={}, evicting least-recently-used: {:?}",
                services.len(),
                max_entries,
                evicted
            );
            services.truncate(max_entries);
            for service in &services {
                access_log.entry(service.service_id.clone()).or_insert_with(Instant::now);
            }
        }

        let mut pass_through = AHashMap::new();
        let mut gateway_endpoints = Vec::new();

        for service in services {
            for (idx, endpoint) in service.endpoints.iter().enumerate() {
                match CompiledPattern::compile(&endpoint.path) {
                    Ok(pattern) => {
                        let order = registration_counter.fetch_add(1, Ordering::Relaxed);
                        gateway_endpoints.push(CompiledEndpoint {
                            pattern,
                            service: service.clone(),
                            endpoint_index: idx,
                            registration_order: order,
                        });
                    }
                    Err(err) => warn!(
                        "skipping endpoint {} on service {}: invalid pattern: {err}",
                        endpoint.path, service.service_id
                    ),
                }
            }
            pass_through.insert(service.service_id.clone(), service);
        }

        gateway_endpoints.sort_by(|a, b| {
            b.pattern
                .specificity
                .cmp(&a.pattern.specificity)
                .then(a.registration_order.cmp(&b.registration_order))
        });

        RegistrySnapshot {
            pass_through,
            gateway_endpoints,
            built_at: Instant::now(),
        }
    }
}

/// The service registry (§4.2). `find_route` implements both pass-through
/// mode (first path segment is a known `serviceId`) and gateway mode
/// (explicit endpoint patterns matched across all services) per DESIGN.md
/// open-question resolution #2: both modes coexist, selected by the caller
/// based on whether the request path falls under `/gateway/...`.
pub struct ServiceRegistry {
    repository: Arc<dyn ServiceRegistrationRepository>,
    snapshot: ArcSwap<RegistrySnapshot>,
    ttl: Duration,
    max_entries: AtomicUsize,
    registration_counter: AtomicU64,
    refresh_lock: Mutex<()>,
    /// Last-access timestamp per `serviceId`, independent of the snapshot
    /// itself, so an LRU eviction decision at the next refresh survives the
    /// snapshot being rebuilt from scratch (§4.2).
    access_log: DashMap<String, Instant>,
}

impl ServiceRegistry {
    pub fn new(repository: Arc<dyn ServiceRegistrationRepository>, ttl: Duration, max_entries: usize) -> Self {
        ServiceRegistry {
            repository,
            snapshot: ArcSwap::from_pointee(RegistrySnapshot::empty()),
            ttl,
            max_entries: AtomicUsize::new(max_entries),
            registration_counter: AtomicU64::new(0),
            refresh_lock: Mutex::new(()),
            access_log: DashMap::new(),
        }
    }

    fn touch(&self, service_id: &str) {
        self.access_log.insert(service_id.to_string(), Instant::now());
    }

    #[cfg(test)]
    fn max_entries_for_test(&self, max_entries: usize) {
        self.max_entries.store(max_entries, Ordering::Relaxed);
    }

    /// Forces an initial load; call once at startup so the first request
    /// doesn't pay a cold-cache penalty and so a misconfigured repository
    /// fails fast rather than silently serving an empty registry.
    pub async fn load(&self) -> Result<(), GatewayError> {
        self.refresh().await
    }

    async fn refresh(&self) -> Result<(), GatewayError> {
        let _guard = self.refresh_lock.lock().await;
        let services = self.repository.list_services().await?;
        let max_entries = self.max_entries.load(Ordering::Relaxed);
        let snapshot = RegistrySnapshot::from_services(services, max_entries, &self.registration_counter, &self.access_log);
        self.snapshot.store(Arc::new(snapshot));
        Ok(())
    }

    async fn ensure_fresh(&self) {
        let stale = self.snapshot.load().built_at.elapsed() >= self.ttl;
        if !stale {
            return;
        }
        if let Err(err) = self.refresh().await {
            warn!("registry refresh failed, serving stale snapshot: {err}");
        }
    }

    pub async fn find_service(&self, service_id: &str) -> Result<Service, GatewayError> {
        self.ensure_fresh().await;
        let snapshot = self.snapshot.load();
        let found = snapshot.pass_through.get(service_id).cloned().ok_or_else(|| GatewayError::ServiceNotFound {
            service_id: service_id.to_string(),
        })?;
        self.touch(service_id);
        Ok(found)
    }

    /// Gateway-mode resolution: scans compiled endpoints across all services,
    /// sorted by descending specificity with registration-order tie-break,
    /// and returns the first whose pattern and method both match (§4.1, §4.2).
    pub async fn find_route_gateway_mode(&self, path: &str, method: &str) -> Result<RouteMatch, GatewayError> {
        self.ensure_fresh().await;
        let snapshot = self.snapshot.load();

        for compiled in snapshot.gateway_endpoints.iter() {
            if let Some(variables) = compiled.pattern.matches(path) {
                let endpoint = &compiled.service.endpoints[compiled.endpoint_index];
                if method_matches(&endpoint.methods, method) {
                    self.touch(&compiled.service.service_id);
                    return Ok(RouteMatch {
                        service: compiled.service.clone(),
                        endpoint: endpoint.clone(),
                        matched_path_on_service: path.to_string(),
                        path_variables: variables,
                    });
                }
            }
        }

        Err(GatewayError::RouteNotFound {
            method: method.to_string(),
            path: path.to_string(),
        })
    }

    /// Pass-through mode: the first path segment is the `serviceId`; the
    /// remainder is forwarded verbatim under a synthetic any-method endpoint.
    pub async fn find_route_pass_through(&self, path: &str, method: &str) -> Result<RouteMatch, GatewayError> {
        self.ensure_fresh().await;

        let trimmed = path.trim_start_matches('/');
        let mut parts = trimmed.splitn(2, '/');
        let service_id = parts.next().unwrap_or("");
        let rest = parts.next().unwrap_or("");

        if !is_valid_service_id(service_id) {
            return Err(GatewayError::RouteNotFound {
                method: method.to_string(),
                path: path.to_string(),
            });
        }

        let service = self.find_service(service_id).await?;
        let endpoint = super::pass_through_endpoint();

        Ok(RouteMatch {
            service,
            endpoint,
            matched_path_on_service: format!("/{rest}"),
            path_variables: Default::default(),
        })
    }

    pub async fn put(&self, service: Service) -> Result<(), GatewayError> {
        self.repository.put_service(service).await?;
        self.refresh().await
    }

    pub async fn delete(&self, service_id: &str) -> Result<(), GatewayError> {
        self.repository.delete_service(service_id).await?;
        self.refresh().await
    }

    pub async fn list(&self) -> Result<Vec<Service>, GatewayError> {
        self.ensure_fresh().await;
        Ok(self.snapshot.load().pass_through.values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::service::Visibility;
    use async_trait::async_trait;
    use std::sync::RwLock as StdRwLock;

    struct FakeRepository(StdRwLock<Vec<Service>>);

    #[async_trait]
    impl ServiceRegistrationRepository for FakeRepository {
        async fn list_services(&self) -> Result<Vec<Service>, GatewayError> {
            Ok(self.0.read().unwrap().clone())
        }
        async fn put_service(&self, service: Service) -> Result<(), GatewayError> {
            self.0.write().unwrap().push(service);
            Ok(())
        }
        async fn delete_service(&self, service_id: &str) -> Result<(), GatewayError> {
            self.0.write().unwrap().retain(|s| s.service_id != service_id);
            Ok(())
        }
    }

    fn bare_service(id: &str) -> Service {
        Service {
            service_id: id.to_string(),
            display_name: id.to_string(),
            base_url: format!("http://{id}:3000"),
            endpoints: vec![],
            access: None,
            rate_limit: None,
            sampling: None,
            default_visibility: Visibility::Public,
            default_auth_required: false,
            route_prefix: None,
        }
    }

    #[tokio::test]
    async fn find_service_hits_after_load() {
        let repo = Arc::new(FakeRepository(StdRwLock::new(vec![bare_service("users")])));
        let registry = ServiceRegistry::new(repo, Duration::from_secs(30), 100);
        registry.load().await.unwrap();

        let found = registry.find_service("users").await.unwrap();
        assert_eq!(found.service_id, "users");
        assert!(matches!(
            registry.find_service("missing").await,
            Err(GatewayError::ServiceNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn put_and_delete_invalidate_the_snapshot_immediately() {
        let repo = Arc::new(FakeRepository(StdRwLock::new(vec![])));
        let registry = ServiceRegistry::new(repo, Duration::from_secs(30), 100);
        registry.load().await.unwrap();

        registry.put(bare_service("orders")).await.unwrap();
        assert!(registry.find_service("orders").await.is_ok());

        registry.delete("orders").await.unwrap();
        assert!(matches!(
            registry.find_service("orders").await,
            Err(GatewayError::ServiceNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn stale_snapshot_served_when_repository_errors() {
        struct FailingRepository;
        #[async_trait]
        impl ServiceRegistrationRepository for FailingRepository {
            async fn list_services(&self) -> Result<Vec<Service>, GatewayError> {
                Err(GatewayError::StorageUnavailable {
                    message: "down".to_string(),
                })
            }
            async fn put_service(&self, _service: Service) -> Result<(), GatewayError> {
                Err(GatewayError::StorageUnavailable {
                    message: "down".to_string(),
                })
            }
            async fn delete_service(&self, _service_id: &str) -> Result<(), GatewayError> {
                Err(GatewayError::StorageUnavailable {
                    message: "down".to_string(),
                })
            }
        }

        let registry = ServiceRegistry::new(Arc::new(FailingRepository), Duration::from_secs(30), 100);
        assert!(registry.load().await.is_err());
        // Empty snapshot still served rather than panicking.
        assert!(matches!(
            registry.find_service("users").await,
            Err(GatewayError::ServiceNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn eviction_at_capacity_keeps_most_recently_accessed_services() {
        let repo = Arc::new(FakeRepository(StdRwLock::new(vec![
            bare_service("a"),
            bare_service("b"),
            bare_service("c"),
        ])));
        let registry = ServiceRegistry::new(repo, Duration::from_secs(30), 3);
        registry.load().await.unwrap();

        // Access "a" and "c" so "b" is the least-recently-used entry, then
        // force a refresh under a tightened capacity of 2.
        registry.find_service("a").await.unwrap();
        registry.find_service("c").await.unwrap();
        registry.max_entries_for_test(2);
        registry.refresh().await.unwrap();

        assert!(registry.find_service("a").await.is_ok());
        assert!(registry.find_service("c").await.is_ok());
        assert!(matches!(
            registry.find_service("b").await,
            Err(GatewayError::ServiceNotFound { .. })
        ));
    }
}
