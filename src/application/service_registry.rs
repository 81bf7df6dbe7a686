//! Service Registry
//!
//! Process-local map of service name to endpoints, plus one circuit breaker
//! per endpoint and the background health-check loop that keeps endpoint
//! status fresh.

use crate::domain::entities::{EndpointSnapshot, EndpointSpec, ServiceEndpoint};
use crate::domain::errors::RegistryError;
use crate::domain::ports::{Clock, EndpointRepository, HttpClient};
use crate::infrastructure::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
use crate::infrastructure::health_checker::{HealthCheckConfig, HealthChecker};
use crate::infrastructure::shutdown::ShutdownController;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Registry-wide defaults.
#[derive(Debug, Clone, Copy)]
pub struct RegistryConfig {
    /// Breaker settings for endpoints that do not override them
    pub breaker: CircuitBreakerConfig,
    /// Timeout applied to each health probe
    pub health_check_timeout: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            breaker: CircuitBreakerConfig::default(),
            health_check_timeout: Duration::from_secs(5),
        }
    }
}

/// Admin view of one endpoint together with its breaker.
#[derive(Debug, Clone, Serialize)]
pub struct EndpointView {
    #[serde(flatten)]
    pub endpoint: EndpointSnapshot,
    pub circuit_state: CircuitState,
    pub circuit_failures: u32,
}

/// Admin view of a service.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceView {
    pub name: String,
    pub endpoints: Vec<EndpointView>,
}

/// Authoritative set of endpoints per service.
///
/// The endpoint map is read on every routed request and written only on
/// register/unregister, hence the read-write lock. Per-endpoint runtime state
/// lives on the endpoints themselves.
pub struct ServiceRegistry {
    services: RwLock<HashMap<String, Vec<Arc<ServiceEndpoint>>>>,
    breakers: DashMap<String, Arc<CircuitBreaker>>,
    http: Arc<dyn HttpClient>,
    clock: Arc<dyn Clock>,
    config: RegistryConfig,
    health_task: Mutex<Option<JoinHandle<()>>>,
}

impl ServiceRegistry {
    pub fn new(http: Arc<dyn HttpClient>, clock: Arc<dyn Clock>, config: RegistryConfig) -> Self {
        Self {
            services: RwLock::new(HashMap::new()),
            breakers: DashMap::new(),
            http,
            clock,
            config,
            health_task: Mutex::new(None),
        }
    }

    /// Add an endpoint to a service and create its closed breaker.
    ///
    /// Returns the endpoint id (generated when the spec has none). Ids must be
    /// unique across all services.
    pub fn register_service(&self, service_name: &str, spec: EndpointSpec) -> Result<String, RegistryError> {
        if service_name.trim().is_empty() {
            return Err(RegistryError::InvalidEndpoint("service name is empty".into()));
        }
        if !(spec.url.starts_with("http://") || spec.url.starts_with("https://")) {
            return Err(RegistryError::InvalidEndpoint(format!(
                "url must start with http:// or https://, got {:?}",
                spec.url
            )));
        }
        if spec.timeout_ms == 0 {
            return Err(RegistryError::InvalidEndpoint("timeout must be positive".into()));
        }
        if spec.failure_threshold == Some(0) {
            return Err(RegistryError::InvalidEndpoint(
                "failure threshold must be positive".into(),
            ));
        }

        let id = spec
            .id
            .clone()
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        let breaker_config = CircuitBreakerConfig {
            failure_threshold: spec
                .failure_threshold
                .unwrap_or(self.config.breaker.failure_threshold),
            cooldown: spec
                .cooldown_secs
                .map(Duration::from_secs)
                .unwrap_or(self.config.breaker.cooldown),
        };

        let mut services = self.services.write();
        if self.breakers.contains_key(&id) {
            return Err(RegistryError::DuplicateEndpoint(id));
        }

        let endpoint = Arc::new(ServiceEndpoint::from_spec(id.clone(), service_name, &spec));
        self.breakers.insert(
            id.clone(),
            Arc::new(CircuitBreaker::new(id.clone(), breaker_config, self.clock.clone())),
        );
        services
            .entry(service_name.to_string())
            .or_default()
            .push(endpoint);

        tracing::info!(
            "registered endpoint {} for service {} at {}",
            id,
            service_name,
            spec.url
        );
        Ok(id)
    }

    /// Remove an endpoint and discard its breaker. Unknown ids are a no-op.
    ///
    /// Returns whether something was removed.
    pub fn unregister_service(&self, service_name: &str, endpoint_id: &str) -> bool {
        let mut services = self.services.write();
        let Some(endpoints) = services.get_mut(service_name) else {
            return false;
        };

        let before = endpoints.len();
        endpoints.retain(|e| e.id != endpoint_id);
        let removed = endpoints.len() != before;

        if endpoints.is_empty() {
            services.remove(service_name);
        }
        if removed {
            self.breakers.remove(endpoint_id);
            tracing::info!("unregistered endpoint {} from service {}", endpoint_id, service_name);
        }
        removed
    }

    /// Endpoints of a service that are HEALTHY or DEGRADED.
    pub fn get_healthy_endpoints(&self, service_name: &str) -> Vec<Arc<ServiceEndpoint>> {
        self.services
            .read()
            .get(service_name)
            .map(|endpoints| endpoints.iter().filter(|e| e.is_routable()).cloned().collect())
            .unwrap_or_default()
    }

    /// All endpoints of a service regardless of status.
    pub fn endpoints(&self, service_name: &str) -> Vec<Arc<ServiceEndpoint>> {
        self.services
            .read()
            .get(service_name)
            .cloned()
            .unwrap_or_default()
    }

    pub fn endpoint(&self, endpoint_id: &str) -> Option<Arc<ServiceEndpoint>> {
        self.services
            .read()
            .values()
            .flatten()
            .find(|e| e.id == endpoint_id)
            .cloned()
    }

    /// Breaker guarding an endpoint.
    pub fn breaker(&self, endpoint_id: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.get(endpoint_id).map(|b| b.value().clone())
    }

    pub fn service_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.services.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn service_count(&self) -> usize {
        self.services.read().len()
    }

    /// Snapshot of every service for admin listings, sorted by name.
    pub fn describe(&self) -> Vec<ServiceView> {
        let services = self.services.read();
        let mut views: Vec<ServiceView> = services
            .iter()
            .map(|(name, endpoints)| ServiceView {
                name: name.clone(),
                endpoints: endpoints
                    .iter()
                    .map(|e| {
                        let breaker = self.breaker(&e.id);
                        EndpointView {
                            endpoint: e.snapshot(),
                            circuit_state: breaker.as_ref().map(|b| b.state()).unwrap_or_default(),
                            circuit_failures: breaker.as_ref().map(|b| b.failure_count()).unwrap_or(0),
                        }
                    })
                    .collect(),
            })
            .collect();
        views.sort_by(|a, b| a.name.cmp(&b.name));
        views
    }

    /// Start (or restart) the background health-check loop.
    ///
    /// A zero interval falls back to the default interval.
    pub fn start_health_checks(self: &Arc<Self>, interval: Duration) {
        let interval = if interval.is_zero() {
            let fallback = HealthCheckConfig::default().interval;
            tracing::warn!("health check interval must be positive, using {:?}", fallback);
            fallback
        } else {
            interval
        };
        let checker = Arc::new(HealthChecker::new(
            HealthCheckConfig {
                interval,
                timeout: self.config.health_check_timeout,
            },
            self.http.clone(),
            self.clock.clone(),
        ));
        let handle = checker.start(Arc::downgrade(self));

        if let Some(previous) = self.health_task.lock().replace(handle) {
            previous.abort();
        }
        tracing::info!("health checks started (interval {:?})", interval);
    }

    /// Cancel the background health-check loop, if running.
    pub fn stop_health_checks(&self) {
        if let Some(handle) = self.health_task.lock().take() {
            handle.abort();
            tracing::info!("health checks stopped");
        }
    }

    pub fn health_checks_running(&self) -> bool {
        self.health_task
            .lock()
            .as_ref()
            .map_or(false, |h| !h.is_finished())
    }

    /// Run one probe round synchronously.
    pub async fn check_health_once(&self) {
        let checker = HealthChecker::new(
            HealthCheckConfig {
                interval: Duration::ZERO,
                timeout: self.config.health_check_timeout,
            },
            self.http.clone(),
            self.clock.clone(),
        );
        checker.check_all(&self.all_endpoints()).await;
    }

    /// Stop background work. The registry stays readable afterwards.
    pub fn close(&self) {
        self.stop_health_checks();
    }

    /// Close the registry as soon as `shutdown` fires, while listeners are
    /// still draining.
    pub fn close_on_shutdown(self: &Arc<Self>, shutdown: ShutdownController) -> JoinHandle<()> {
        let registry = Arc::downgrade(self);
        tokio::spawn(async move {
            shutdown.wait().await;
            if let Some(registry) = registry.upgrade() {
                tracing::info!("shutdown requested, stopping health checks");
                registry.close();
            }
        })
    }
}

impl EndpointRepository for ServiceRegistry {
    fn healthy_endpoints(&self, service_name: &str) -> Vec<Arc<ServiceEndpoint>> {
        self.get_healthy_endpoints(service_name)
    }

    fn all_endpoints(&self) -> Vec<Arc<ServiceEndpoint>> {
        self.services.read().values().flatten().cloned().collect()
    }
}

impl Drop for ServiceRegistry {
    fn drop(&mut self) {
        if let Some(handle) = self.health_task.get_mut().take() {
            handle.abort();
        }
    }
}
