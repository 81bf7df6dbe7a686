//! Request Router - Main application use case
//!
//! Turns an inbound request descriptor into a backend response:
//! 1. Matches the request against the priority-ordered routing rules
//! 2. Serves fresh cached responses for cacheable rules
//! 3. Asks the load balancer for an endpoint of the target service
//! 4. Forwards the call through that endpoint's circuit breaker
//! 5. Caches successful responses for cacheable rules

use crate::application::service_registry::ServiceRegistry;
use crate::domain::entities::{RequestDescriptor, ResponseDescriptor, RoutingRule, ServiceEndpoint};
use crate::domain::errors::{RoutingError, TransportError};
use crate::domain::ports::{Clock, HttpClient, OutboundRequest};
use crate::domain::services::LoadBalancer;
use crate::domain::value_objects::CacheKey;
use crate::infrastructure::circuit_breaker::BreakerError;
use crate::infrastructure::response_cache::ResponseCache;
use bytes::Bytes;
use parking_lot::RwLock;
use std::sync::Arc;

/// Single entry point for routed traffic.
pub struct RequestRouter {
    /// Sorted by descending priority; equal priorities keep install order
    rules: RwLock<Vec<Arc<RoutingRule>>>,
    registry: Arc<ServiceRegistry>,
    balancer: LoadBalancer,
    cache: ResponseCache,
    http: Arc<dyn HttpClient>,
}

impl RequestRouter {
    pub fn new(registry: Arc<ServiceRegistry>, http: Arc<dyn HttpClient>, clock: Arc<dyn Clock>) -> Self {
        Self {
            rules: RwLock::new(Vec::new()),
            balancer: LoadBalancer::new(registry.clone()),
            registry,
            cache: ResponseCache::new(clock),
            http,
        }
    }

    /// Cap the number of cached responses.
    pub fn with_cache_max_entries(mut self, max_entries: Option<usize>) -> Self {
        self.cache = self.cache.with_max_entries(max_entries);
        self
    }

    pub fn registry(&self) -> &Arc<ServiceRegistry> {
        &self.registry
    }

    pub fn balancer(&self) -> &LoadBalancer {
        &self.balancer
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    /// Install a rule, keeping the rule set ordered by descending priority.
    pub fn add_route(&self, rule: RoutingRule) {
        let mut rules = self.rules.write();
        let position = rules
            .iter()
            .position(|r| r.priority < rule.priority)
            .unwrap_or(rules.len());

        tracing::info!(
            "route installed: {:?} {} -> {} ({}, priority {}, cache {}s)",
            rule.methods,
            rule.path_pattern,
            rule.service_name,
            rule.strategy,
            rule.priority,
            rule.cache_ttl_secs
        );
        rules.insert(position, Arc::new(rule));
    }

    /// Installed rules in match order.
    pub fn routes(&self) -> Vec<RoutingRule> {
        self.rules.read().iter().map(|r| r.as_ref().clone()).collect()
    }

    pub fn route_count(&self) -> usize {
        self.rules.read().len()
    }

    /// First rule matching the method and path.
    pub fn match_route(&self, method: &str, path: &str) -> Result<Arc<RoutingRule>, RoutingError> {
        self.rules
            .read()
            .iter()
            .find(|r| r.matches(method, path))
            .cloned()
            .ok_or_else(|| RoutingError::RouteNotFound {
                method: method.to_string(),
                path: path.to_string(),
            })
    }

    /// Route one request.
    pub async fn route_request(&self, request: RequestDescriptor) -> Result<ResponseDescriptor, RoutingError> {
        let rule = self.match_route(&request.method, &request.path)?;

        let cache_key = rule
            .is_cacheable()
            .then(|| CacheKey::new(&request.method, &request.path, &request.query));
        if let Some(key) = &cache_key {
            if let Some(cached) = self.cache.get(key, rule.cache_ttl()) {
                tracing::debug!("cache hit for {} {}", request.method, request.path);
                return Ok(cached);
            }
        }

        let endpoint = self.balancer.select(&rule.service_name, rule.strategy)?;
        let breaker = self
            .registry
            .breaker(&endpoint.id)
            .ok_or_else(|| RoutingError::NoHealthyEndpoints {
                service: rule.service_name.clone(),
            })?;

        tracing::debug!(
            "routing {} {} -> {} ({})",
            request.method,
            request.path,
            endpoint.id,
            endpoint.url
        );

        let response = match breaker.call(|| self.forward(&endpoint, &request)).await {
            Ok(response) => response,
            Err(BreakerError::Open) => {
                tracing::warn!("circuit open for endpoint {}, rejecting request", endpoint.id);
                return Err(RoutingError::CircuitOpen {
                    endpoint_id: endpoint.id.clone(),
                });
            }
            Err(BreakerError::Inner(e)) => {
                tracing::warn!("{} {} failed: {}", request.method, request.path, e);
                return Err(e);
            }
        };

        if let Some(key) = cache_key {
            self.cache.insert(key, response.clone(), rule.cache_ttl());
        }
        Ok(response)
    }

    /// Send the request to one endpoint. Only 2xx responses are `Ok`.
    async fn forward(
        &self,
        endpoint: &Arc<ServiceEndpoint>,
        request: &RequestDescriptor,
    ) -> Result<ResponseDescriptor, RoutingError> {
        let _connection = endpoint.acquire_connection();

        let outbound = OutboundRequest {
            method: request.method.clone(),
            url: Self::target_url(&endpoint.url, &request.path),
            query: request.query.clone(),
            headers: request
                .headers
                .iter()
                .filter(|(name, _)| !name.eq_ignore_ascii_case("host"))
                .cloned()
                .collect(),
            body: request.body.clone(),
            timeout: endpoint.timeout,
        };

        let outcome = match tokio::time::timeout(endpoint.timeout, self.http.send(outbound)).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout),
        };

        match outcome {
            Ok(response) if response.is_success() => Ok(response),
            Ok(response) => Err(RoutingError::BackendError {
                endpoint_id: endpoint.id.clone(),
                status: Some(response.status),
                message: format!("backend returned status {}", response.status),
                headers: response.headers,
                body: response.body,
            }),
            Err(TransportError::Timeout) => Err(RoutingError::BackendTimeout {
                endpoint_id: endpoint.id.clone(),
                timeout: endpoint.timeout,
            }),
            Err(e) => Err(RoutingError::BackendError {
                endpoint_id: endpoint.id.clone(),
                status: None,
                headers: Vec::new(),
                body: Bytes::new(),
                message: e.to_string(),
            }),
        }
    }

    fn target_url(base: &str, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", base, path)
        } else {
            format!("{}/{}", base, path)
        }
    }
}
