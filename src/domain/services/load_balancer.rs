//! Load Balancer Service
//!
//! Picks one routable endpoint of a service according to a
//! [`BalancingStrategy`]. Candidate lists come from the
//! [`EndpointRepository`] in registration order, which keeps every strategy's
//! tie-breaking deterministic.

use crate::domain::entities::ServiceEndpoint;
use crate::domain::errors::RoutingError;
use crate::domain::ports::EndpointRepository;
use crate::domain::value_objects::BalancingStrategy;
use dashmap::DashMap;
use rand::Rng;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Load balancer service for selecting endpoints.
///
/// Strategy state (round-robin counters) is kept per service name.
pub struct LoadBalancer {
    endpoints: Arc<dyn EndpointRepository>,
    counters: DashMap<String, AtomicUsize>,
}

impl LoadBalancer {
    pub fn new(endpoints: Arc<dyn EndpointRepository>) -> Self {
        Self {
            endpoints,
            counters: DashMap::new(),
        }
    }

    /// Select an endpoint of `service_name` using `strategy`.
    ///
    /// Fails with [`RoutingError::NoHealthyEndpoints`] when the service is
    /// unknown or none of its endpoints is routable.
    pub fn select(
        &self,
        service_name: &str,
        strategy: BalancingStrategy,
    ) -> Result<Arc<ServiceEndpoint>, RoutingError> {
        let candidates = self.endpoints.healthy_endpoints(service_name);
        self.pick(service_name, &candidates, strategy)
            .ok_or_else(|| {
                tracing::warn!("no healthy endpoints for service {}", service_name);
                RoutingError::NoHealthyEndpoints {
                    service: service_name.to_string(),
                }
            })
    }

    /// Apply `strategy` to an explicit candidate list.
    pub fn pick(
        &self,
        service_name: &str,
        candidates: &[Arc<ServiceEndpoint>],
        strategy: BalancingStrategy,
    ) -> Option<Arc<ServiceEndpoint>> {
        if candidates.is_empty() {
            return None;
        }

        let index = match strategy {
            BalancingStrategy::RoundRobin => self.next_round_robin(service_name, candidates.len()),
            BalancingStrategy::Weighted => {
                let total = Self::total_weight(candidates);
                let draw = if total == 0 {
                    0
                } else {
                    rand::thread_rng().gen_range(0..total)
                };
                Self::weighted_index(candidates, draw)
            }
            BalancingStrategy::LeastConnections => Self::least_connections_index(candidates),
            BalancingStrategy::PerformanceBased => Self::performance_index(candidates),
        };

        let endpoint = Arc::clone(&candidates[index]);
        tracing::debug!(
            "selected endpoint {} for service {} ({})",
            endpoint.id,
            service_name,
            strategy
        );
        Some(endpoint)
    }

    /// Current round-robin counter value for a service.
    pub fn round_robin_counter(&self, service_name: &str) -> usize {
        self.counters
            .get(service_name)
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    fn next_round_robin(&self, service_name: &str, len: usize) -> usize {
        if let Some(counter) = self.counters.get(service_name) {
            return counter.fetch_add(1, Ordering::Relaxed) % len;
        }
        self.counters
            .entry(service_name.to_string())
            .or_insert_with(|| AtomicUsize::new(0))
            .fetch_add(1, Ordering::Relaxed)
            % len
    }

    fn total_weight(candidates: &[Arc<ServiceEndpoint>]) -> u64 {
        candidates.iter().map(|e| e.weight as u64).sum()
    }

    /// Walk the candidates accumulating weight until the running sum exceeds
    /// `draw`. Falls back to the last candidate when all weights are zero.
    fn weighted_index(candidates: &[Arc<ServiceEndpoint>], draw: u64) -> usize {
        let mut running = 0u64;
        for (i, endpoint) in candidates.iter().enumerate() {
            running += endpoint.weight as u64;
            if running > draw {
                return i;
            }
        }
        candidates.len() - 1
    }

    /// Fewest in-flight requests; first occurrence wins ties.
    fn least_connections_index(candidates: &[Arc<ServiceEndpoint>]) -> usize {
        let mut best = 0;
        let mut best_conns = usize::MAX;
        for (i, endpoint) in candidates.iter().enumerate() {
            let conns = endpoint.current_connections();
            if conns < best_conns {
                best = i;
                best_conns = conns;
            }
        }
        best
    }

    /// Lowest mean response time. Endpoints without samples rank last, and
    /// the first candidate wins when nobody has samples.
    fn performance_index(candidates: &[Arc<ServiceEndpoint>]) -> usize {
        let mut best = 0;
        let mut best_mean: Option<Duration> = None;
        for (i, endpoint) in candidates.iter().enumerate() {
            let Some(mean) = endpoint.mean_response_time() else {
                continue;
            };
            if best_mean.map_or(true, |b| mean < b) {
                best = i;
                best_mean = Some(mean);
            }
        }
        best
    }
}
