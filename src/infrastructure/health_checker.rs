//! Active Health Checker
//!
//! Periodically probes every registered endpoint over HTTP and records the
//! outcome on the endpoint. Endpoints are never removed here; taking one out
//! of the registry is an operator action.

use crate::domain::entities::{EndpointStatus, ServiceEndpoint};
use crate::domain::errors::TransportError;
use crate::domain::ports::{Clock, EndpointRepository, HttpClient, OutboundRequest};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

/// Health check configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthCheckConfig {
    /// Interval between probe rounds
    pub interval: Duration,
    /// Timeout for each probe
    pub timeout: Duration,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            timeout: Duration::from_secs(5),
        }
    }
}

/// Result of a single probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthCheckResult {
    /// Probe answered 200
    Healthy { latency_ms: u64 },
    /// Probe answered with another status
    Degraded { status: u16, latency_ms: u64 },
    /// Probe could not get an answer
    Unreachable { error: String, latency_ms: u64 },
}

impl HealthCheckResult {
    pub fn status(&self) -> EndpointStatus {
        match self {
            Self::Healthy { .. } => EndpointStatus::Healthy,
            Self::Degraded { .. } => EndpointStatus::Degraded,
            Self::Unreachable { .. } => EndpointStatus::Unhealthy,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Healthy { .. })
    }
}

/// Active health checker for endpoints.
pub struct HealthChecker {
    config: HealthCheckConfig,
    http: Arc<dyn HttpClient>,
    clock: Arc<dyn Clock>,
}

impl HealthChecker {
    pub fn new(config: HealthCheckConfig, http: Arc<dyn HttpClient>, clock: Arc<dyn Clock>) -> Self {
        Self { config, http, clock }
    }

    pub fn config(&self) -> HealthCheckConfig {
        self.config
    }

    /// Start the probe loop.
    ///
    /// The loop holds only a weak reference to the repository and exits once
    /// the repository is dropped. Abort the returned handle to stop it earlier.
    pub fn start<R: EndpointRepository + 'static>(self: Arc<Self>, repo: Weak<R>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.config.interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                interval.tick().await;

                let Some(repo) = repo.upgrade() else {
                    tracing::debug!("endpoint repository dropped, stopping health checks");
                    break;
                };
                let endpoints = repo.all_endpoints();
                drop(repo);

                self.check_all(&endpoints).await;
            }
        })
    }

    /// Probe a set of endpoints concurrently and record the outcomes.
    pub async fn check_all(&self, endpoints: &[Arc<ServiceEndpoint>]) {
        let probes = endpoints.iter().map(|endpoint| async move {
            let result = self.check_endpoint(endpoint).await;
            self.apply(endpoint, &result);
        });
        futures::future::join_all(probes).await;
    }

    /// Perform a single probe without recording it.
    pub async fn check_endpoint(&self, endpoint: &ServiceEndpoint) -> HealthCheckResult {
        let start = Instant::now();
        let request = OutboundRequest::get(endpoint.health_check_url.as_str(), self.config.timeout);

        let outcome = match tokio::time::timeout(self.config.timeout, self.http.send(request)).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout),
        };
        let latency_ms = start.elapsed().as_millis() as u64;

        match outcome {
            Ok(resp) if resp.status == 200 => HealthCheckResult::Healthy { latency_ms },
            Ok(resp) => HealthCheckResult::Degraded {
                status: resp.status,
                latency_ms,
            },
            Err(e) => HealthCheckResult::Unreachable {
                error: e.to_string(),
                latency_ms,
            },
        }
    }

    /// Record a probe result on the endpoint.
    ///
    /// OFFLINE endpoints are left alone until an operator changes them.
    pub fn apply(&self, endpoint: &ServiceEndpoint, result: &HealthCheckResult) {
        let previous = endpoint.status();
        if previous == EndpointStatus::Offline {
            tracing::debug!("endpoint {} is offline, ignoring health result", endpoint.id);
            return;
        }
        endpoint.record_probe(result.status(), self.clock.now());

        let current = endpoint.status();
        if previous == current {
            return;
        }
        match result {
            HealthCheckResult::Healthy { .. } => {
                tracing::info!("endpoint {} ({}) is now healthy", endpoint.id, endpoint.name);
            }
            HealthCheckResult::Degraded { status, .. } => {
                tracing::warn!(
                    "endpoint {} ({}) is degraded: health check returned {}",
                    endpoint.id,
                    endpoint.name,
                    status
                );
            }
            HealthCheckResult::Unreachable { error, .. } => {
                tracing::warn!(
                    "endpoint {} ({}) is unhealthy: {}",
                    endpoint.id,
                    endpoint.name,
                    error
                );
            }
        }
    }
}
