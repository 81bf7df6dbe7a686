//! Domain Entities - Core business objects
//!
//! These entities represent the core concepts of the gateway domain:
//! backend endpoints, routing rules and the request/response descriptors
//! exchanged with the surrounding HTTP layer.

use crate::domain::errors::RuleError;
use crate::domain::value_objects::{BalancingStrategy, PathPattern};
use bytes::Bytes;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU32, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Number of response time samples kept per endpoint.
pub const RESPONSE_TIME_SAMPLES: usize = 100;

/// Default forward timeout for endpoints that do not set one.
pub const DEFAULT_ENDPOINT_TIMEOUT: Duration = Duration::from_secs(30);

/// Health of an endpoint as last observed by the health checker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndpointStatus {
    Healthy,
    /// Answered the probe, but not with 200
    Degraded,
    /// Probe failed at the transport level
    Unhealthy,
    /// Taken out of rotation by an operator
    Offline,
}

impl EndpointStatus {
    /// Whether the endpoint may receive traffic.
    pub fn is_routable(&self) -> bool {
        matches!(self, Self::Healthy | Self::Degraded)
    }

    fn to_u8(self) -> u8 {
        match self {
            Self::Healthy => 0,
            Self::Degraded => 1,
            Self::Unhealthy => 2,
            Self::Offline => 3,
        }
    }

    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Healthy,
            1 => Self::Degraded,
            2 => Self::Unhealthy,
            _ => Self::Offline,
        }
    }
}

impl fmt::Display for EndpointStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Healthy => write!(f, "healthy"),
            Self::Degraded => write!(f, "degraded"),
            Self::Unhealthy => write!(f, "unhealthy"),
            Self::Offline => write!(f, "offline"),
        }
    }
}

/// Registration payload for a new endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointSpec {
    /// Endpoint id; a random one is generated when absent
    #[serde(default)]
    pub id: Option<String>,
    /// Base address, e.g. `http://10.0.0.5:8080`
    pub url: String,
    #[serde(default = "default_weight")]
    pub weight: u32,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Probe URL; defaults to `{url}/health`
    #[serde(default)]
    pub health_check_url: Option<String>,
    /// Breaker threshold override
    #[serde(default)]
    pub failure_threshold: Option<u32>,
    /// Breaker cooldown override
    #[serde(default)]
    pub cooldown_secs: Option<u64>,
}

fn default_weight() -> u32 {
    1
}
fn default_max_connections() -> u32 {
    100
}
fn default_timeout_ms() -> u64 {
    DEFAULT_ENDPOINT_TIMEOUT.as_millis() as u64
}

impl EndpointSpec {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            id: None,
            url: url.into(),
            weight: default_weight(),
            max_connections: default_max_connections(),
            timeout_ms: default_timeout_ms(),
            health_check_url: None,
            failure_threshold: None,
            cooldown_secs: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_weight(mut self, weight: u32) -> Self {
        self.weight = weight;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_breaker(mut self, failure_threshold: u32, cooldown: Duration) -> Self {
        self.failure_threshold = Some(failure_threshold);
        self.cooldown_secs = Some(cooldown.as_secs());
        self
    }
}

/// One network-addressable instance of a backend service.
///
/// Identity and configuration are immutable. Runtime state is updated in
/// place by the health checker (status, error count) and by the forwarding
/// path (connections, response times), so endpoints are shared as
/// `Arc<ServiceEndpoint>`.
#[derive(Debug)]
pub struct ServiceEndpoint {
    pub id: String,
    /// Logical service this endpoint belongs to
    pub name: String,
    pub url: String,
    pub weight: u32,
    pub max_connections: u32,
    pub timeout: Duration,
    pub health_check_url: String,

    status: AtomicU8,
    current_connections: AtomicUsize,
    error_count: AtomicU32,
    response_times: Mutex<VecDeque<Duration>>,
    last_health_check: Mutex<Option<Instant>>,
}

impl ServiceEndpoint {
    /// Create a healthy endpoint with default configuration.
    pub fn new(id: impl Into<String>, name: impl Into<String>, url: impl Into<String>) -> Self {
        let url = url.into().trim_end_matches('/').to_string();
        Self {
            id: id.into(),
            name: name.into(),
            health_check_url: format!("{}/health", url),
            url,
            weight: default_weight(),
            max_connections: default_max_connections(),
            timeout: DEFAULT_ENDPOINT_TIMEOUT,
            status: AtomicU8::new(EndpointStatus::Healthy.to_u8()),
            current_connections: AtomicUsize::new(0),
            error_count: AtomicU32::new(0),
            response_times: Mutex::new(VecDeque::with_capacity(RESPONSE_TIME_SAMPLES)),
            last_health_check: Mutex::new(None),
        }
    }

    /// Build an endpoint from a registration payload.
    pub fn from_spec(id: impl Into<String>, name: impl Into<String>, spec: &EndpointSpec) -> Self {
        let mut endpoint = Self::new(id, name, spec.url.as_str());
        endpoint.weight = spec.weight;
        endpoint.max_connections = spec.max_connections;
        endpoint.timeout = Duration::from_millis(spec.timeout_ms);
        if let Some(url) = &spec.health_check_url {
            endpoint.health_check_url = url.clone();
        }
        endpoint
    }

    pub fn with_weight(mut self, weight: u32) -> Self {
        self.weight = weight;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn status(&self) -> EndpointStatus {
        EndpointStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    pub fn set_status(&self, status: EndpointStatus) {
        self.status.store(status.to_u8(), Ordering::Release);
    }

    pub fn is_routable(&self) -> bool {
        self.status().is_routable()
    }

    pub fn current_connections(&self) -> usize {
        self.current_connections.load(Ordering::Acquire)
    }

    pub fn error_count(&self) -> u32 {
        self.error_count.load(Ordering::Relaxed)
    }

    pub fn last_health_check(&self) -> Option<Instant> {
        *self.last_health_check.lock()
    }

    /// Apply the outcome of one health probe.
    ///
    /// A healthy probe clears the error count, anything else increments it.
    pub fn record_probe(&self, status: EndpointStatus, at: Instant) {
        self.set_status(status);
        if status == EndpointStatus::Healthy {
            self.error_count.store(0, Ordering::Relaxed);
        } else {
            self.error_count.fetch_add(1, Ordering::Relaxed);
        }
        *self.last_health_check.lock() = Some(at);
    }

    /// Append a response time, dropping the oldest sample when full.
    pub fn record_response_time(&self, elapsed: Duration) {
        let mut samples = self.response_times.lock();
        if samples.len() == RESPONSE_TIME_SAMPLES {
            samples.pop_front();
        }
        samples.push_back(elapsed);
    }

    pub fn response_time_samples(&self) -> usize {
        self.response_times.lock().len()
    }

    /// Mean of the retained response times, `None` without samples.
    pub fn mean_response_time(&self) -> Option<Duration> {
        let samples = self.response_times.lock();
        if samples.is_empty() {
            return None;
        }
        let total: Duration = samples.iter().sum();
        Some(total / samples.len() as u32)
    }

    /// Count a forwarded request as in flight until the guard is dropped.
    pub fn acquire_connection(self: &Arc<Self>) -> ConnectionGuard {
        self.current_connections.fetch_add(1, Ordering::AcqRel);
        ConnectionGuard {
            endpoint: Arc::clone(self),
            started: Instant::now(),
        }
    }

    fn release_connection(&self) {
        // Never underflow, even if a counter was reset underneath us
        let mut current = self.current_connections.load(Ordering::Acquire);
        while current > 0 {
            match self.current_connections.compare_exchange_weak(
                current,
                current - 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(c) => current = c,
            }
        }
    }

    /// Point-in-time view for admin listings.
    pub fn snapshot(&self) -> EndpointSnapshot {
        EndpointSnapshot {
            id: self.id.clone(),
            name: self.name.clone(),
            url: self.url.clone(),
            weight: self.weight,
            max_connections: self.max_connections,
            timeout_ms: self.timeout.as_millis() as u64,
            health_check_url: self.health_check_url.clone(),
            status: self.status(),
            current_connections: self.current_connections(),
            error_count: self.error_count(),
            mean_response_ms: self.mean_response_time().map(|d| d.as_secs_f64() * 1000.0),
            last_health_check_secs: self.last_health_check().map(|t| t.elapsed().as_secs()),
        }
    }
}

/// RAII handle for one in-flight forwarded request.
///
/// Dropping it decrements the endpoint's connection count and records the
/// elapsed time, whatever the outcome of the call was.
pub struct ConnectionGuard {
    endpoint: Arc<ServiceEndpoint>,
    started: Instant,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.endpoint.release_connection();
        self.endpoint.record_response_time(self.started.elapsed());
    }
}

/// Serializable view of an endpoint's configuration and runtime state.
#[derive(Debug, Clone, Serialize)]
pub struct EndpointSnapshot {
    pub id: String,
    pub name: String,
    pub url: String,
    pub weight: u32,
    pub max_connections: u32,
    pub timeout_ms: u64,
    pub health_check_url: String,
    pub status: EndpointStatus,
    pub current_connections: usize,
    pub error_count: u32,
    pub mean_response_ms: Option<f64>,
    pub last_health_check_secs: Option<u64>,
}

/// Static mapping from (path pattern, methods) to a target service.
///
/// Rules are immutable once installed in the router.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingRule {
    #[serde(alias = "path")]
    pub path_pattern: PathPattern,
    #[serde(deserialize_with = "deserialize_methods")]
    pub methods: Vec<String>,
    #[serde(alias = "service")]
    pub service_name: String,
    #[serde(default)]
    pub strategy: BalancingStrategy,
    /// Response cache lifetime; 0 disables caching
    #[serde(default)]
    pub cache_ttl_secs: u64,
    /// Higher priorities are matched first
    #[serde(default)]
    pub priority: i32,
}

/// Verbs a rule may list.
pub const HTTP_METHODS: &[&str] = &[
    "GET", "HEAD", "POST", "PUT", "DELETE", "PATCH", "OPTIONS", "TRACE", "CONNECT",
];

/// Uppercase, check against [`HTTP_METHODS`] and drop duplicates.
fn normalize_methods<S: AsRef<str>>(methods: &[S]) -> Result<Vec<String>, RuleError> {
    if methods.is_empty() {
        return Err(RuleError::NoMethods);
    }
    let mut normalized: Vec<String> = Vec::with_capacity(methods.len());
    for method in methods {
        let upper = method.as_ref().trim().to_ascii_uppercase();
        if !HTTP_METHODS.contains(&upper.as_str()) {
            return Err(RuleError::Method(method.as_ref().to_string()));
        }
        if !normalized.contains(&upper) {
            normalized.push(upper);
        }
    }
    Ok(normalized)
}

fn deserialize_methods<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let methods = Vec::<String>::deserialize(deserializer)?;
    normalize_methods(&methods).map_err(serde::de::Error::custom)
}

impl RoutingRule {
    pub fn new(
        path_pattern: &str,
        methods: &[&str],
        service_name: impl Into<String>,
        strategy: BalancingStrategy,
    ) -> Result<Self, RuleError> {
        Ok(Self {
            path_pattern: PathPattern::new(path_pattern)?,
            methods: normalize_methods(methods)?,
            service_name: service_name.into(),
            strategy,
            cache_ttl_secs: 0,
            priority: 0,
        })
    }

    pub fn with_cache_ttl(mut self, secs: u64) -> Self {
        self.cache_ttl_secs = secs;
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn matches(&self, method: &str, path: &str) -> bool {
        self.methods.iter().any(|m| m.eq_ignore_ascii_case(method))
            && self.path_pattern.matches(path)
    }

    pub fn is_cacheable(&self) -> bool {
        self.cache_ttl_secs > 0
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

/// Already-parsed inbound request handed over by the HTTP layer.
#[derive(Debug, Clone, Default)]
pub struct RequestDescriptor {
    pub method: String,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl RequestDescriptor {
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into().to_ascii_uppercase(),
            path: path.into(),
            ..Default::default()
        }
    }

    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }
}

/// Response produced by a backend (or served from cache).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseDescriptor {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl ResponseDescriptor {
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}
