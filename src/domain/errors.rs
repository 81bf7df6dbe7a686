//! Domain Errors
//!
//! Typed failures surfaced by the registry, the router and the outbound ports.

use bytes::Bytes;
use std::time::Duration;

/// Why a request could not be routed to a backend response.
///
/// Every variant maps to an HTTP status so inbound adapters never have to
/// collapse the taxonomy into a generic 500.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RoutingError {
    /// No installed rule matches the method and path
    #[error("no route for {method} {path}")]
    RouteNotFound { method: String, path: String },

    /// The target service has no HEALTHY or DEGRADED endpoint
    #[error("no healthy endpoints for service {service}")]
    NoHealthyEndpoints { service: String },

    /// The endpoint's breaker rejected the call without contacting the backend
    #[error("circuit open for endpoint {endpoint_id}")]
    CircuitOpen { endpoint_id: String },

    /// The backend answered with a non-2xx status or the transport failed
    #[error("backend {endpoint_id} failed: {message}")]
    BackendError {
        endpoint_id: String,
        status: Option<u16>,
        /// Backend response headers, empty when the transport failed
        headers: Vec<(String, String)>,
        body: Bytes,
        message: String,
    },

    /// The forwarded call exceeded the endpoint timeout
    #[error("backend {endpoint_id} timed out after {timeout:?}")]
    BackendTimeout {
        endpoint_id: String,
        timeout: Duration,
    },
}

impl RoutingError {
    /// HTTP status reported to the caller.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::RouteNotFound { .. } => 404,
            Self::NoHealthyEndpoints { .. } | Self::CircuitOpen { .. } => 503,
            Self::BackendError { status, .. } => status.unwrap_or(502),
            Self::BackendTimeout { .. } => 504,
        }
    }

    /// Stable label for logs and JSON error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::RouteNotFound { .. } => "route_not_found",
            Self::NoHealthyEndpoints { .. } => "no_healthy_endpoints",
            Self::CircuitOpen { .. } => "circuit_open",
            Self::BackendError { .. } => "backend_error",
            Self::BackendTimeout { .. } => "backend_timeout",
        }
    }
}

/// Rejected routing rule definitions.
#[derive(Debug, thiserror::Error)]
pub enum RuleError {
    #[error("invalid path pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("invalid HTTP method {0:?}")]
    Method(String),

    #[error("at least one method is required")]
    NoMethods,
}

/// Registration failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("endpoint id {0} is already registered")]
    DuplicateEndpoint(String),

    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),
}

/// Failures reported by an [`HttpClient`](crate::domain::ports::HttpClient).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("request failed: {0}")]
    Other(String),
}
