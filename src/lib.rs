//! edge-gateway Library
//!
//! Service registry, load balancing, circuit breaking and request routing for
//! an HTTP API gateway. The binary in `main.rs` wires these together; the
//! library is exposed for integration tests and embedding.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;

// Re-export commonly used types
pub use application::{RegistryConfig, RequestRouter, ServiceRegistry};
pub use config::{load_config, Config, RoutesFile};
pub use domain::entities::{
    EndpointSpec, EndpointStatus, RequestDescriptor, ResponseDescriptor, RoutingRule, ServiceEndpoint,
};
pub use domain::errors::{RegistryError, RoutingError, RuleError, TransportError};
pub use domain::ports::{Clock, EndpointRepository, HttpClient};
pub use domain::services::LoadBalancer;
pub use domain::value_objects::{BalancingStrategy, CacheKey, PathPattern};
pub use infrastructure::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
