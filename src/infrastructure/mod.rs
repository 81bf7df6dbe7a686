//! Infrastructure Layer
//!
//! Resilience and runtime components used by the application layer.

pub mod circuit_breaker;
pub mod health_checker;
pub mod response_cache;
pub mod shutdown;

pub use circuit_breaker::{BreakerError, CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use health_checker::{HealthCheckConfig, HealthCheckResult, HealthChecker};
pub use response_cache::ResponseCache;
pub use shutdown::{shutdown_signal, ShutdownController};
