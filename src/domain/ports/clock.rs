//! Clock Port
//!
//! Time source used by circuit breakers and the response cache, so tests can
//! move time forward without sleeping.

use std::time::Instant;

/// Monotonic time source.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}
