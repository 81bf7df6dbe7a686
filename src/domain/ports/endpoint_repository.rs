//! Endpoint Repository Port
//!
//! Read side of service discovery, consumed by the load balancer and the
//! health checker.

use crate::domain::entities::ServiceEndpoint;
use std::sync::Arc;

/// Lookup of registered endpoints.
pub trait EndpointRepository: Send + Sync {
    /// Endpoints that may receive traffic (HEALTHY or DEGRADED), in
    /// registration order. Unknown services yield an empty list.
    fn healthy_endpoints(&self, service_name: &str) -> Vec<Arc<ServiceEndpoint>>;

    /// Every registered endpoint regardless of status.
    fn all_endpoints(&self) -> Vec<Arc<ServiceEndpoint>>;
}
