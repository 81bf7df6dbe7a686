//! Application Layer
//!
//! Use cases that coordinate the domain model with infrastructure.

mod request_router;
mod service_registry;

pub use request_router::RequestRouter;
pub use service_registry::{EndpointView, RegistryConfig, ServiceRegistry, ServiceView};
