mod clock;
mod endpoint_repository;
mod http_client;

pub use clock::Clock;
pub use endpoint_repository::EndpointRepository;
pub use http_client::{HttpClient, OutboundRequest};
