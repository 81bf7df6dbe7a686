mod api_server;
mod gateway_server;

pub use api_server::ApiServer;
pub use gateway_server::GatewayServer;

// Re-export for external use (e.g., integration tests)
#[allow(unused_imports)]
pub use api_server::{ApiState, HealthResponse, RegisterResponse};
