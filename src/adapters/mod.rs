//! Adapters Layer
//!
//! Inbound adapters drive the application (HTTP listeners); outbound adapters
//! implement domain ports (HTTP client, clocks).

pub mod inbound;
pub mod outbound;
