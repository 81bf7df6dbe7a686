//! HTTP Client Port
//!
//! Defines the outbound HTTP capability used for forwarding requests and
//! probing endpoint health.

use crate::domain::entities::ResponseDescriptor;
use crate::domain::errors::TransportError;
use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;

/// A fully resolved call to a backend endpoint.
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    pub method: String,
    /// Endpoint base URL joined with the request path
    pub url: String,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
    pub timeout: Duration,
}

impl OutboundRequest {
    /// Plain GET with no headers or body, as used by health probes.
    pub fn get(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            method: "GET".to_string(),
            url: url.into(),
            query: Vec::new(),
            headers: Vec::new(),
            body: Bytes::new(),
            timeout,
        }
    }
}

/// Outbound HTTP transport.
///
/// Any HTTP status, including 4xx/5xx, is a successful transport result;
/// only failures to obtain a response are errors.
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn send(&self, request: OutboundRequest) -> Result<ResponseDescriptor, TransportError>;
}
