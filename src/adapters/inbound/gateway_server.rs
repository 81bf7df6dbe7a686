//! Gateway Server
//!
//! Catch-all HTTP listener. Every request is turned into a
//! [`RequestDescriptor`] and handed to the [`RequestRouter`].

use crate::application::RequestRouter;
use crate::domain::entities::{RequestDescriptor, ResponseDescriptor};
use crate::domain::errors::RoutingError;
use crate::infrastructure::shutdown::ShutdownController;
use axum::{
    body::{Body, Bytes},
    extract::{Query, State},
    http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    Json, Router,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

/// Response headers that describe the backend connection, not the payload.
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "content-length",
    "keep-alive",
    "transfer-encoding",
    "upgrade",
];

pub struct GatewayServer {
    listen_addr: String,
    router: Arc<RequestRouter>,
}

impl GatewayServer {
    pub fn new(listen_addr: String, router: Arc<RequestRouter>) -> Self {
        Self { listen_addr, router }
    }

    pub fn app(&self) -> Router {
        Router::new()
            .fallback(gateway_handler)
            .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
            .with_state(self.router.clone())
    }

    #[cfg_attr(coverage_nightly, coverage(off))]
    pub async fn run(&self, shutdown: ShutdownController) -> anyhow::Result<()> {
        let listener = TcpListener::bind(&self.listen_addr).await?;
        tracing::info!("gateway listening on {}", self.listen_addr);

        axum::serve(listener, self.app())
            .with_graceful_shutdown(async move { shutdown.wait().await })
            .await?;
        Ok(())
    }
}

async fn gateway_handler(
    State(router): State<Arc<RequestRouter>>,
    method: Method,
    uri: Uri,
    Query(query): Query<Vec<(String, String)>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let request = RequestDescriptor {
        method: method.as_str().to_string(),
        path: uri.path().to_string(),
        query,
        headers: headers
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect(),
        body,
    };

    match router.route_request(request).await {
        Ok(response) => into_http_response(response),
        Err(e) => error_response(e),
    }
}

fn into_http_response(response: ResponseDescriptor) -> Response {
    let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::BAD_GATEWAY);
    backend_response(status, &response.headers, response.body)
}

/// Rebuild a backend answer, dropping hop-by-hop headers.
fn backend_response(status: StatusCode, backend_headers: &[(String, String)], body: Bytes) -> Response {
    let mut http_response = Response::new(Body::from(body));
    *http_response.status_mut() = status;

    let headers = http_response.headers_mut();
    for (name, value) in backend_headers {
        if HOP_BY_HOP.iter().any(|h| name.eq_ignore_ascii_case(h)) {
            continue;
        }
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            headers.append(name, value);
        }
    }
    http_response
}

fn error_response(error: RoutingError) -> Response {
    let status = StatusCode::from_u16(error.status_code()).unwrap_or(StatusCode::BAD_GATEWAY);

    if let RoutingError::BackendError {
        status: Some(_),
        headers,
        body,
        ..
    } = &error
    {
        if !body.is_empty() {
            return backend_response(status, headers, body.clone());
        }
    }

    (
        status,
        Json(serde_json::json!({
            "error": error.kind(),
            "message": error.to_string(),
        })),
    )
        .into_response()
}
