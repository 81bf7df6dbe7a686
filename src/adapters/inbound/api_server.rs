//! Admin API Server
//!
//! HTTP API for registering endpoints, installing routing rules and
//! inspecting runtime state.

use crate::application::{RequestRouter, ServiceView};
use crate::domain::entities::{EndpointSpec, RoutingRule};
use crate::domain::errors::RegistryError;
use crate::infrastructure::shutdown::ShutdownController;
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

/// Registration response.
#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub id: String,
    pub service: String,
}

/// List of services response.
#[derive(Debug, Serialize)]
pub struct ServicesListResponse {
    pub services: Vec<ServiceView>,
    pub total: usize,
}

/// List of routes response.
#[derive(Debug, Serialize)]
pub struct RoutesListResponse {
    pub routes: Vec<RoutingRule>,
    pub total: usize,
}

/// Health response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub services: usize,
    pub routes: usize,
}

/// API Server state.
#[derive(Clone)]
pub struct ApiState {
    pub router: Arc<RequestRouter>,
}

/// Admin API server.
pub struct ApiServer {
    listen_addr: String,
    state: ApiState,
}

impl ApiServer {
    pub fn new(listen_addr: String, router: Arc<RequestRouter>) -> Self {
        Self {
            listen_addr,
            state: ApiState { router },
        }
    }

    /// Build the axum application.
    pub fn app(&self) -> Router {
        Router::new()
            .route("/health", get(health_handler))
            .route("/api/v1/services", get(list_services_handler))
            .route("/api/v1/services/:name/endpoints", post(register_handler))
            .route(
                "/api/v1/services/:name/endpoints/:id",
                delete(unregister_handler),
            )
            .route("/api/v1/endpoints/:id/circuit/reset", post(reset_circuit_handler))
            .route("/api/v1/routes", get(list_routes_handler).post(add_route_handler))
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    /// Run the API server until shutdown is initiated.
    #[cfg_attr(coverage_nightly, coverage(off))]
    pub async fn run(&self, shutdown: ShutdownController) -> anyhow::Result<()> {
        let listener = TcpListener::bind(&self.listen_addr).await?;
        tracing::info!("admin API listening on {}", self.listen_addr);

        axum::serve(listener, self.app())
            .with_graceful_shutdown(async move { shutdown.wait().await })
            .await?;
        Ok(())
    }
}

// Handler functions

fn error_response(status: StatusCode, error: &str, message: impl Into<String>) -> Response {
    (
        status,
        Json(serde_json::json!({
            "error": error,
            "message": message.into(),
        })),
    )
        .into_response()
}

async fn health_handler(State(state): State<ApiState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        services: state.router.registry().service_count(),
        routes: state.router.route_count(),
    })
}

async fn register_handler(
    State(state): State<ApiState>,
    Path(name): Path<String>,
    payload: Result<Json<EndpointSpec>, JsonRejection>,
) -> Response {
    let Json(spec) = match payload {
        Ok(spec) => spec,
        Err(rejection) => {
            return error_response(StatusCode::BAD_REQUEST, "invalid_endpoint", rejection.body_text())
        }
    };

    match state.router.registry().register_service(&name, spec) {
        Ok(id) => (
            StatusCode::CREATED,
            Json(RegisterResponse { id, service: name }),
        )
            .into_response(),
        Err(e @ RegistryError::DuplicateEndpoint(_)) => {
            error_response(StatusCode::CONFLICT, "duplicate_endpoint", e.to_string())
        }
        Err(e @ RegistryError::InvalidEndpoint(_)) => {
            error_response(StatusCode::BAD_REQUEST, "invalid_endpoint", e.to_string())
        }
    }
}

async fn unregister_handler(
    State(state): State<ApiState>,
    Path((name, id)): Path<(String, String)>,
) -> StatusCode {
    if !state.router.registry().unregister_service(&name, &id) {
        tracing::debug!("unregister of unknown endpoint {} in {}", id, name);
    }
    StatusCode::NO_CONTENT
}

async fn list_services_handler(State(state): State<ApiState>) -> impl IntoResponse {
    let services = state.router.registry().describe();
    let total = services.len();
    Json(ServicesListResponse { services, total })
}

async fn reset_circuit_handler(State(state): State<ApiState>, Path(id): Path<String>) -> Response {
    match state.router.registry().breaker(&id) {
        Some(breaker) => {
            breaker.reset();
            (
                StatusCode::OK,
                Json(serde_json::json!({
                    "id": id,
                    "circuit_state": breaker.state(),
                })),
            )
                .into_response()
        }
        None => error_response(StatusCode::NOT_FOUND, "endpoint_not_found", format!("no endpoint {}", id)),
    }
}

async fn add_route_handler(
    State(state): State<ApiState>,
    payload: Result<Json<RoutingRule>, JsonRejection>,
) -> Response {
    match payload {
        Ok(Json(rule)) => {
            state.router.add_route(rule.clone());
            (StatusCode::CREATED, Json(rule)).into_response()
        }
        Err(rejection) => error_response(StatusCode::BAD_REQUEST, "invalid_route", rejection.body_text()),
    }
}

async fn list_routes_handler(State(state): State<ApiState>) -> impl IntoResponse {
    let routes = state.router.routes();
    let total = routes.len();
    Json(RoutesListResponse { routes, total })
}
