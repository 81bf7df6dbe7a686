//! edge-gateway - HTTP API Gateway with Hexagonal Architecture
//!
//! This is the composition root that wires together all the components.

use edge_gateway::adapters::inbound::{ApiServer, GatewayServer};
use edge_gateway::adapters::outbound::{ReqwestHttpClient, SystemClock};
use edge_gateway::application::{RequestRouter, ServiceRegistry};
use edge_gateway::config::{load_config, RoutesFile};
use edge_gateway::domain::ports::{Clock, HttpClient};
use edge_gateway::infrastructure::{shutdown_signal, ShutdownController};
use std::sync::Arc;
use tracing_subscriber::fmt::format::FmtSpan;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration from environment
    let cfg = load_config()?;

    // Setup logging
    let log_level = if cfg.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_span_events(FmtSpan::CLOSE)
        .init();

    tracing::info!(
        "starting edge-gateway listen={} admin={} (hexagonal architecture)",
        cfg.listen_addr,
        if cfg.admin_enabled {
            cfg.admin_listen_addr.as_str()
        } else {
            "disabled"
        }
    );

    // ===== COMPOSITION ROOT =====

    // 1. Outbound adapters
    let http: Arc<dyn HttpClient> = Arc::new(ReqwestHttpClient::new());
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    // 2. Application services
    let registry = Arc::new(ServiceRegistry::new(
        http.clone(),
        clock.clone(),
        cfg.registry_config(),
    ));
    let router = Arc::new(
        RequestRouter::new(registry.clone(), http, clock).with_cache_max_entries(cfg.cache_max_entries),
    );

    if let Some(path) = &cfg.routes_path {
        RoutesFile::load(path)?.install(&router)?;
        tracing::info!(
            "loaded {} services and {} routes from {}",
            registry.service_count(),
            router.route_count(),
            path
        );
    }

    registry.start_health_checks(cfg.health_interval());

    // 3. Inbound adapters
    let shutdown = ShutdownController::new();
    tokio::spawn(shutdown_signal(shutdown.clone()));
    registry.close_on_shutdown(shutdown.clone());

    let gateway = GatewayServer::new(cfg.listen_addr.clone(), router.clone());

    let result = if cfg.admin_enabled {
        let api = ApiServer::new(cfg.admin_listen_addr.clone(), router.clone());
        tokio::try_join!(gateway.run(shutdown.clone()), api.run(shutdown.clone())).map(|_| ())
    } else {
        gateway.run(shutdown.clone()).await
    };

    // Also covers a listener failing before any shutdown signal
    registry.close();
    tracing::info!("edge-gateway stopped");
    result
}
