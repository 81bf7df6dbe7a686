//! Integration tests for Health Check with Wiremock
//!
//! Probes real HTTP endpoints through the registry and checks how endpoint
//! status feeds into routing.

use edge_gateway::adapters::outbound::{ReqwestHttpClient, SystemClock};
use edge_gateway::{
    BalancingStrategy, EndpointSpec, EndpointStatus, HttpClient, RegistryConfig, RequestDescriptor,
    RequestRouter, RoutingError, RoutingRule, ServiceRegistry,
};
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn registry(health_timeout: Duration) -> Arc<ServiceRegistry> {
    Arc::new(ServiceRegistry::new(
        Arc::new(ReqwestHttpClient::new()),
        Arc::new(SystemClock),
        RegistryConfig {
            health_check_timeout: health_timeout,
            ..RegistryConfig::default()
        },
    ))
}

async fn health_mock(status: u16) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(status).set_body_string("status"))
        .mount(&server)
        .await;
    server
}

/// Test basic HTTP GET health check
#[tokio::test]
async fn test_http_health_check_success() {
    let backend = health_mock(200).await;
    let registry = registry(Duration::from_secs(1));
    registry
        .register_service("svc", EndpointSpec::new(backend.uri()).with_id("e1"))
        .unwrap();

    registry.check_health_once().await;

    let endpoint = registry.endpoint("e1").unwrap();
    assert_eq!(endpoint.status(), EndpointStatus::Healthy);
    assert_eq!(endpoint.error_count(), 0);
    assert!(endpoint.last_health_check().is_some());
}

/// Test health check failure (unhealthy backend answers non-200)
#[tokio::test]
async fn test_http_health_check_degraded() {
    let backend = health_mock(503).await;
    let registry = registry(Duration::from_secs(1));
    registry
        .register_service("svc", EndpointSpec::new(backend.uri()).with_id("e1"))
        .unwrap();

    registry.check_health_once().await;
    registry.check_health_once().await;

    let endpoint = registry.endpoint("e1").unwrap();
    assert_eq!(endpoint.status(), EndpointStatus::Degraded);
    assert_eq!(endpoint.error_count(), 2);
    // Degraded endpoints remain eligible for traffic
    assert_eq!(registry.get_healthy_endpoints("svc").len(), 1);
}

/// Test health check against a closed port
#[tokio::test]
async fn test_http_health_check_connection_refused() {
    let registry = registry(Duration::from_secs(1));
    registry
        .register_service("svc", EndpointSpec::new("http://127.0.0.1:1").with_id("dead"))
        .unwrap();

    registry.check_health_once().await;

    assert_eq!(registry.endpoint("dead").unwrap().status(), EndpointStatus::Unhealthy);
    assert!(registry.get_healthy_endpoints("svc").is_empty());
}

/// Test health check timeout
#[tokio::test]
async fn test_http_health_check_timeout() {
    let backend = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
        .mount(&backend)
        .await;

    let registry = registry(Duration::from_millis(100));
    registry
        .register_service("svc", EndpointSpec::new(backend.uri()).with_id("slow"))
        .unwrap();

    let started = std::time::Instant::now();
    registry.check_health_once().await;
    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(registry.endpoint("slow").unwrap().status(), EndpointStatus::Unhealthy);
}

/// Custom probe path
#[tokio::test]
async fn test_custom_health_check_url() {
    let backend = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ready"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&backend)
        .await;

    let registry = registry(Duration::from_secs(1));
    let mut spec = EndpointSpec::new(backend.uri()).with_id("e1");
    spec.health_check_url = Some(format!("{}/ready", backend.uri()));
    registry.register_service("svc", spec).unwrap();

    registry.check_health_once().await;
    assert_eq!(registry.endpoint("e1").unwrap().status(), EndpointStatus::Healthy);
}

/// Background loop takes a dead endpoint out of rotation and recovery puts
/// it back
#[tokio::test]
async fn test_background_checks_drive_routing() {
    let healthy = health_mock(200).await;
    Mock::given(method("GET"))
        .and(path("/work"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .mount(&healthy)
        .await;

    let registry = registry(Duration::from_millis(500));
    registry
        .register_service("svc", EndpointSpec::new(healthy.uri()).with_id("up"))
        .unwrap();
    registry
        .register_service("svc", EndpointSpec::new("http://127.0.0.1:1").with_id("down"))
        .unwrap();

    let http: Arc<dyn HttpClient> = Arc::new(ReqwestHttpClient::new());
    let router = RequestRouter::new(registry.clone(), http, Arc::new(SystemClock));
    router.add_route(RoutingRule::new("/work", &["GET"], "svc", BalancingStrategy::RoundRobin).unwrap());

    registry.start_health_checks(Duration::from_millis(50));
    assert!(registry.health_checks_running());

    let deadline = tokio::time::Instant::now() + Duration::from_secs(3);
    while registry.endpoint("down").unwrap().status() != EndpointStatus::Unhealthy {
        assert!(tokio::time::Instant::now() < deadline, "probe never marked endpoint down");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    for _ in 0..4 {
        let resp = router.route_request(RequestDescriptor::new("GET", "/work")).await.unwrap();
        assert_eq!(&resp.body[..], b"ok");
    }

    registry.unregister_service("svc", "up");
    let err = router
        .route_request(RequestDescriptor::new("GET", "/work"))
        .await
        .unwrap_err();
    assert!(matches!(err, RoutingError::NoHealthyEndpoints { .. }));

    registry.close();
    assert!(!registry.health_checks_running());
}
