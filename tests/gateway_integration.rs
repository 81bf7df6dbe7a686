//! Integration tests for request routing with Wiremock
//!
//! Drives the full router stack (registry, load balancer, circuit breakers,
//! cache, reqwest client) against mock backends.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use edge_gateway::adapters::inbound::{ApiServer, GatewayServer};
use edge_gateway::adapters::outbound::{ManualClock, ReqwestHttpClient, SystemClock};
use edge_gateway::{
    BalancingStrategy, CircuitState, Clock, EndpointSpec, HttpClient, RegistryConfig,
    RequestDescriptor, RequestRouter, RoutingError, RoutingRule, ServiceRegistry,
};
use http_body_util::BodyExt;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn router_with(clock: Arc<dyn Clock>) -> Arc<RequestRouter> {
    let http: Arc<dyn HttpClient> = Arc::new(ReqwestHttpClient::new());
    let registry = Arc::new(ServiceRegistry::new(
        http.clone(),
        clock.clone(),
        RegistryConfig::default(),
    ));
    Arc::new(RequestRouter::new(registry, http, clock))
}

fn rule(pattern: &str, methods: &[&str], service: &str, strategy: BalancingStrategy) -> RoutingRule {
    RoutingRule::new(pattern, methods, service, strategy).unwrap()
}

/// Round robin across two live backends
#[tokio::test]
async fn test_round_robin_across_backends() {
    let backend_a = MockServer::start().await;
    let backend_b = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/orders/42"))
        .respond_with(ResponseTemplate::new(200).set_body_string("from-a"))
        .expect(2)
        .mount(&backend_a)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/orders/42"))
        .respond_with(ResponseTemplate::new(200).set_body_string("from-b"))
        .expect(1)
        .mount(&backend_b)
        .await;

    let router = router_with(Arc::new(SystemClock));
    let registry = router.registry();
    registry
        .register_service("orders", EndpointSpec::new(backend_a.uri()).with_id("a"))
        .unwrap();
    registry
        .register_service("orders", EndpointSpec::new(backend_b.uri()).with_id("b"))
        .unwrap();
    router.add_route(rule("/api/orders/*", &["GET"], "orders", BalancingStrategy::RoundRobin));

    let mut bodies = Vec::new();
    for _ in 0..3 {
        let resp = router
            .route_request(RequestDescriptor::new("GET", "/api/orders/42"))
            .await
            .unwrap();
        bodies.push(String::from_utf8(resp.body.to_vec()).unwrap());
    }
    assert_eq!(bodies, vec!["from-a", "from-b", "from-a"]);

    for id in ["a", "b"] {
        assert_eq!(registry.endpoint(id).unwrap().current_connections(), 0);
    }
}

/// Query, headers and body are forwarded; Host is not
#[tokio::test]
async fn test_request_is_forwarded_intact() {
    let backend = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/orders"))
        .and(query_param("dry_run", "true"))
        .and(header("x-request-id", "req-7"))
        .respond_with(ResponseTemplate::new(201).set_body_string("created"))
        .expect(1)
        .mount(&backend)
        .await;

    let router = router_with(Arc::new(SystemClock));
    router
        .registry()
        .register_service("orders", EndpointSpec::new(backend.uri()).with_id("e1"))
        .unwrap();
    router.add_route(rule("/api/*", &["POST"], "orders", BalancingStrategy::LeastConnections));

    let resp = router
        .route_request(
            RequestDescriptor::new("POST", "/api/orders")
                .with_query("dry_run", "true")
                .with_header("Host", "gateway.example")
                .with_header("x-request-id", "req-7")
                .with_body(r#"{"sku":"A1"}"#),
        )
        .await
        .unwrap();
    assert_eq!(resp.status, 201);
    assert_eq!(&resp.body[..], b"created");

    let received = backend.received_requests().await.unwrap();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].body, br#"{"sku":"A1"}"#.to_vec());
    let host = received[0].headers.get("host").unwrap().to_str().unwrap();
    assert_ne!(host, "gateway.example");
}

/// Failing backend trips the breaker; further calls never reach it
#[tokio::test]
async fn test_breaker_opens_on_backend_errors() {
    let backend = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .expect(3)
        .mount(&backend)
        .await;

    let clock = Arc::new(ManualClock::new());
    let router = router_with(clock.clone());
    router
        .registry()
        .register_service(
            "flaky",
            EndpointSpec::new(backend.uri())
                .with_id("flaky-1")
                .with_breaker(3, Duration::from_secs(60)),
        )
        .unwrap();
    router.add_route(rule("/*", &["GET"], "flaky", BalancingStrategy::RoundRobin));

    for _ in 0..3 {
        let err = router
            .route_request(RequestDescriptor::new("GET", "/x"))
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 500);
    }

    let breaker = router.registry().breaker("flaky-1").unwrap();
    assert_eq!(breaker.state(), CircuitState::Open);

    clock.advance(Duration::from_secs(10));
    let err = router
        .route_request(RequestDescriptor::new("GET", "/x"))
        .await
        .unwrap_err();
    assert!(matches!(err, RoutingError::CircuitOpen { .. }));
}

/// A backend slower than the endpoint timeout yields 504
#[tokio::test]
async fn test_slow_backend_times_out() {
    let backend = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
        .mount(&backend)
        .await;

    let router = router_with(Arc::new(SystemClock));
    router
        .registry()
        .register_service(
            "slow",
            EndpointSpec::new(backend.uri())
                .with_id("slow-1")
                .with_timeout(Duration::from_millis(100)),
        )
        .unwrap();
    router.add_route(rule("/*", &["GET"], "slow", BalancingStrategy::PerformanceBased));

    let err = router
        .route_request(RequestDescriptor::new("GET", "/report"))
        .await
        .unwrap_err();
    assert!(matches!(err, RoutingError::BackendTimeout { .. }));
    assert_eq!(err.status_code(), 504);

    let registry = router.registry();
    assert_eq!(registry.breaker("slow-1").unwrap().failure_count(), 1);
    assert_eq!(registry.endpoint("slow-1").unwrap().current_connections(), 0);
}

/// Cached GET is served without contacting the backend again
#[tokio::test]
async fn test_cached_route_hits_backend_once() {
    let backend = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/catalog/items"))
        .respond_with(ResponseTemplate::new(200).set_body_string("items"))
        .expect(2)
        .mount(&backend)
        .await;

    let clock = Arc::new(ManualClock::new());
    let router = router_with(clock.clone());
    router
        .registry()
        .register_service("catalog", EndpointSpec::new(backend.uri()))
        .unwrap();
    router.add_route(
        rule("/catalog/*", &["GET"], "catalog", BalancingStrategy::Weighted).with_cache_ttl(5),
    );

    for _ in 0..3 {
        router
            .route_request(RequestDescriptor::new("GET", "/catalog/items"))
            .await
            .unwrap();
        clock.advance(Duration::from_secs(1));
    }

    clock.advance(Duration::from_secs(5));
    let resp = router
        .route_request(RequestDescriptor::new("GET", "/catalog/items"))
        .await
        .unwrap();
    assert_eq!(&resp.body[..], b"items");
}

/// Endpoints registered over the admin API receive traffic from the gateway
#[tokio::test]
async fn test_admin_registration_then_gateway_traffic() {
    let backend = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/users/1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": 1})))
        .expect(1)
        .mount(&backend)
        .await;

    let router = router_with(Arc::new(SystemClock));
    let admin = ApiServer::new("127.0.0.1:0".to_string(), router.clone());
    let gateway = GatewayServer::new("127.0.0.1:0".to_string(), router.clone());

    let register = Request::builder()
        .method("POST")
        .uri("/api/v1/services/users/endpoints")
        .header("content-type", "application/json")
        .body(Body::from(
            serde_json::json!({ "id": "u1", "url": backend.uri() }).to_string(),
        ))
        .unwrap();
    let resp = admin.app().oneshot(register).await.unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);

    let route = Request::builder()
        .method("POST")
        .uri("/api/v1/routes")
        .header("content-type", "application/json")
        .body(Body::from(
            r#"{"path": "/users/*", "methods": ["GET"], "service": "users"}"#,
        ))
        .unwrap();
    let resp = admin.app().oneshot(route).await.unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);

    let call = Request::builder().uri("/users/1").body(Body::empty()).unwrap();
    let resp = gateway.app().oneshot(call).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = resp.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["id"], 1);

    // Unregistered endpoints stop receiving traffic
    let remove = Request::builder()
        .method("DELETE")
        .uri("/api/v1/services/users/endpoints/u1")
        .body(Body::empty())
        .unwrap();
    let resp = admin.app().oneshot(remove).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);

    let call = Request::builder().uri("/users/1").body(Body::empty()).unwrap();
    let resp = gateway.app().oneshot(call).await.unwrap();
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
}
