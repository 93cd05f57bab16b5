//! End-to-end forwarding through a running gateway.

use api_gateway::security::Identity;
use api_gateway::GatewayServer;
use axum::{body::Body, http::Request, http::StatusCode, middleware::Next};

mod common;

async fn attach_identity(mut request: Request<Body>, next: Next) -> axum::response::Response {
    request
        .extensions_mut()
        .insert(Identity::new("u-42", "ada@example.com", "passenger"));
    next.run(request).await
}

#[tokio::test]
async fn forwards_identity_and_strips_prefix() {
    let backend = common::start_echo_backend().await;
    let server = GatewayServer::new(common::gateway_config(backend))
        .map_router(|router| router.layer(axum::middleware::from_fn(attach_identity)));
    let gateway = common::start_gateway(server).await;

    let res = common::client()
        .post(gateway.url("/api/bookings/42?date=today"))
        .header("x-user-role", "admin")
        .header("x-trace-tag", "abc")
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    assert!(res.headers().contains_key("x-request-id"));
    let head = res.text().await.unwrap().to_ascii_lowercase();

    assert!(head.starts_with("post /bookings/42?date=today http/1.1"), "{head}");
    assert!(head.contains("x-user-id: u-42"), "{head}");
    assert!(head.contains("x-user-email: ada@example.com"), "{head}");
    assert!(head.contains("x-user-role: passenger"), "{head}");
    assert!(!head.contains("x-user-role: admin"), "{head}");
    assert!(head.contains("x-trace-tag: abc"), "{head}");
    assert!(head.contains("x-request-id: "), "{head}");

    gateway.stop().await;
}

#[tokio::test]
async fn anonymous_requests_cannot_spoof_identity() {
    let backend = common::start_echo_backend().await;
    let gateway = common::start_gateway(GatewayServer::new(common::gateway_config(backend))).await;

    let res = common::client()
        .get(gateway.url("/api/bookings"))
        .header("x-user-id", "root")
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    let head = res.text().await.unwrap().to_ascii_lowercase();
    assert!(head.starts_with("get /bookings http/1.1"), "{head}");
    assert!(!head.contains("x-user-id"), "{head}");

    gateway.stop().await;
}

#[tokio::test]
async fn client_request_id_is_kept() {
    let backend = common::start_echo_backend().await;
    let gateway = common::start_gateway(GatewayServer::new(common::gateway_config(backend))).await;

    let res = common::client()
        .get(gateway.url("/api/bookings"))
        .header("x-request-id", "req-123")
        .send()
        .await
        .unwrap();

    assert_eq!(res.headers()["x-request-id"], "req-123");
    let head = res.text().await.unwrap().to_ascii_lowercase();
    assert!(head.contains("x-request-id: req-123"), "{head}");

    gateway.stop().await;
}

#[tokio::test]
async fn health_and_admin_over_tcp() {
    let backend = common::start_mock_backend(200, "ok").await;
    let mut config = common::gateway_config(backend);
    config.admin.enabled = true;
    config.admin.api_key = "s3cret".into();
    let gateway = common::start_gateway(GatewayServer::new(config)).await;
    let client = common::client();

    let health: serde_json::Value = client
        .get(gateway.url("/health"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "healthy");

    let breakers: serde_json::Value = client
        .get(gateway.url("/admin/breakers"))
        .bearer_auth("s3cret")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(breakers[0]["service"], "booking");
    assert_eq!(breakers[0]["state"], "closed");

    let denied = client.get(gateway.url("/admin/status")).send().await.unwrap();
    assert_eq!(denied.status(), StatusCode::UNAUTHORIZED);

    gateway.stop().await;
}
