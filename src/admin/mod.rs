pub mod auth;
pub mod handlers;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use self::auth::admin_auth_middleware;
use self::handlers::*;
use crate::http::server::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/breakers", get(get_breakers))
        .route("/admin/breakers/{service}/reset", post(reset_breaker))
        .layer(middleware::from_fn_with_state(state.clone(), admin_auth_middleware))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{GatewayConfig, ServiceConfig};
    use crate::http::GatewayServer;
    use crate::resilience::CircuitState;
    use axum::{
        body::Body,
        http::{header, Method, Request, StatusCode},
    };
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn server() -> GatewayServer {
        let mut config = GatewayConfig::default();
        config.admin.enabled = true;
        config.admin.api_key = "secret".into();
        config.services.push(ServiceConfig {
            name: "auth".into(),
            base_url: "http://auth-service:3001".into(),
        });
        GatewayServer::new(config)
    }

    fn admin(method: Method, uri: &str, key: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(key) = key {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {key}"));
        }
        builder.body(Body::empty()).unwrap()
    }

    async fn json(response: axum::response::Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn requires_bearer_key() {
        let server = server();
        let missing = server
            .router()
            .oneshot(admin(Method::GET, "/admin/status", None))
            .await
            .unwrap();
        assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);

        let wrong = server
            .router()
            .oneshot(admin(Method::GET, "/admin/status", Some("nope")))
            .await
            .unwrap();
        assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn lists_and_resets_breakers() {
        let server = server();
        let breaker = server.breakers().get("auth").unwrap().clone();
        for _ in 0..5 {
            breaker.record_failure();
        }
        assert_eq!(breaker.state(), CircuitState::Open);

        let listed = server
            .router()
            .oneshot(admin(Method::GET, "/admin/breakers", Some("secret")))
            .await
            .unwrap();
        assert_eq!(listed.status(), StatusCode::OK);
        let body = json(listed).await;
        assert_eq!(body[0]["service"], "auth");
        assert_eq!(body[0]["state"], "open");

        let status = server
            .router()
            .oneshot(admin(Method::GET, "/admin/status", Some("secret")))
            .await
            .unwrap();
        let body = json(status).await;
        assert_eq!(body["status"], "degraded");
        assert_eq!(body["open_circuits"], 1);

        let reset = server
            .router()
            .oneshot(admin(Method::POST, "/admin/breakers/auth/reset", Some("secret")))
            .await
            .unwrap();
        assert_eq!(reset.status(), StatusCode::OK);
        assert_eq!(json(reset).await["state"], "closed");
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.failures(), 0);
    }

    #[tokio::test]
    async fn reset_unknown_service_is_404() {
        let response = server()
            .router()
            .oneshot(admin(Method::POST, "/admin/breakers/ghost/reset", Some("secret")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(json(response).await["service"], "ghost");
    }
}
