//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with all handlers
//! - Wire up middleware (tracing, request ID, timeout, admission control)
//! - Bind server to listener
//! - Dispatch requests to routing engine
//! - Forward requests to backends through their circuit breakers
//! - Own the rate limiter sweeper for the lifetime of `run`

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tower_http::{
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::admin;
use crate::config::GatewayConfig;
use crate::http::dispatch::Dispatcher;
use crate::http::outcome::Outcome;
use crate::http::request::{request_id, MakeRequestUuidV4, Rewrite};
use crate::http::response;
use crate::observability::metrics;
use crate::resilience::{BreakerRegistry, BreakerSettings};
use crate::routing::Router as RouteTable;
use crate::security::rate_limit::{rate_limit_middleware, RateLimiter};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub routes: Arc<RouteTable>,
    pub dispatcher: Dispatcher,
    pub limiter: Arc<RateLimiter>,
    pub config: Arc<GatewayConfig>,
}

impl AppState {
    pub fn breakers(&self) -> &Arc<BreakerRegistry> {
        self.dispatcher.breakers()
    }
}

/// HTTP server for the gateway.
pub struct GatewayServer {
    router: Router,
    config: Arc<GatewayConfig>,
    limiter: Arc<RateLimiter>,
    breakers: Arc<BreakerRegistry>,
}

impl GatewayServer {
    /// Create a new server with the given configuration.
    pub fn new(config: GatewayConfig) -> Self {
        let config = Arc::new(config);

        let routes = Arc::new(RouteTable::from_config(&config.routes, &config.services));
        let breakers = Arc::new(BreakerRegistry::new(
            &config.services,
            BreakerSettings::from(&config.circuit_breaker),
        ));
        let limiter = Arc::new(RateLimiter::from_config(&config.rate_limit));
        let dispatcher = Dispatcher::new(
            breakers.clone(),
            Duration::from_secs(config.timeouts.connect_secs),
            Duration::from_secs(config.timeouts.upstream_secs),
            Rewrite {
                strip_prefix: config.proxy.strip_prefix.clone(),
                strip_client_identity: config.proxy.strip_client_identity,
            },
        );

        let state = AppState {
            routes,
            dispatcher,
            limiter: limiter.clone(),
            config: config.clone(),
        };

        let router = Self::build_router(&config, state);
        Self {
            router,
            config,
            limiter,
            breakers,
        }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &GatewayConfig, state: AppState) -> Router {
        let mut app = Router::new()
            .route("/health", get(health_handler))
            .fallback(proxy_handler)
            .with_state(state.clone());

        if config.rate_limit.enabled {
            app = app.layer(middleware::from_fn_with_state(
                state.limiter.clone(),
                rate_limit_middleware,
            ));
        }

        if config.admin.enabled {
            app = app.merge(admin::router(state));
        }

        app.layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuidV4))
    }

    /// Wrap the router, e.g. with an authentication layer that attaches an
    /// [`Identity`](crate::security::identity::Identity) to requests.
    pub fn map_router(mut self, f: impl FnOnce(Router) -> Router) -> Self {
        self.router = f(self.router);
        self
    }

    /// Run the server until `shutdown` fires, then drain in-flight requests
    /// and stop the rate limiter sweeper.
    pub async fn run(
        self,
        listener: TcpListener,
        shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let sweeper = self
            .config
            .rate_limit
            .enabled
            .then(|| self.limiter.spawn_sweeper(shutdown.resubscribe()));

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();

        let result = axum::serve(listener, app)
            .with_graceful_shutdown(crate::lifecycle::shutdown::wait(shutdown))
            .await;

        if let Some(sweeper) = sweeper {
            if result.is_err() {
                sweeper.abort();
            }
            let _ = sweeper.await;
        }

        tracing::info!("HTTP server stopped");
        result
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn breakers(&self) -> &Arc<BreakerRegistry> {
        &self.breakers
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    /// A clone of the fully layered router.
    pub fn router(&self) -> Router {
        self.router.clone()
    }
}

async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "api-gateway",
    }))
}

/// Main proxy handler.
/// Looks up the route and forwards the request through its breaker.
async fn proxy_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let start_time = Instant::now();
    let request_id = request_id(&request);
    let method = request.method().to_string();
    let path = request.uri().path().to_string();

    tracing::debug!(
        request_id = %request_id,
        method = %method,
        path = %path,
        "Proxying request"
    );

    let Some(route) = state.routes.match_request(&request) else {
        tracing::warn!(request_id = %request_id, path = %path, "No route matched");
        let mut response = response::route_not_found();
        response.extensions_mut().insert(Outcome::RouteNotFound);
        metrics::record_request(&method, 404, "none", &Outcome::RouteNotFound, start_time);
        return response;
    };

    let (outcome, response) = state.dispatcher.dispatch(&route.target, request).await;

    let status = response.status().as_u16();
    metrics::record_request(&method, status, &route.service, &outcome, start_time);
    tracing::debug!(
        request_id = %request_id,
        route = %route.name,
        service = %route.service,
        status,
        outcome = outcome.label(),
        elapsed_ms = start_time.elapsed().as_millis() as u64,
        "Request completed"
    );

    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RouteConfig, ServiceConfig};
    use axum::http::StatusCode;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn config() -> GatewayConfig {
        let mut config = GatewayConfig::default();
        config.services.push(ServiceConfig {
            name: "booking".into(),
            // Nothing listens on port 1.
            base_url: "http://127.0.0.1:1".into(),
        });
        config.routes.push(RouteConfig {
            name: "bookings".into(),
            path_prefix: "/api/bookings".into(),
            service: "booking".into(),
            methods: Vec::new(),
            priority: 0,
        });
        config
    }

    async fn json(response: Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn health_answers_locally() {
        let server = GatewayServer::new(config());
        let response = server.router().oneshot(get("/health")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-request-id"));
        let body = json(response).await;
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["service"], "api-gateway");
    }

    #[tokio::test]
    async fn unmatched_path_is_404() {
        let server = GatewayServer::new(config());
        let response = server.router().oneshot(get("/nowhere")).await.unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(response.extensions().get::<Outcome>(), Some(&Outcome::RouteNotFound));
        assert_eq!(json(response).await["error"], "route_not_found");
    }

    #[tokio::test]
    async fn unreachable_backend_is_502_and_counted() {
        let server = GatewayServer::new(config());
        let response = server.router().oneshot(get("/api/bookings/1")).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(
            response.extensions().get::<Outcome>(),
            Some(&Outcome::TransportFailure {
                service: "booking".into()
            })
        );
        let body = json(response).await;
        assert_eq!(body["error"], "bad_gateway");
        assert_eq!(body["service"], "booking");
        assert_eq!(server.breakers().get("booking").unwrap().failures(), 1);
    }

    #[tokio::test]
    async fn exhausted_client_gets_429() {
        let mut config = config();
        config.rate_limit.capacity = 1;
        config.rate_limit.refill_per_second = 0.001;
        let server = GatewayServer::new(config);

        let first = server.router().oneshot(get("/health")).await.unwrap();
        assert_eq!(first.status(), StatusCode::OK);

        let second = server.router().oneshot(get("/health")).await.unwrap();
        assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(second.extensions().get::<Outcome>(), Some(&Outcome::RateLimited));
        assert_eq!(json(second).await["error"], "rate_limit_exceeded");
    }

    #[tokio::test]
    async fn rate_limiting_can_be_disabled() {
        let mut config = config();
        config.rate_limit.enabled = false;
        config.rate_limit.capacity = 1;
        let server = GatewayServer::new(config);

        for _ in 0..3 {
            let response = server.router().oneshot(get("/health")).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }
        assert!(server.limiter().is_empty());
    }
}
