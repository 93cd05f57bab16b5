use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::http::response::ErrorBody;
use crate::http::server::AppState;
use crate::resilience::{BreakerSnapshot, CircuitState};

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub services: usize,
    pub routes: usize,
    pub open_circuits: usize,
    pub tracked_clients: usize,
}

pub async fn get_status(State(state): State<AppState>) -> Json<SystemStatus> {
    let open_circuits = state
        .breakers()
        .snapshots()
        .iter()
        .filter(|s| s.state != CircuitState::Closed)
        .count();

    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: if open_circuits == 0 { "operational" } else { "degraded" },
        services: state.breakers().len(),
        routes: state.routes.routes().len(),
        open_circuits,
        tracked_clients: state.limiter.len(),
    })
}

pub async fn get_breakers(State(state): State<AppState>) -> Json<Vec<BreakerSnapshot>> {
    Json(state.breakers().snapshots())
}

pub async fn reset_breaker(
    State(state): State<AppState>,
    Path(service): Path<String>,
) -> Response {
    if !state.breakers().reset(&service) {
        let body = ErrorBody {
            error: "unknown_service",
            message: "No circuit breaker for this service",
            service: Some(service.as_str()),
        };
        return (StatusCode::NOT_FOUND, Json(body)).into_response();
    }

    tracing::info!(service = %service, "Circuit breaker reset via admin API");
    match state.breakers().get(&service) {
        Some(breaker) => Json(breaker.snapshot()).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    }
}
