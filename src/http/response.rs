//! Responses synthesized by the gateway itself.
//!
//! # Responsibilities
//! - Build the JSON error bodies the gateway answers with when it cannot or
//!   will not relay a backend response
//! - Relay backend responses without buffering
//!
//! # Design Decisions
//! - Streaming responses avoid buffering entire body
//! - Every synthesized body carries a machine-readable `error` code

use axum::{
    body::Body,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use hyper::body::Incoming;
use serde::Serialize;

/// JSON body of every gateway-generated error.
#[derive(Debug, Serialize)]
pub struct ErrorBody<'a> {
    pub error: &'a str,
    pub message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service: Option<&'a str>,
}

fn error_response(
    status: StatusCode,
    error: &str,
    message: &str,
    service: Option<&str>,
) -> Response {
    (
        status,
        Json(ErrorBody {
            error,
            message,
            service,
        }),
    )
        .into_response()
}

/// 429 for a client with no tokens left.
pub fn rate_limited() -> Response {
    error_response(
        StatusCode::TOO_MANY_REQUESTS,
        "rate_limit_exceeded",
        "Rate limit exceeded",
        None,
    )
}

/// 503 for a service whose circuit is open.
pub fn breaker_open(service: &str) -> Response {
    error_response(
        StatusCode::SERVICE_UNAVAILABLE,
        "service_unavailable",
        "Circuit breaker is open. Service is experiencing issues.",
        Some(service),
    )
}

/// 502 for an outbound call that produced no response.
pub fn bad_gateway(service: &str, message: &str) -> Response {
    error_response(StatusCode::BAD_GATEWAY, "bad_gateway", message, Some(service))
}

/// 404 when no route matches.
pub fn route_not_found() -> Response {
    error_response(
        StatusCode::NOT_FOUND,
        "route_not_found",
        "No matching route found",
        None,
    )
}

/// Stream a backend response back with status and headers untouched.
pub fn relay(response: hyper::Response<Incoming>) -> Response {
    let (parts, body) = response.into_parts();
    Response::from_parts(parts, Body::new(body))
}
