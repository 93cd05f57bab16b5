//! Per-request classification.

use axum::http::StatusCode;

/// What happened to one inbound request.
///
/// Attached to every response the gateway produces (as a response extension)
/// and used for logging and metrics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Passed admission control.
    Admitted,
    /// Rejected by the rate limiter; no backend contacted.
    RateLimited,
    /// No route matched; no backend contacted.
    RouteNotFound,
    /// Refused by the service's open circuit; no backend contacted.
    BreakerOpen { service: String },
    /// The outbound call could not be completed (connect, DNS, timeout).
    TransportFailure { service: String },
    /// The backend answered with a failure-class status (>= 500).
    BackendError { status: StatusCode },
    /// The backend answered with any other status.
    BackendSuccess { status: StatusCode },
}

impl Outcome {
    /// Short label for metrics.
    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Admitted => "admitted",
            Outcome::RateLimited => "rate_limited",
            Outcome::RouteNotFound => "route_not_found",
            Outcome::BreakerOpen { .. } => "breaker_open",
            Outcome::TransportFailure { .. } => "transport_failure",
            Outcome::BackendError { .. } => "backend_error",
            Outcome::BackendSuccess { .. } => "backend_success",
        }
    }

    /// Classify a backend status code.
    pub fn from_status(status: StatusCode) -> Self {
        if status.as_u16() >= 500 {
            Outcome::BackendError { status }
        } else {
            Outcome::BackendSuccess { status }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_status() {
        assert_eq!(
            Outcome::from_status(StatusCode::INTERNAL_SERVER_ERROR),
            Outcome::BackendError {
                status: StatusCode::INTERNAL_SERVER_ERROR
            }
        );
        assert_eq!(
            Outcome::from_status(StatusCode::NOT_FOUND),
            Outcome::BackendSuccess {
                status: StatusCode::NOT_FOUND
            }
        );
        assert_eq!(
            Outcome::from_status(StatusCode::BAD_GATEWAY).label(),
            "backend_error"
        );
        assert_eq!(Outcome::RouteNotFound.label(), "route_not_found");
    }
}
