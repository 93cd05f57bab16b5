//! Circuit-protected forwarding of one admitted request.
//!
//! # Data Flow
//! ```text
//! admitted request + target base URL
//!     → registry (service name + breaker, or unprotected)
//!     → breaker.execute(forward)
//!         forward: build outbound → client.request under upstream timeout
//!                  status >= 500 → Err(Status(response))  (failure, still relayed)
//!                  transport err → Err(Transport/Timeout)   (failure, 502)
//!                  otherwise     → Ok(response)             (success, relayed)
//!     → breaker refused → 503 naming the service
//! ```
//!
//! # Design Decisions
//! - The upstream timeout is independent of the inbound request timeout
//! - No retries; one outbound attempt per inbound request
//! - If the caller goes away, the handler future is dropped and the outbound
//!   call with it; the breaker records neither success nor failure

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    response::Response,
};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use thiserror::Error;
use url::Url;

use crate::http::outcome::Outcome;
use crate::http::request::{build_outbound, Rewrite};
use crate::http::response;
use crate::resilience::{BreakerError, BreakerRegistry, Protection};

/// Why a forwarding attempt counts as a backend failure.
#[derive(Error)]
pub enum UpstreamFailure {
    #[error("invalid outbound request: {0}")]
    InvalidRequest(#[from] axum::http::Error),

    #[error("upstream request failed: {0}")]
    Transport(#[source] hyper_util::client::legacy::Error),

    #[error("upstream timed out after {0:?}")]
    Timeout(Duration),

    #[error("upstream returned {}", .0.status())]
    Status(Response),
}

impl fmt::Debug for UpstreamFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpstreamFailure::InvalidRequest(e) => f.debug_tuple("InvalidRequest").field(e).finish(),
            UpstreamFailure::Transport(e) => f.debug_tuple("Transport").field(e).finish(),
            UpstreamFailure::Timeout(d) => f.debug_tuple("Timeout").field(d).finish(),
            UpstreamFailure::Status(r) => f.debug_tuple("Status").field(&r.status()).finish(),
        }
    }
}

/// Forwards admitted requests to backends through their circuit breakers.
#[derive(Clone)]
pub struct Dispatcher {
    client: Client<HttpConnector, Body>,
    breakers: Arc<BreakerRegistry>,
    upstream_timeout: Duration,
    rewrite: Arc<Rewrite>,
}

impl Dispatcher {
    pub fn new(
        breakers: Arc<BreakerRegistry>,
        connect_timeout: Duration,
        upstream_timeout: Duration,
        rewrite: Rewrite,
    ) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(connect_timeout));
        let client = Client::builder(TokioExecutor::new()).build(connector);

        Self {
            client,
            breakers,
            upstream_timeout,
            rewrite: Arc::new(rewrite),
        }
    }

    pub fn breakers(&self) -> &Arc<BreakerRegistry> {
        &self.breakers
    }

    /// Forward `request` to the backend at `target`.
    ///
    /// Returns the response to send to the caller and its classification; the
    /// outcome is also stored in the response extensions.
    pub async fn dispatch(&self, target: &Url, request: Request<Body>) -> (Outcome, Response) {
        let protection = self.breakers.resolve(target);
        let service = protection.service().to_string();

        let forward = || self.forward(target, request);
        let result = match &protection {
            Protection::Guarded { breaker, .. } => breaker.execute(forward).await,
            Protection::Unprotected => forward().await.map_err(BreakerError::Inner),
        };

        let (outcome, mut response) = match result {
            Ok(response) => (Outcome::from_status(response.status()), response),
            Err(BreakerError::Open) => {
                tracing::warn!(service = %service, "Circuit open, refusing request");
                (
                    Outcome::BreakerOpen {
                        service: service.clone(),
                    },
                    response::breaker_open(&service),
                )
            }
            Err(BreakerError::Inner(UpstreamFailure::Status(response))) => {
                tracing::warn!(service = %service, status = %response.status(), "Backend returned server error");
                (Outcome::from_status(response.status()), response)
            }
            Err(BreakerError::Inner(failure)) => {
                tracing::error!(service = %service, error = %failure, "Upstream error");
                let message = match failure {
                    UpstreamFailure::Timeout(_) => "Upstream request timed out",
                    _ => "Upstream request failed",
                };
                (
                    Outcome::TransportFailure {
                        service: service.clone(),
                    },
                    response::bad_gateway(&service, message),
                )
            }
        };

        response.extensions_mut().insert(outcome.clone());
        (outcome, response)
    }

    async fn forward(&self, target: &Url, request: Request<Body>) -> Result<Response, UpstreamFailure> {
        let (parts, body) = request.into_parts();
        let outbound = build_outbound(parts, body, target, &self.rewrite)?;

        let upstream = match tokio::time::timeout(self.upstream_timeout, self.client.request(outbound)).await {
            Ok(Ok(upstream)) => upstream,
            Ok(Err(e)) => return Err(UpstreamFailure::Transport(e)),
            Err(_) => return Err(UpstreamFailure::Timeout(self.upstream_timeout)),
        };

        let response = response::relay(upstream);
        if response.status() >= StatusCode::INTERNAL_SERVER_ERROR {
            Err(UpstreamFailure::Status(response))
        } else {
            Ok(response)
        }
    }
}
