//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check referential integrity (routes reference existing services)
//! - Validate value ranges (timeouts > 0, thresholds > 0)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::net::SocketAddr;

use axum::http::Method;
use thiserror::Error;
use url::Url;

use crate::config::schema::GatewayConfig;

/// A single semantic problem found in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("invalid listener bind address '{0}'")]
    BindAddress(String),

    #[error("service '{0}' is defined more than once")]
    DuplicateService(String),

    #[error("service name must not be empty")]
    EmptyServiceName,

    #[error("service '{name}' has invalid base_url '{url}': {reason}")]
    BaseUrl {
        name: String,
        url: String,
        reason: String,
    },

    #[error("route '{route}' references unknown service '{service}'")]
    UnknownService { route: String, service: String },

    #[error("route '{0}' path_prefix must start with '/'")]
    PathPrefix(String),

    #[error("route '{route}' has invalid method '{method}'")]
    Method { route: String, method: String },

    #[error("{0} must be greater than zero")]
    NotPositive(&'static str),

    #[error("timeouts.request_secs ({request_secs}) must exceed timeouts.upstream_secs ({upstream_secs})")]
    RequestTimeout { request_secs: u64, upstream_secs: u64 },

    #[error("proxy.strip_prefix '{0}' must start with '/' and not end with '/'")]
    StripPrefix(String),

    #[error("admin.api_key must be set when the admin API is enabled")]
    MissingAdminKey,
}

/// Validate a parsed configuration, collecting every problem.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::BindAddress(
            config.listener.bind_address.clone(),
        ));
    }

    let mut names = HashSet::new();
    for service in &config.services {
        if service.name.is_empty() {
            errors.push(ValidationError::EmptyServiceName);
        } else if !names.insert(service.name.as_str()) {
            errors.push(ValidationError::DuplicateService(service.name.clone()));
        }

        if let Err(reason) = check_base_url(&service.base_url) {
            errors.push(ValidationError::BaseUrl {
                name: service.name.clone(),
                url: service.base_url.clone(),
                reason,
            });
        }
    }

    for route in &config.routes {
        if !names.contains(route.service.as_str()) {
            errors.push(ValidationError::UnknownService {
                route: route.name.clone(),
                service: route.service.clone(),
            });
        }
        if !route.path_prefix.starts_with('/') {
            errors.push(ValidationError::PathPrefix(route.name.clone()));
        }
        for method in &route.methods {
            if Method::from_bytes(method.to_ascii_uppercase().as_bytes()).is_err() {
                errors.push(ValidationError::Method {
                    route: route.name.clone(),
                    method: method.clone(),
                });
            }
        }
    }

    let breaker = &config.circuit_breaker;
    if breaker.max_failures == 0 {
        errors.push(ValidationError::NotPositive("circuit_breaker.max_failures"));
    }
    if breaker.open_timeout_secs == 0 {
        errors.push(ValidationError::NotPositive("circuit_breaker.open_timeout_secs"));
    }

    let limits = &config.rate_limit;
    if limits.enabled {
        if limits.capacity == 0 {
            errors.push(ValidationError::NotPositive("rate_limit.capacity"));
        }
        if limits.refill_per_second.is_nan() || limits.refill_per_second <= 0.0 {
            errors.push(ValidationError::NotPositive("rate_limit.refill_per_second"));
        }
        if limits.idle_timeout_secs == 0 {
            errors.push(ValidationError::NotPositive("rate_limit.idle_timeout_secs"));
        }
        if limits.sweep_interval_secs == 0 {
            errors.push(ValidationError::NotPositive("rate_limit.sweep_interval_secs"));
        }
    }

    let timeouts = &config.timeouts;
    if timeouts.connect_secs == 0 {
        errors.push(ValidationError::NotPositive("timeouts.connect_secs"));
    }
    if timeouts.upstream_secs == 0 {
        errors.push(ValidationError::NotPositive("timeouts.upstream_secs"));
    }
    if timeouts.request_secs == 0 {
        errors.push(ValidationError::NotPositive("timeouts.request_secs"));
    }
    // The inbound timeout must not cut off the upstream call before it can
    // be recorded against the breaker.
    if timeouts.upstream_secs > 0
        && timeouts.request_secs > 0
        && timeouts.request_secs <= timeouts.upstream_secs
    {
        errors.push(ValidationError::RequestTimeout {
            request_secs: timeouts.request_secs,
            upstream_secs: timeouts.upstream_secs,
        });
    }

    let prefix = &config.proxy.strip_prefix;
    if !prefix.is_empty() && (!prefix.starts_with('/') || prefix.ends_with('/')) {
        errors.push(ValidationError::StripPrefix(prefix.clone()));
    }

    if config.admin.enabled && config.admin.api_key.is_empty() {
        errors.push(ValidationError::MissingAdminKey);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_base_url(raw: &str) -> Result<(), String> {
    let url = Url::parse(raw).map_err(|e| e.to_string())?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(format!("unsupported scheme '{}'", url.scheme()));
    }
    if url.host_str().is_none() {
        return Err("missing host".to_string());
    }
    if url.query().is_some() {
        return Err("query strings are not allowed".to_string());
    }
    Ok(())
}
