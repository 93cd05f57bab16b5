//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration for the API gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Backend service definitions. One circuit breaker is created per entry.
    pub services: Vec<ServiceConfig>,

    /// Route definitions mapping request paths to services.
    pub routes: Vec<RouteConfig>,

    /// Circuit breaker settings shared by every service.
    pub circuit_breaker: CircuitBreakerConfig,

    /// Per-client rate limiting.
    pub rate_limit: RateLimitConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Request rewriting applied before forwarding.
    pub proxy: ProxySettings,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Admin API settings.
    pub admin: AdminConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// A backend service the gateway forwards to.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServiceConfig {
    /// Service name (e.g., "booking"). Used for breaker lookup, logs and metrics.
    pub name: String,

    /// Base URL of the service (e.g., "http://booking-service:3003").
    pub base_url: String,
}

/// Route configuration mapping requests to a service.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RouteConfig {
    /// Route identifier for logging.
    pub name: String,

    /// Path prefix to match (segment aware, e.g. "/api/bookings").
    pub path_prefix: String,

    /// Name of the service to forward to.
    pub service: String,

    /// Allowed methods. Empty means any method.
    #[serde(default)]
    pub methods: Vec<String>,

    /// Route priority (higher = checked first).
    #[serde(default)]
    pub priority: u32,
}

/// Circuit breaker configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Failures that open the circuit.
    pub max_failures: u32,

    /// Seconds the circuit stays open before letting a trial call through.
    pub open_timeout_secs: u64,

    /// Informational; half-open admits every call and decides on the result.
    pub half_open_timeout_secs: u64,
}

impl CircuitBreakerConfig {
    pub fn open_timeout(&self) -> Duration {
        Duration::from_secs(self.open_timeout_secs)
    }

    pub fn half_open_timeout(&self) -> Duration {
        Duration::from_secs(self.half_open_timeout_secs)
    }
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            max_failures: 5,
            open_timeout_secs: 30,
            half_open_timeout_secs: 10,
        }
    }
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable rate limiting.
    pub enabled: bool,

    /// Bucket capacity (burst size) per client.
    pub capacity: u32,

    /// Tokens added per second per client.
    pub refill_per_second: f64,

    /// Buckets not seen for this long are evicted.
    pub idle_timeout_secs: u64,

    /// How often the eviction sweep runs.
    pub sweep_interval_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            capacity: 100,
            // 100 requests per 60 second window.
            refill_per_second: 100.0 / 60.0,
            idle_timeout_secs: 600,
            sweep_interval_secs: 300,
        }
    }
}

/// Timeout configuration for various operations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Upstream connection establishment timeout in seconds.
    pub connect_secs: u64,

    /// Deadline for a backend to answer, independent of the caller's timeout.
    pub upstream_secs: u64,

    /// Overall inbound request timeout in seconds. Must exceed `upstream_secs`.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 5,
            upstream_secs: 30,
            request_secs: 60,
        }
    }
}

/// Request rewriting settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProxySettings {
    /// Gateway-only path prefix removed before forwarding. Empty disables it.
    pub strip_prefix: String,

    /// Drop `X-User-*` headers sent by unauthenticated callers.
    pub strip_client_identity: bool,
}

impl Default for ProxySettings {
    fn default() -> Self {
        Self {
            strip_prefix: "/api".to_string(),
            strip_client_identity: true,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct AdminConfig {
    /// Mount the admin API under `/admin`.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,
}
