//! Per-service circuit breaker registry.
//!
//! # Responsibilities
//! - Own one circuit breaker per configured backend service
//! - Resolve the service (and breaker) for an outbound target address
//!
//! # Design Decisions
//! - Built once at startup, never mutated afterwards (lookups take no lock)
//! - Targets that resolve to no known service are forwarded unprotected
//!   rather than rejected; routing lives outside this registry and must not
//!   be blocked by gaps in it

use std::collections::HashMap;
use std::sync::Arc;

use url::Url;

use crate::config::ServiceConfig;
use crate::resilience::circuit_breaker::{BreakerSettings, BreakerSnapshot, CircuitBreaker};

/// Name reported for targets that match no configured service.
pub const UNKNOWN_SERVICE: &str = "unknown";

/// How a target is guarded.
#[derive(Debug, Clone)]
pub enum Protection {
    /// Calls go through the service's breaker.
    Guarded {
        service: String,
        breaker: Arc<CircuitBreaker>,
    },
    /// No breaker; calls are attempted and outcomes are not tracked.
    Unprotected,
}

impl Protection {
    pub fn service(&self) -> &str {
        match self {
            Protection::Guarded { service, .. } => service,
            Protection::Unprotected => UNKNOWN_SERVICE,
        }
    }
}

#[derive(Debug)]
struct ServiceEntry {
    name: String,
    base_url: Option<Url>,
}

/// Owns the breaker of every backend service.
#[derive(Debug)]
pub struct BreakerRegistry {
    breakers: HashMap<String, Arc<CircuitBreaker>>,
    services: Vec<ServiceEntry>,
}

impl BreakerRegistry {
    /// Create one breaker per service, all sharing `settings`.
    pub fn new(services: &[ServiceConfig], settings: BreakerSettings) -> Self {
        let mut breakers = HashMap::new();
        let mut entries = Vec::new();

        for service in services {
            breakers
                .entry(service.name.clone())
                .or_insert_with(|| Arc::new(CircuitBreaker::new(&service.name, settings)));

            let base_url = match Url::parse(&service.base_url) {
                Ok(url) => Some(url),
                Err(e) => {
                    tracing::warn!(service = %service.name, error = %e, "Invalid service base URL");
                    None
                }
            };
            entries.push(ServiceEntry {
                name: service.name.clone(),
                base_url,
            });
        }

        tracing::info!(services = breakers.len(), "Circuit breakers initialized");

        Self {
            breakers,
            services: entries,
        }
    }

    /// Breaker for a service name.
    pub fn get(&self, service: &str) -> Option<&Arc<CircuitBreaker>> {
        self.breakers.get(service)
    }

    /// Name of the service a target address belongs to.
    ///
    /// An exact base URL match wins; otherwise a `<name>-service` host label
    /// identifies the service (`http://auth-service:3001` → `auth`). Anything
    /// else is [`UNKNOWN_SERVICE`].
    pub fn service_for_target(&self, target: &Url) -> &str {
        let exact = self
            .services
            .iter()
            .find(|s| s.base_url.as_ref().is_some_and(|u| same_origin(u, target)));
        if let Some(entry) = exact {
            return &entry.name;
        }

        let host = target.host_str().unwrap_or_default();
        let by_host = self.services.iter().find(|s| {
            host.split('.')
                .next()
                .and_then(|label| label.strip_suffix("-service"))
                .is_some_and(|prefix| prefix == s.name || label_matches(prefix, &s.name))
        });

        by_host.map(|s| s.name.as_str()).unwrap_or(UNKNOWN_SERVICE)
    }

    /// Resolve the protection for a target address.
    pub fn resolve(&self, target: &Url) -> Protection {
        let service = self.service_for_target(target);
        match self.breakers.get(service) {
            Some(breaker) => Protection::Guarded {
                service: service.to_string(),
                breaker: breaker.clone(),
            },
            None => Protection::Unprotected,
        }
    }

    /// Reset one breaker. Returns false for an unknown service.
    pub fn reset(&self, service: &str) -> bool {
        match self.breakers.get(service) {
            Some(breaker) => {
                breaker.reset();
                true
            }
            None => false,
        }
    }

    /// Snapshots of every breaker, sorted by service name.
    pub fn snapshots(&self) -> Vec<BreakerSnapshot> {
        let mut snapshots: Vec<_> = self.breakers.values().map(|b| b.snapshot()).collect();
        snapshots.sort_by(|a, b| a.service.cmp(&b.service));
        snapshots
    }

    pub fn len(&self) -> usize {
        self.breakers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.breakers.is_empty()
    }
}

fn same_origin(a: &Url, b: &Url) -> bool {
    a.scheme() == b.scheme()
        && a.host_str() == b.host_str()
        && a.port_or_known_default() == b.port_or_known_default()
        && a.path().trim_end_matches('/') == b.path().trim_end_matches('/')
}

// `seat-reservation-service` belongs to the `seat` service.
fn label_matches(prefix: &str, name: &str) -> bool {
    prefix
        .strip_prefix(name)
        .is_some_and(|rest| rest.starts_with('-'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resilience::circuit_breaker::CircuitState;
    use std::time::Duration;

    fn settings() -> BreakerSettings {
        BreakerSettings {
            max_failures: 2,
            open_timeout: Duration::from_secs(30),
            half_open_timeout: Duration::from_secs(10),
        }
    }

    fn registry() -> BreakerRegistry {
        let services = vec![
            ServiceConfig {
                name: "auth".into(),
                base_url: "http://auth-service:3001".into(),
            },
            ServiceConfig {
                name: "seat".into(),
                base_url: "http://seat-reservation-service:3004".into(),
            },
            ServiceConfig {
                name: "local".into(),
                base_url: "http://127.0.0.1:9000".into(),
            },
        ];
        BreakerRegistry::new(&services, settings())
    }

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn one_breaker_per_service() {
        let registry = registry();
        assert_eq!(registry.len(), 3);
        assert!(registry.get("auth").is_some());
        assert!(registry.get("booking").is_none());
    }

    #[test]
    fn resolves_by_exact_base_url() {
        let registry = registry();
        assert_eq!(registry.service_for_target(&url("http://127.0.0.1:9000")), "local");
        assert_eq!(registry.service_for_target(&url("http://127.0.0.1:9000/")), "local");
        assert_eq!(registry.service_for_target(&url("http://127.0.0.1:9001")), UNKNOWN_SERVICE);
    }

    #[test]
    fn resolves_by_host_label() {
        let registry = registry();
        assert_eq!(registry.service_for_target(&url("http://auth-service:4000")), "auth");
        assert_eq!(
            registry.service_for_target(&url("http://auth-service.internal.svc:3001")),
            "auth"
        );
        assert_eq!(
            registry.service_for_target(&url("http://seat-reservation-service:3004")),
            "seat"
        );
        assert_eq!(
            registry.service_for_target(&url("http://billing-service:3009")),
            UNKNOWN_SERVICE
        );
    }

    #[test]
    fn unknown_targets_are_unprotected() {
        let registry = registry();
        let protection = registry.resolve(&url("http://somewhere-else:80"));
        assert!(matches!(protection, Protection::Unprotected));
        assert_eq!(protection.service(), UNKNOWN_SERVICE);
    }

    #[test]
    fn resolve_shares_the_breaker() {
        let registry = registry();
        let Protection::Guarded { service, breaker } = registry.resolve(&url("http://auth-service:3001"))
        else {
            panic!("auth should be guarded");
        };
        assert_eq!(service, "auth");

        breaker.record_failure();
        breaker.record_failure();
        assert_eq!(registry.get("auth").unwrap().state(), CircuitState::Open);

        assert!(registry.reset("auth"));
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert!(!registry.reset("nope"));
    }

    #[test]
    fn snapshots_sorted() {
        let registry = registry();
        let names: Vec<_> = registry.snapshots().into_iter().map(|s| s.service).collect();
        assert_eq!(names, vec!["auth", "local", "seat"]);
    }
}
