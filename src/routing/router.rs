//! Route lookup.
//!
//! # Responsibilities
//! - Store compiled routes
//! - Look up matching route for request
//! - Return matched route or explicit no-match
//!
//! # Design Decisions
//! - Immutable after construction (thread-safe without locks)
//! - O(n) scan in priority order (acceptable for typical route counts)
//! - Longer prefixes win among equal priorities
//! - Explicit no-match rather than silent default

use std::collections::HashMap;

use axum::body::Body;
use axum::http::{Method, Request};
use url::Url;

use crate::config::{RouteConfig, ServiceConfig};
use crate::routing::matcher::{AndMatcher, Matcher, MethodMatcher, PathPrefixMatcher};

/// A compiled route.
#[derive(Debug)]
pub struct Route {
    pub name: String,
    pub service: String,
    /// Base URL of the service this route forwards to.
    pub target: Url,
    priority: u32,
    prefix_len: usize,
    matcher: AndMatcher,
}

/// Immutable route table.
#[derive(Debug, Default)]
pub struct Router {
    routes: Vec<Route>,
}

impl Router {
    /// Compile routes. Routes naming an unknown service, or a service with an
    /// unparseable base URL, are skipped with a warning.
    pub fn from_config(routes: &[RouteConfig], services: &[ServiceConfig]) -> Self {
        let targets: HashMap<&str, &str> = services
            .iter()
            .map(|s| (s.name.as_str(), s.base_url.as_str()))
            .collect();

        let mut compiled = Vec::with_capacity(routes.len());
        for route in routes {
            let Some(base_url) = targets.get(route.service.as_str()) else {
                tracing::warn!(route = %route.name, service = %route.service, "Route references unknown service, skipping");
                continue;
            };
            let target = match Url::parse(base_url) {
                Ok(url) => url,
                Err(e) => {
                    tracing::warn!(route = %route.name, error = %e, "Invalid service base URL, skipping route");
                    continue;
                }
            };

            let methods = route
                .methods
                .iter()
                .filter_map(|m| Method::from_bytes(m.to_ascii_uppercase().as_bytes()).ok())
                .collect();
            let path = PathPrefixMatcher::new(route.path_prefix.clone());
            let prefix_len = path.prefix().len();

            compiled.push(Route {
                name: route.name.clone(),
                service: route.service.clone(),
                target,
                priority: route.priority,
                prefix_len,
                matcher: AndMatcher::new(vec![Box::new(path), Box::new(MethodMatcher::new(methods))]),
            });
        }

        compiled.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then_with(|| b.prefix_len.cmp(&a.prefix_len))
        });

        tracing::info!(routes = compiled.len(), "Route table compiled");
        Self { routes: compiled }
    }

    /// First route matching the request.
    pub fn match_request(&self, req: &Request<Body>) -> Option<&Route> {
        self.routes.iter().find(|r| r.matcher.matches(req))
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }
}
