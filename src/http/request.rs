//! Request handling and transformation.
//!
//! # Responsibilities
//! - Generate unique request IDs (UUID v4)
//! - Rewrite the inbound path for the backend (strip gateway-only prefix)
//! - Prepare the outbound request: method, headers, identity, body stream
//!
//! # Design Decisions
//! - Request ID added as early as possible for tracing
//! - The body is forwarded as a stream, never buffered
//! - `Host` is not copied; the client derives it from the target URI

use axum::{
    body::Body,
    http::{header, request::Parts, HeaderValue, Request, Uri},
};
use tower_http::request_id::{MakeRequestId, RequestId};
use url::Url;
use uuid::Uuid;

use crate::security::identity::{strip_identity_headers, Identity};

pub const X_REQUEST_ID: &str = "x-request-id";

/// Generates `x-request-id` values.
#[derive(Debug, Clone, Copy, Default)]
pub struct MakeRequestUuidV4;

impl MakeRequestId for MakeRequestUuidV4 {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        HeaderValue::from_str(&Uuid::new_v4().to_string())
            .ok()
            .map(RequestId::new)
    }
}

/// Request ID of an inbound request, or `"unknown"`.
pub fn request_id<B>(request: &Request<B>) -> String {
    request
        .headers()
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string()
}

/// Remove a gateway-only prefix from `path`.
///
/// Only whole segments are stripped: with prefix `/api`, `/api/users` becomes
/// `/users` and `/api` becomes `/`, while `/apix` is left alone.
pub fn rewrite_path<'a>(path: &'a str, prefix: &str) -> &'a str {
    if prefix.is_empty() {
        return path;
    }
    match path.strip_prefix(prefix) {
        Some("") => "/",
        Some(rest) if rest.starts_with('/') => rest,
        _ => path,
    }
}

/// Absolute URI on `base` for `path` and optional query.
pub fn target_uri(base: &Url, path: &str, query: Option<&str>) -> Result<Uri, axum::http::Error> {
    let mut uri = String::with_capacity(base.as_str().len() + path.len());
    uri.push_str(base.as_str().trim_end_matches('/'));
    uri.push_str(path);
    if let Some(query) = query.filter(|q| !q.is_empty()) {
        uri.push('?');
        uri.push_str(query);
    }
    Ok(Uri::try_from(uri)?)
}

/// Settings that shape every outbound request.
#[derive(Debug, Clone)]
pub struct Rewrite {
    pub strip_prefix: String,
    pub strip_client_identity: bool,
}

/// Build the request sent to the backend at `base`.
pub fn build_outbound(
    parts: Parts,
    body: Body,
    base: &Url,
    rewrite: &Rewrite,
) -> Result<Request<Body>, axum::http::Error> {
    let path = rewrite_path(parts.uri.path(), &rewrite.strip_prefix);
    let uri = target_uri(base, path, parts.uri.query())?;

    let mut headers = parts.headers;
    headers.remove(header::HOST);

    match parts.extensions.get::<Identity>() {
        Some(identity) => identity.apply(&mut headers),
        None if rewrite.strip_client_identity => strip_identity_headers(&mut headers),
        None => {}
    }

    let mut request = Request::builder().method(parts.method).uri(uri).body(body)?;
    *request.headers_mut() = headers;
    Ok(request)
}
