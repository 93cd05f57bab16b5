//! Verified caller identity.
//!
//! Token verification happens in front of the gateway core; whatever performs
//! it attaches an [`Identity`] to the request extensions. The dispatcher
//! forwards it to backends as `X-User-*` headers.

use axum::http::{HeaderMap, HeaderName, HeaderValue};

pub const X_USER_ID: HeaderName = HeaderName::from_static("x-user-id");
pub const X_USER_EMAIL: HeaderName = HeaderName::from_static("x-user-email");
pub const X_USER_ROLE: HeaderName = HeaderName::from_static("x-user-role");

/// Identity of an authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: String,
    pub email: String,
    pub role: String,
}

impl Identity {
    pub fn new(
        user_id: impl Into<String>,
        email: impl Into<String>,
        role: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            email: email.into(),
            role: role.into(),
        }
    }

    /// Set the identity headers, replacing any the client sent.
    ///
    /// Values that are not valid header text are dropped rather than forwarded.
    pub fn apply(&self, headers: &mut HeaderMap) {
        for (name, value) in [
            (X_USER_ID, &self.user_id),
            (X_USER_EMAIL, &self.email),
            (X_USER_ROLE, &self.role),
        ] {
            match HeaderValue::from_str(value) {
                Ok(value) => {
                    headers.insert(name, value);
                }
                Err(_) => {
                    headers.remove(&name);
                    tracing::warn!(header = %name, "Dropping identity header with invalid value");
                }
            }
        }
    }
}

/// Remove client-supplied identity headers.
pub fn strip_identity_headers(headers: &mut HeaderMap) {
    headers.remove(X_USER_ID);
    headers.remove(X_USER_EMAIL);
    headers.remove(X_USER_ROLE);
}
