//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request ID, timeout, rate limiting)
//!     → routing (match route → service base URL)
//!     → dispatch.rs (circuit breaker + outbound call)
//!         → request.rs (rewrite path, copy headers, inject identity)
//!         → response.rs (relay backend response or synthesize 429/502/503)
//!     → outcome.rs (classification attached to the response)
//!     → Send to client
//! ```

pub mod dispatch;
pub mod outcome;
pub mod request;
pub mod response;
pub mod server;

pub use dispatch::{Dispatcher, UpstreamFailure};
pub use outcome::Outcome;
pub use request::X_REQUEST_ID;
pub use server::{AppState, GatewayServer};
