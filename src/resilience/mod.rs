//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Request to backend:
//!     → registry.rs (resolve the target's service and breaker)
//!     → circuit_breaker.rs (refuse fast when open, otherwise run the call)
//!     → outcome recorded: failure counts toward opening, success decays it
//! ```
//!
//! # Design Decisions
//! - One breaker per backend service, created at startup
//! - No retries: each inbound request maps to at most one outbound attempt
//! - Breaker state is local to this gateway instance

pub mod circuit_breaker;
pub mod registry;

pub use circuit_breaker::{BreakerError, BreakerSettings, BreakerSnapshot, CircuitBreaker, CircuitState};
pub use registry::{BreakerRegistry, Protection, UNKNOWN_SERVICE};
