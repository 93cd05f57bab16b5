//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → rate_limit.rs (per-client token bucket; 429 when empty)
//!     → Pass to routing
//!
//! Outbound request:
//!     → identity.rs (X-User-* headers from the verified identity)
//! ```
//!
//! # Design Decisions
//! - Admission control runs before any routing or backend work
//! - No trust in client input: identity headers come only from the
//!   verified identity

pub mod identity;
pub mod rate_limit;

pub use identity::Identity;
pub use rate_limit::RateLimiter;
