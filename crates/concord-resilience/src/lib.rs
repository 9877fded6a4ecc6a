//! Resilience primitives (C8): per-project circuit breakers, per-tracker
//! token-bucket rate limiters, a subprocess concurrency limiter for the
//! Beads CLI, and the fixed inter-call API delay (§4.8).
//!
//! Grounded on `at_harness::circuit_breaker` and `at_harness::rate_limiter`,
//! generalized from a single global instance to a keyed registry (project
//! identifier or tracker name) since one project's or tracker's failures
//! must not trip breakers belonging to any other.

pub mod circuit_breaker;
pub mod delay;
pub mod rate_limiter;
pub mod subprocess;

pub use circuit_breaker::{CircuitBreakerConfig, CircuitBreakerError, CircuitBreakerRegistry, CircuitState};
pub use delay::api_delay;
pub use rate_limiter::{RateLimitConfig, RateLimitError, RateLimiter};
pub use subprocess::SubprocessLimiter;
