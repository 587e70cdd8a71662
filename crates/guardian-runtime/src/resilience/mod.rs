//! Resilience for judge calls.
//!
//! Judge calls are never retried within a run. A judge kind that keeps
//! failing is short-circuited by its circuit breaker so later requests stop
//! spending their deadline on it.

mod circuit_breaker;

pub use circuit_breaker::{CircuitBreaker, CircuitState};
