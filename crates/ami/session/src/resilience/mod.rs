//! Reconnect resilience: backoff schedule and circuit breaker.

pub mod backoff;
pub mod circuit_breaker;

pub use backoff::ExponentialBackoff;
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
