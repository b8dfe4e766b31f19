//! Resilience patterns for retrieval
//!
//! - Circuit breaker per strategy
//! - Fallback chain over the strategies in priority order

mod circuit_breaker;
mod fallback;

pub use circuit_breaker::{BreakerSnapshot, CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use fallback::{ChainOutcome, FallbackChain};
