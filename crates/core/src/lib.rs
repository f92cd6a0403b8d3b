//! Foundation crate for the repository summarization engine.
//!
//! Everything that talks to the outside world goes through the pieces in this
//! crate: a shared error taxonomy with transient/permanent classification
//! ([`error`]), an exponential-backoff retry policy ([`retry`]), and a
//! per-dependency circuit breaker ([`breaker`]). The wrapper composes as
//! `call_with_retry(policy, breaker, op)` so callers never stack decorators
//! implicitly.

pub mod breaker;
pub mod error;
pub mod retry;

pub use breaker::{BreakerState, CircuitBreaker};
pub use error::{ApiError, ApiResult, ErrorClass};
pub use retry::{call_with_retry, RetryPolicy};
