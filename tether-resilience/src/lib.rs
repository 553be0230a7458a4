//! Resilience patterns for Tether
//!
//! Retry policies with pluggable backoff, and an executor that drives an
//! async operation through them.

pub mod backoff;
pub mod retry;

pub use backoff::{BackoffCalculator, BackoffStrategy};
pub use retry::{RetryError, RetryExecutor, RetryPolicy, Retryable};
