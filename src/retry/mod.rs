//! Retry policy for failed feature attempts.

mod strategy;
mod types;

pub use strategy::{keys, RetryRequest, RetryStrategy, NON_RETRYABLE_MARKERS};
pub use types::{
    AttemptSnapshot, FailureType, RetryConfig, TestFailureContext, TestProgressionTracker,
    DEFAULT_MAX_RETRIES, DEFAULT_MAX_TEST_HINTS,
};
