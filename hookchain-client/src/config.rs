//! Configuration modules for the request pipeline.
//!
//! This module contains request-level configuration:
//! - [`CallOptions`]: Per-call payload, headers, meta, timeout and cancellation
//! - [`RetryPolicy`]: Retry behavior with exponential backoff

mod options;
mod retry;

pub use options::CallOptions;
pub use retry::{defaults, ExponentialBackoff, RetryAttempt, RetryPolicy, RetryPredicate};
