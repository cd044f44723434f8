//! Whole-request retry configuration with exponential backoff.
//!
//! A retry re-runs the complete cycle for a request: a fresh [`Context`],
//! the outgoing chain, the transport and the incoming chain. The
//! [`RetryPolicy`] decides whether a failed attempt is re-run and how long to
//! wait before doing so.
//!
//! # Example
//!
//! ```ignore
//! use hookchain_client::{Provider, RetryPolicy};
//! use std::time::Duration;
//!
//! let provider = Provider::builder(transport)
//!     .retry_policy(
//!         RetryPolicy::new()
//!             .max_retries(5)
//!             .base_delay(Duration::from_millis(100)),
//!     )
//!     .build()?;
//! ```
//!
//! # Eligibility
//!
//! A failed attempt is retried when the retry predicate accepts it, or when
//! its metadata carries `"retryable": true`. The default predicate is
//! [`ClientError::is_retryable`]: transport failures and `409`, `429`, `502`,
//! `503` and `504` responses. Cancellations are never retried.
//!
//! `500` and `408` are not retried by default: a `500` usually means the
//! request itself broke the server, and a `408` is a deadline like
//! [`ClientError::Timeout`]. Opt in per request with `"retryable": true`, or
//! install a predicate with [`RetryPolicy::retry_when`].
//!
//! Only methods listed in [`RetryPolicy::methods`] may be re-sent; asking to
//! retry any other method is a configuration error.
//!
//! [`Context`]: crate::Context

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use hookchain_core::IDEMPOTENT_METHODS;
use http::Method;

use crate::ClientError;
use crate::interceptor::BoxFuture;

/// Default configuration values.
pub mod defaults {
    use std::time::Duration;

    /// Default initial delay before the first retry.
    pub const BASE_DELAY: Duration = Duration::from_secs(1);

    /// Default multiplier for exponential backoff.
    pub const MULTIPLIER: f64 = 1.6;

    /// Default jitter factor (0.2 means +/- 20%).
    pub const JITTER: f64 = 0.2;

    /// Default maximum delay between retries.
    pub const MAX_DELAY: Duration = Duration::from_secs(120);

    /// Default maximum number of retry attempts: effectively unbounded.
    pub const MAX_RETRIES: u32 = u32::MAX;

    /// Default bound on standard-path entries of one incoming interception.
    pub const MAX_INCOMING_INTERCEPTOR_ATTEMPTS: u32 = 10;
}

/// A failed attempt, as offered to the retry predicate.
#[derive(Clone, Debug)]
pub struct RetryAttempt {
    /// 1-based number of the attempt that failed.
    pub attempt: u32,
    /// Method of the request.
    pub method: Method,
    /// Path of the request.
    pub path: String,
    /// Why the attempt failed.
    pub error: ClientError,
}

/// Decides whether a failed attempt should be retried.
pub type RetryPredicate = Arc<dyn Fn(RetryAttempt) -> BoxFuture<'static, bool> + Send + Sync>;

/// Configuration for retry behavior.
///
/// # Default Values
///
/// - `base_delay`: 1 second
/// - `multiplier`: 1.6
/// - `jitter`: 0.2 (20%)
/// - `max_delay`: 120 seconds
/// - `max_retries`: unbounded (`u32::MAX`)
/// - `methods`: GET, HEAD, OPTIONS, PUT, DELETE, TRACE
/// - predicate: [`ClientError::is_retryable`]
///
/// # Example
///
/// ```
/// use hookchain_client::RetryPolicy;
/// use std::time::Duration;
///
/// // Use defaults
/// let policy = RetryPolicy::default();
///
/// // Custom configuration
/// let policy = RetryPolicy::new()
///     .max_retries(5)
///     .base_delay(Duration::from_millis(100))
///     .max_delay(Duration::from_secs(30));
/// ```
#[derive(Clone)]
pub struct RetryPolicy {
    /// Initial delay before the first retry.
    pub base_delay: Duration,

    /// Multiplier for exponential backoff. Should be >= 1.0.
    pub multiplier: f64,

    /// Jitter factor for randomizing delays. Value between 0.0 and 1.0.
    /// A value of 0.2 means the actual delay will be within +/- 20% of the calculated delay.
    pub jitter: f64,

    /// Maximum delay between retries. The delay will never exceed this value.
    pub max_delay: Duration,

    /// Maximum number of retry attempts (not counting the initial request).
    pub max_retries: u32,

    /// Methods a request may be retried with.
    pub methods: Vec<Method>,

    predicate: Option<RetryPredicate>,
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("base_delay", &self.base_delay)
            .field("multiplier", &self.multiplier)
            .field("jitter", &self.jitter)
            .field("max_delay", &self.max_delay)
            .field("max_retries", &self.max_retries)
            .field("methods", &self.methods)
            .field("custom_predicate", &self.predicate.is_some())
            .finish()
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: defaults::BASE_DELAY,
            multiplier: defaults::MULTIPLIER,
            jitter: defaults::JITTER,
            max_delay: defaults::MAX_DELAY,
            max_retries: defaults::MAX_RETRIES,
            methods: IDEMPOTENT_METHODS.to_vec(),
            predicate: None,
        }
    }
}

impl RetryPolicy {
    /// Create a new RetryPolicy with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a retry policy that never retries.
    ///
    /// Every request still gets its one attempt.
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    /// Create a retry policy that keeps retrying until the request succeeds
    /// or fails with an ineligible error.
    ///
    /// Same budget as [`RetryPolicy::default`], spelled out.
    pub fn unbounded() -> Self {
        Self {
            max_retries: u32::MAX,
            ..Default::default()
        }
    }

    /// Create a retry policy for aggressive retrying.
    ///
    /// Uses shorter delays suitable for latency-sensitive operations.
    /// - Base delay: 50ms
    /// - Max delay: 1 second
    /// - Max retries: 5
    pub fn aggressive() -> Self {
        Self {
            base_delay: Duration::from_millis(50),
            max_delay: Duration::from_secs(1),
            max_retries: 5,
            ..Default::default()
        }
    }

    /// Create a retry policy for patient retrying.
    ///
    /// Uses longer delays suitable for background operations.
    /// - Base delay: 2 seconds
    /// - Max delay: 5 minutes
    /// - Max retries: 10
    pub fn patient() -> Self {
        Self {
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(300),
            max_retries: 10,
            ..Default::default()
        }
    }

    /// Set the maximum number of retry attempts.
    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the initial delay before the first retry.
    pub fn base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Set the maximum delay between retries.
    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Set the backoff multiplier.
    ///
    /// # Panics
    ///
    /// Panics if `multiplier` is less than 1.0.
    pub fn multiplier(mut self, multiplier: f64) -> Self {
        assert!(multiplier >= 1.0, "multiplier must be >= 1.0");
        self.multiplier = multiplier;
        self
    }

    /// Set the jitter factor.
    ///
    /// # Panics
    ///
    /// Panics if `jitter` is not between 0.0 and 1.0.
    pub fn jitter(mut self, jitter: f64) -> Self {
        assert!(
            (0.0..=1.0).contains(&jitter),
            "jitter must be between 0.0 and 1.0"
        );
        self.jitter = jitter;
        self
    }

    /// Replace the set of methods a request may be retried with.
    pub fn methods<I>(mut self, methods: I) -> Self
    where
        I: IntoIterator<Item = Method>,
    {
        self.methods = methods.into_iter().collect();
        self
    }

    /// Replace the default predicate.
    ///
    /// The predicate may suspend, e.g. to consult a rate limiter.
    ///
    /// # Example
    ///
    /// ```
    /// use hookchain_client::RetryPolicy;
    /// use http::StatusCode;
    ///
    /// let policy = RetryPolicy::new().retry_when(|attempt| async move {
    ///     attempt.error.http_status() == Some(StatusCode::INTERNAL_SERVER_ERROR)
    /// });
    /// ```
    pub fn retry_when<F, Fut>(mut self, predicate: F) -> Self
    where
        F: Fn(RetryAttempt) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = bool> + Send + 'static,
    {
        self.predicate = Some(Arc::new(move |attempt| -> BoxFuture<'static, bool> {
            Box::pin(predicate(attempt))
        }));
        self
    }

    /// Restore the default predicate.
    pub fn retry_when_retryable(mut self) -> Self {
        self.predicate = None;
        self
    }

    /// Validate the policy configuration.
    pub fn validate(&self) -> Result<(), ClientError> {
        if self.base_delay > self.max_delay {
            return Err(ClientError::configuration(
                "base_delay must not exceed max_delay",
            ));
        }
        if self.multiplier < 1.0 {
            return Err(ClientError::configuration("multiplier must be >= 1.0"));
        }
        if !(0.0..=1.0).contains(&self.jitter) {
            return Err(ClientError::configuration(
                "jitter must be between 0.0 and 1.0",
            ));
        }
        if self.max_retries > 0 && self.methods.is_empty() {
            return Err(ClientError::configuration(
                "retries are enabled but no method may be retried",
            ));
        }
        Ok(())
    }

    /// Returns whether a request with `method` may be re-sent.
    pub fn allows_method(&self, method: &Method) -> bool {
        self.methods.contains(method)
    }

    /// Ask the predicate whether `attempt` should be retried.
    pub async fn should_retry(&self, attempt: RetryAttempt) -> bool {
        match &self.predicate {
            Some(predicate) => predicate(attempt).await,
            None => attempt.error.is_retryable(),
        }
    }

    /// Create an ExponentialBackoff iterator from this policy.
    pub fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff::new(self)
    }
}

/// Exponential backoff with jitter.
///
/// Yields increasing sleep durations with randomized jitter.
/// The sequence follows: base * multiplier^attempt with +/- jitter.
///
/// # Example
///
/// ```
/// use hookchain_client::RetryPolicy;
///
/// let policy = RetryPolicy::new().jitter(0.0); // No jitter for predictable output
/// let mut backoff = policy.backoff();
///
/// // First delay is the base delay
/// let delay1 = backoff.next_delay();
/// // Subsequent delays increase exponentially
/// let delay2 = backoff.next_delay();
/// assert!(delay2 > delay1);
/// ```
#[derive(Clone, Debug)]
pub struct ExponentialBackoff {
    multiplier: f64,
    jitter: f64,
    max_delay_secs: f64,
    max_retries: u32,
    /// Current delay without jitter, stored as f64 to avoid rounding errors.
    current_delay_secs: f64,
    /// Number of retries handed out.
    attempts: u32,
}

impl ExponentialBackoff {
    /// Create a new ExponentialBackoff from a RetryPolicy.
    pub fn new(policy: &RetryPolicy) -> Self {
        Self {
            multiplier: policy.multiplier,
            jitter: policy.jitter,
            max_delay_secs: policy.max_delay.as_secs_f64(),
            max_retries: policy.max_retries,
            current_delay_secs: policy.base_delay.as_secs_f64(),
            attempts: 0,
        }
    }

    /// Get the number of retries handed out so far.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Check if more retries are allowed.
    pub fn can_retry(&self) -> bool {
        self.attempts < self.max_retries
    }

    /// Get the next delay duration, applying jitter.
    ///
    /// Returns the delay to wait before the next retry attempt.
    /// Advances the internal state for the next call.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current_delay_secs;

        // Apply jitter: delay * (1 + jitter * random(-1, 1))
        let jittered = if self.jitter > 0.0 {
            let jitter_range = self.jitter * 2.0;
            let random_factor = rand::random::<f64>() * jitter_range - self.jitter;
            delay * (1.0 + random_factor)
        } else {
            delay
        };

        let clamped = jittered.min(self.max_delay_secs);

        self.current_delay_secs = (self.current_delay_secs * self.multiplier).min(self.max_delay_secs);
        self.attempts = self.attempts.saturating_add(1);

        Duration::from_secs_f64(clamped.max(0.0))
    }
}
