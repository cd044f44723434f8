//! Provider builder.
//!
//! Provides a fluent API for configuring and building a [`Provider`].

use std::sync::Arc;
use std::time::Duration;

use http::{HeaderName, HeaderValue};
use serde_json::Value;

use crate::config::RetryPolicy;
use crate::provider::RequestDefaults;
use crate::{ClientError, Encoding, Interceptor, InterceptorManager, Provider, Transport};

/// Builder for creating a [`Provider`].
///
/// Invalid settings are recorded as they are made and reported by
/// [`build`](Self::build), so the chain never panics.
///
/// # Example
///
/// ```ignore
/// use hookchain_client::{HeaderInterceptor, Provider, RetryPolicy};
///
/// let provider = Provider::builder(transport)
///     .with_interceptor(HeaderInterceptor::new("authorization", "Bearer token123"))
///     .header("x-client", "hookchain")
///     .retry_policy(RetryPolicy::aggressive())
///     .use_proto()
///     .build()?;
/// ```
pub struct ProviderBuilder {
    transport: Arc<dyn Transport>,
    interceptors: Vec<Arc<dyn Interceptor>>,
    max_incoming_attempts: Option<u32>,
    retry: RetryPolicy,
    defaults: RequestDefaults,
    error: Option<ClientError>,
}

impl std::fmt::Debug for ProviderBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderBuilder")
            .field("interceptor_count", &self.interceptors.len())
            .field("max_incoming_attempts", &self.max_incoming_attempts)
            .field("retry", &self.retry)
            .field("defaults", &self.defaults)
            .field("error", &self.error)
            .finish()
    }
}

impl ProviderBuilder {
    /// Create a new builder sending through `transport`.
    ///
    /// Retries are disabled until [`auto_retry`](Self::auto_retry) or
    /// [`retry_policy`](Self::retry_policy) is called.
    pub fn new<T: Transport + 'static>(transport: T) -> Self {
        Self {
            transport: Arc::new(transport),
            interceptors: Vec::new(),
            max_incoming_attempts: None,
            retry: RetryPolicy::no_retry(),
            defaults: RequestDefaults::default(),
            error: None,
        }
    }

    /// Add an interceptor.
    ///
    /// Interceptors run in the order they are added, for requests and
    /// responses alike.
    pub fn with_interceptor<I: Interceptor + 'static>(mut self, interceptor: I) -> Self {
        self.interceptors.push(Arc::new(interceptor));
        self
    }

    /// Bound the standard-path entries of one incoming interception.
    ///
    /// Must be positive. Defaults to 10.
    pub fn max_incoming_interceptor_attempts(mut self, limit: u32) -> Self {
        self.max_incoming_attempts = Some(limit);
        self
    }

    /// Set the retry policy.
    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    /// Set the retry budget, keeping the rest of the policy.
    pub fn auto_retry(mut self, retries: u32) -> Self {
        self.retry.max_retries = retries;
        self
    }

    /// Add a header sent with every request.
    pub fn header<K, V>(mut self, name: K, value: V) -> Self
    where
        K: TryInto<HeaderName>,
        V: TryInto<HeaderValue>,
    {
        match (name.try_into(), value.try_into()) {
            (Ok(name), Ok(value)) => {
                self.defaults.headers.insert(name, value);
            }
            _ => self.record(ClientError::configuration("invalid default header")),
        }
        self
    }

    /// Add a metadata entry copied into every request.
    pub fn meta(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.defaults.meta.insert(key.into(), value.into());
        self
    }

    /// Set the timeout applied to each attempt.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.defaults.timeout = Some(timeout);
        self
    }

    /// Use JSON encoding for requests and responses.
    ///
    /// This is the default encoding.
    pub fn use_json(mut self) -> Self {
        self.defaults.encoding = Encoding::Json;
        self
    }

    /// Use protobuf encoding for requests and responses.
    pub fn use_proto(mut self) -> Self {
        self.defaults.encoding = Encoding::Proto;
        self
    }

    fn record(&mut self, error: ClientError) {
        self.error.get_or_insert(error);
    }

    /// Build the provider.
    ///
    /// Fails with [`ClientError::Configuration`] if a header was invalid, the
    /// cycle bound is zero or the retry policy does not validate.
    pub fn build(self) -> Result<Provider, ClientError> {
        if let Some(error) = self.error {
            return Err(error);
        }
        self.retry.validate()?;

        let manager = InterceptorManager::new();
        if let Some(limit) = self.max_incoming_attempts {
            manager.set_max_incoming_interceptor_attempts(limit)?;
        }
        for interceptor in self.interceptors {
            manager.push(interceptor);
        }

        Ok(Provider::from_parts(
            manager,
            self.retry,
            self.transport,
            self.defaults,
        ))
    }
}
