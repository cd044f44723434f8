//! Call options for per-request configuration.
//!
//! This module provides [`CallOptions`] for configuring individual requests
//! with a payload, extra headers and metadata, a timeout and a cancellation
//! token. Nothing set here outlives the call it is passed to.

use http::{HeaderMap, HeaderName, HeaderValue};
use serde_json::{Map, Value};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::Encoding;

/// Options for configuring one logical request.
///
/// Values here are layered over the provider's defaults: headers and meta
/// entries replace defaults of the same name, the timeout and encoding
/// override the provider's when set.
///
/// # Example
///
/// ```ignore
/// use hookchain_client::CallOptions;
/// use http::Method;
/// use std::time::Duration;
///
/// let options = CallOptions::new()
///     .timeout(Duration::from_secs(5))
///     .header("authorization", "Bearer token123")
///     .payload(serde_json::json!({ "name": "widget" }));
///
/// let response = provider
///     .send_with_options(Method::POST, "/items", options)
///     .await?;
/// ```
#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    /// Timeout for each attempt of this call.
    pub(crate) timeout: Option<Duration>,
    /// Custom headers for this call.
    pub(crate) headers: HeaderMap,
    /// Metadata entries for this call.
    pub(crate) meta: Map<String, Value>,
    /// Request payload.
    pub(crate) payload: Option<Value>,
    /// Encoding override.
    pub(crate) encoding: Option<Encoding>,
    /// Token aborting the call when cancelled.
    pub(crate) cancel: Option<CancellationToken>,
}

impl CallOptions {
    /// Create new default call options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the timeout applied to each attempt of this call.
    ///
    /// When it elapses the transport is aborted and the attempt fails with
    /// [`ClientError::Timeout`](crate::ClientError::Timeout), which is not
    /// retried by the default predicate.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Get the configured timeout, if any.
    pub fn get_timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Add a custom header for this call.
    ///
    /// # Panics
    ///
    /// Panics if the header name or value is invalid.
    pub fn header<K, V>(mut self, name: K, value: V) -> Self
    where
        K: TryInto<HeaderName>,
        K::Error: std::fmt::Debug,
        V: TryInto<HeaderValue>,
        V::Error: std::fmt::Debug,
    {
        let name = name.try_into().expect("invalid header name");
        let value = value.try_into().expect("invalid header value");
        self.headers.insert(name, value);
        self
    }

    /// Try to add a custom header for this call.
    ///
    /// Returns `None` if the header name or value is invalid.
    pub fn try_header<K, V>(mut self, name: K, value: V) -> Option<Self>
    where
        K: TryInto<HeaderName>,
        V: TryInto<HeaderValue>,
    {
        let name = name.try_into().ok()?;
        let value = value.try_into().ok()?;
        self.headers.insert(name, value);
        Some(self)
    }

    /// Set all custom headers for this call, replacing any existing headers.
    pub fn headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Get a reference to the custom headers.
    pub fn get_headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Get a mutable reference to the custom headers.
    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// Set one metadata entry for this call.
    ///
    /// `"retryable": true` makes a failed attempt eligible for retry whatever
    /// the retry predicate says.
    pub fn meta(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.meta.insert(key.into(), value.into());
        self
    }

    /// Get a reference to the metadata entries.
    pub fn get_meta(&self) -> &Map<String, Value> {
        &self.meta
    }

    /// Set the request payload.
    pub fn payload(mut self, payload: impl Into<Value>) -> Self {
        self.payload = Some(payload.into());
        self
    }

    /// Override the provider's encoding for this call.
    pub fn encoding(mut self, encoding: Encoding) -> Self {
        self.encoding = Some(encoding);
        self
    }

    /// Attach a cancellation token.
    ///
    /// Cancelling it before the request is dispatched or while it is in flight
    /// aborts the call with [`ClientError::Canceled`](crate::ClientError::Canceled).
    /// Cancelling it after the call completed has no effect.
    pub fn cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Get the attached cancellation token, if any.
    pub fn get_cancel_token(&self) -> Option<&CancellationToken> {
        self.cancel.as_ref()
    }
}
