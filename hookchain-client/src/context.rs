//! Per-request state carried through the interceptor chains.
//!
//! A [`Context`] is created for every attempt of a logical request. Hooks
//! receive it by mutable reference and change it in place; the transport
//! reads it to build the wire request and the provider stores the
//! [`Response`] on it once one arrives.

use std::fmt;
use std::time::Duration;

use bytes::Bytes;
use http::{HeaderMap, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::ClientError;

/// Identity of a single attempt.
///
/// Fresh for every attempt, so concurrent requests (and the retries of one
/// request) never share cycle-detection state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ContextId(Uuid);

impl ContextId {
    pub(crate) fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Identity of a logical request, shared by all of its retry attempts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RequestId(Uuid);

impl RequestId {
    pub(crate) fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Message encoding requested from the transport.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Encoding {
    /// JSON bodies (`application/json`).
    #[default]
    Json,
    /// Protobuf bodies (`application/proto`).
    Proto,
}

impl Encoding {
    /// The content type announced for this encoding.
    pub fn content_type(&self) -> &'static str {
        match self {
            Encoding::Json => "application/json",
            Encoding::Proto => "application/proto",
        }
    }
}

/// A response as handed back by the transport.
#[derive(Clone, Debug)]
pub struct Response {
    /// HTTP status of the response.
    pub status: StatusCode,
    /// Response headers.
    pub headers: HeaderMap,
    /// Raw response body.
    pub body: Bytes,
}

impl Response {
    /// Create a new response.
    pub fn new(status: StatusCode, headers: HeaderMap, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers,
            body: body.into(),
        }
    }

    /// Create an empty `200 OK` response.
    pub fn ok() -> Self {
        Self::new(StatusCode::OK, HeaderMap::new(), Bytes::new())
    }

    /// Decode the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ClientError> {
        serde_json::from_slice(&self.body)
            .map_err(|e| ClientError::interception(format!("failed to decode response body: {e}")))
    }
}

/// State of one attempt of a logical request.
#[derive(Clone, Debug)]
pub struct Context {
    id: ContextId,
    request_id: RequestId,
    attempt: u32,
    /// Request method.
    pub method: Method,
    /// Path (or procedure) addressed by the request.
    pub path: String,
    /// Free-form metadata, reset for every attempt.
    pub meta: Map<String, Value>,
    /// Request payload.
    pub payload: Value,
    /// Message encoding.
    pub encoding: Encoding,
    /// Request headers.
    pub headers: HeaderMap,
    /// Response, once the transport produced one.
    pub response: Option<Response>,
    timeout: Option<Duration>,
    cancel: Option<CancellationToken>,
    incoming_attempts: Option<u32>,
}

impl Context {
    /// Create a context for the first attempt of a new logical request.
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self::for_attempt(RequestId::new(), 1, method, path.into())
    }

    pub(crate) fn for_attempt(
        request_id: RequestId,
        attempt: u32,
        method: Method,
        path: String,
    ) -> Self {
        Self {
            id: ContextId::new(),
            request_id,
            attempt,
            method,
            path,
            meta: Map::new(),
            payload: Value::Null,
            encoding: Encoding::default(),
            headers: HeaderMap::new(),
            response: None,
            timeout: None,
            cancel: None,
            incoming_attempts: None,
        }
    }

    pub(crate) fn with_limits(
        mut self,
        timeout: Option<Duration>,
        cancel: Option<CancellationToken>,
    ) -> Self {
        self.timeout = timeout;
        self.cancel = cancel;
        self
    }

    /// Identity of this attempt.
    pub fn id(&self) -> ContextId {
        self.id
    }

    /// Identity of the logical request this attempt belongs to.
    pub fn request_id(&self) -> RequestId {
        self.request_id
    }

    /// 1-based attempt number within the logical request.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Timeout applied to every transport call of this attempt.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Token cancelling this attempt, if the caller supplied one.
    pub fn cancel_token(&self) -> Option<&CancellationToken> {
        self.cancel.as_ref()
    }

    /// Returns whether the caller cancelled this attempt.
    pub fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(CancellationToken::is_cancelled)
    }

    /// Number of standard-path entries made by the incoming chain so far.
    ///
    /// `Some` only while an incoming interception is in flight for this
    /// context; `None` before it starts and after it reaches a final state.
    pub fn incoming_attempts(&self) -> Option<u32> {
        self.incoming_attempts
    }

    pub(crate) fn start_incoming(&mut self) {
        self.incoming_attempts = Some(0);
    }

    /// Count one more standard-path entry and return the new total.
    ///
    /// Returns `None` once the total exceeds `limit`. A saturated counter
    /// always counts as exceeded.
    pub(crate) fn enter_standard(&mut self, limit: u32) -> Option<u32> {
        let next = self.incoming_attempts.unwrap_or(0).saturating_add(1);
        self.incoming_attempts = Some(next);
        (next <= limit && next != u32::MAX).then_some(next)
    }

    pub(crate) fn finish_incoming(&mut self) {
        self.incoming_attempts = None;
    }

    /// Returns whether the metadata opts this request into retries.
    pub fn is_retryable_opt_in(&self) -> bool {
        matches!(self.meta.get("retryable"), Some(Value::Bool(true)))
    }

    /// Take the response out of the context.
    pub fn take_response(&mut self) -> Option<Response> {
        self.response.take()
    }
}
