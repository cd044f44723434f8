//! Error classification shared by the pipeline and its transports.
//!
//! This module provides:
//! - [`Code`]: the coarse class of a failed request
//! - [`ParseCodeError`]: returned when a code name is not recognised

use std::str::FromStr;

use http::StatusCode;
use serde::{Serialize, Serializer};

/// Classification of a failed request.
///
/// Every error produced by the pipeline maps onto exactly one code. The code
/// decides whether the default retry predicate considers the failure transient.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Code {
    Ok,
    Canceled,
    Unknown,
    InvalidArgument,
    DeadlineExceeded,
    NotFound,
    AlreadyExists,
    PermissionDenied,
    ResourceExhausted,
    FailedPrecondition,
    Aborted,
    Unimplemented,
    Internal,
    Unavailable,
    Unauthenticated,
}

impl Code {
    /// Get the string representation of this code.
    pub fn as_str(&self) -> &'static str {
        match self {
            Code::Ok => "ok",
            Code::Canceled => "canceled",
            Code::Unknown => "unknown",
            Code::InvalidArgument => "invalid_argument",
            Code::DeadlineExceeded => "deadline_exceeded",
            Code::NotFound => "not_found",
            Code::AlreadyExists => "already_exists",
            Code::PermissionDenied => "permission_denied",
            Code::ResourceExhausted => "resource_exhausted",
            Code::FailedPrecondition => "failed_precondition",
            Code::Aborted => "aborted",
            Code::Unimplemented => "unimplemented",
            Code::Internal => "internal",
            Code::Unavailable => "unavailable",
            Code::Unauthenticated => "unauthenticated",
        }
    }

    /// Classify an HTTP response status.
    ///
    /// Success statuses map to [`Code::Ok`]. Unlisted client errors map to
    /// [`Code::InvalidArgument`], unlisted server errors to [`Code::Internal`].
    ///
    /// # Example
    ///
    /// ```
    /// use hookchain_core::Code;
    /// use http::StatusCode;
    ///
    /// assert_eq!(Code::from_http_status(StatusCode::OK), Code::Ok);
    /// assert_eq!(Code::from_http_status(StatusCode::SERVICE_UNAVAILABLE), Code::Unavailable);
    /// assert_eq!(Code::from_http_status(StatusCode::TOO_MANY_REQUESTS), Code::ResourceExhausted);
    /// ```
    pub fn from_http_status(status: StatusCode) -> Self {
        if status.is_success() {
            return Code::Ok;
        }
        match status {
            StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => Code::InvalidArgument,
            StatusCode::UNAUTHORIZED => Code::Unauthenticated,
            StatusCode::FORBIDDEN => Code::PermissionDenied,
            StatusCode::NOT_FOUND | StatusCode::GONE => Code::NotFound,
            StatusCode::REQUEST_TIMEOUT => Code::DeadlineExceeded,
            StatusCode::CONFLICT => Code::Aborted,
            StatusCode::PRECONDITION_FAILED => Code::FailedPrecondition,
            StatusCode::TOO_MANY_REQUESTS => Code::ResourceExhausted,
            StatusCode::NOT_IMPLEMENTED => Code::Unimplemented,
            StatusCode::BAD_GATEWAY
            | StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::GATEWAY_TIMEOUT => Code::Unavailable,
            s if s.is_client_error() => Code::InvalidArgument,
            s if s.is_server_error() => Code::Internal,
            _ => Code::Unknown,
        }
    }

    /// Returns whether this code indicates a transient condition that may
    /// be resolved by retrying.
    ///
    /// The following codes are considered retryable:
    /// - [`Unavailable`](Code::Unavailable): 502/503/504 and transport failures
    /// - [`ResourceExhausted`](Code::ResourceExhausted): rate limited (429)
    /// - [`Aborted`](Code::Aborted): conflicting concurrent update (409)
    ///
    /// [`Internal`](Code::Internal) (500) and
    /// [`DeadlineExceeded`](Code::DeadlineExceeded) (408, timeouts) are not.
    ///
    /// # Example
    ///
    /// ```
    /// use hookchain_core::Code;
    ///
    /// assert!(Code::Unavailable.is_retryable());
    /// assert!(Code::ResourceExhausted.is_retryable());
    /// assert!(!Code::NotFound.is_retryable());
    /// assert!(!Code::InvalidArgument.is_retryable());
    /// ```
    ///
    /// # Note
    ///
    /// A retryable code says nothing about the request itself: only
    /// idempotent methods (see [`is_idempotent`](crate::is_idempotent)) should
    /// be re-sent.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Code::Unavailable | Code::ResourceExhausted | Code::Aborted
        )
    }
}

impl std::fmt::Display for Code {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Code {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

/// Error returned when parsing a [`Code`] from a string fails.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("unknown error code: {0}")]
pub struct ParseCodeError(String);

impl FromStr for Code {
    type Err = ParseCodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ok" => Ok(Code::Ok),
            "canceled" | "cancelled" => Ok(Code::Canceled),
            "unknown" => Ok(Code::Unknown),
            "invalid_argument" => Ok(Code::InvalidArgument),
            "deadline_exceeded" => Ok(Code::DeadlineExceeded),
            "not_found" => Ok(Code::NotFound),
            "already_exists" => Ok(Code::AlreadyExists),
            "permission_denied" => Ok(Code::PermissionDenied),
            "resource_exhausted" => Ok(Code::ResourceExhausted),
            "failed_precondition" => Ok(Code::FailedPrecondition),
            "aborted" => Ok(Code::Aborted),
            "unimplemented" => Ok(Code::Unimplemented),
            "internal" => Ok(Code::Internal),
            "unavailable" => Ok(Code::Unavailable),
            "unauthenticated" => Ok(Code::Unauthenticated),
            other => Err(ParseCodeError(other.to_string())),
        }
    }
}
