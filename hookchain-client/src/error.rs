//! Pipeline error types.
//!
//! This module provides [`ClientError`], the single error type surfaced by
//! interceptors, transports, the interceptor manager and the retry loop.

use std::time::Duration;

use hookchain_core::Code;
use http::StatusCode;

/// Errors produced while running a request through the pipeline.
#[derive(Clone, Debug, thiserror::Error)]
pub enum ClientError {
    /// Invalid configuration: a non-positive cycle bound, an invalid retry
    /// policy, or a retry attempted with a method the policy does not allow.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// An interceptor hook failed.
    #[error("interception error: {0}")]
    Interception(String),

    /// The incoming chain entered its standard path more often than allowed.
    #[error("incoming interceptor chain exceeded the limit of {limit} standard-path entries")]
    CycleExceeded { limit: u32 },

    /// The retry budget was consumed. Holds the failure of every attempt,
    /// first attempt first.
    #[error(
        "retry budget exhausted after {} attempts: {}",
        .attempts.len(),
        format_attempts(.attempts)
    )]
    RetryExhausted { attempts: Vec<ClientError> },

    /// The request was aborted by the caller or by an interceptor.
    #[error("request canceled: {0}")]
    Canceled(String),

    /// Transport-level error (connection failed, reset, etc.).
    #[error("transport error: {0}")]
    Transport(String),

    /// The transport received a response with a non-success status.
    #[error("unexpected status {status}{}", format_message(.message))]
    Status {
        status: StatusCode,
        message: Option<String>,
    },

    /// The per-call timeout elapsed before the transport answered.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
}

fn format_attempts(attempts: &[ClientError]) -> String {
    attempts
        .iter()
        .enumerate()
        .map(|(i, err)| format!("[{}] {}", i + 1, err))
        .collect::<Vec<_>>()
        .join("; ")
}

fn format_message(message: &Option<String>) -> String {
    message
        .as_deref()
        .map(|m| format!(": {m}"))
        .unwrap_or_default()
}

impl ClientError {
    /// Create an interception error.
    pub fn interception<S: Into<String>>(message: S) -> Self {
        ClientError::Interception(message.into())
    }

    /// Create a configuration error.
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        ClientError::Configuration(message.into())
    }

    /// Create a transport error.
    pub fn transport<S: Into<String>>(message: S) -> Self {
        ClientError::Transport(message.into())
    }

    /// Create a cancellation error.
    pub fn canceled<S: Into<String>>(reason: S) -> Self {
        ClientError::Canceled(reason.into())
    }

    /// Create a status error without a message.
    pub fn status(status: StatusCode) -> Self {
        ClientError::Status {
            status,
            message: None,
        }
    }

    /// Get the error code.
    ///
    /// - Status: derived from the HTTP status
    /// - Transport: `Unavailable`
    /// - Canceled: `Canceled`
    /// - Timeout: `DeadlineExceeded`
    /// - CycleExceeded / RetryExhausted: `Aborted` / `ResourceExhausted`
    /// - Configuration: `InvalidArgument`
    /// - Interception: `Unknown`
    pub fn code(&self) -> Code {
        match self {
            ClientError::Status { status, .. } => Code::from_http_status(*status),
            ClientError::Transport(_) => Code::Unavailable,
            ClientError::Canceled(_) => Code::Canceled,
            ClientError::Timeout(_) => Code::DeadlineExceeded,
            ClientError::CycleExceeded { .. } => Code::Aborted,
            ClientError::RetryExhausted { .. } => Code::ResourceExhausted,
            ClientError::Configuration(_) => Code::InvalidArgument,
            ClientError::Interception(_) => Code::Unknown,
        }
    }

    /// Get the HTTP status, if this error came from a response.
    pub fn http_status(&self) -> Option<StatusCode> {
        match self {
            ClientError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Returns whether this error is a cancellation.
    pub fn is_canceled(&self) -> bool {
        matches!(self, ClientError::Canceled(_))
    }

    /// Returns whether this error indicates a transient condition that may
    /// be resolved by retrying the whole request.
    ///
    /// Cycle overruns and exhausted retry budgets are terminal and never
    /// retryable, whatever their code.
    ///
    /// # Example
    ///
    /// ```
    /// use hookchain_client::ClientError;
    /// use http::StatusCode;
    ///
    /// assert!(ClientError::status(StatusCode::SERVICE_UNAVAILABLE).is_retryable());
    /// assert!(!ClientError::status(StatusCode::NOT_FOUND).is_retryable());
    ///
    /// // Transport errors map to Unavailable
    /// assert!(ClientError::transport("connection reset").is_retryable());
    /// ```
    pub fn is_retryable(&self) -> bool {
        match self {
            ClientError::CycleExceeded { .. } | ClientError::RetryExhausted { .. } => false,
            other => other.code().is_retryable(),
        }
    }
}
