//! Request interception pipeline for network service clients.
//!
//! This crate routes every request through an ordered list of
//! [`Interceptor`]s before it reaches a [`Transport`], and every response
//! through the same list on its way back. Interceptors carry the
//! cross-cutting concerns of a client (authentication headers, CSRF tokens,
//! logging) so the transport and the business code stay free of them.
//!
//! ## Features
//!
//! - Outgoing and incoming interceptor chains run in registration order
//! - Rejected responses may be recovered by any interceptor, after which the
//!   incoming chain restarts from the first interceptor
//! - A per-request cycle bound stops interceptors that keep rejecting and
//!   recovering the same response
//! - Whole-request retries with exponential backoff and jitter
//! - Per-call timeouts and cancellation
//!
//! ## Example
//!
//! ```ignore
//! use hookchain_client::{CsrfInterceptor, HeaderInterceptor, Provider, RetryPolicy};
//! use http::Method;
//!
//! let provider = Provider::builder(transport)
//!     .with_interceptor(HeaderInterceptor::new("authorization", "Bearer token123"))
//!     .with_interceptor(CsrfInterceptor::new())
//!     .retry_policy(RetryPolicy::aggressive())
//!     .build()?;
//!
//! let ctx = provider.send(Method::GET, "/items").await?;
//! println!("Status: {}", ctx.response.unwrap().status);
//! ```
//!
//! ## Writing an Interceptor
//!
//! Every hook has a default implementation; override the ones you need.
//!
//! ```ignore
//! use hookchain_client::{BoxFuture, ClientError, Context, Interceptor, Provider};
//!
//! struct RequireJson;
//!
//! impl Interceptor for RequireJson {
//!     fn on_incoming<'a>(
//!         &'a self,
//!         _provider: &'a Provider,
//!         ctx: &'a mut Context,
//!     ) -> BoxFuture<'a, Result<(), ClientError>> {
//!         let is_json = ctx
//!             .response
//!             .as_ref()
//!             .and_then(|r| r.headers.get(http::header::CONTENT_TYPE))
//!             .is_some_and(|v| v.as_bytes().starts_with(b"application/json"));
//!         Box::pin(async move {
//!             if is_json {
//!                 Ok(())
//!             } else {
//!                 Err(ClientError::interception("expected a JSON response"))
//!             }
//!         })
//!     }
//! }
//! ```
//!
//! ## Retries
//!
//! Retries are off by default. Enable them with
//! [`ProviderBuilder::auto_retry`] or a full [`RetryPolicy`]. A retry
//! re-runs the whole cycle with a fresh [`Context`]: attempts share a
//! [`RequestId`] but each gets its own [`ContextId`].
//!
//! ## Cancellation
//!
//! Attach a [`CancellationToken`](tokio_util::sync::CancellationToken) with
//! [`CallOptions::cancel_token`]:
//!
//! - cancelled before dispatch: interceptors are notified through
//!   `on_outgoing_canceled` and the transport is never called
//! - cancelled while the transport is working: [`Transport::abort`] is called,
//!   then interceptors are notified
//! - cancelled after the call returned: nothing happens
//!
//! ### Error Codes
//!
//! - [`Code::Canceled`] - The request was cancelled
//! - [`Code::DeadlineExceeded`] - The timeout was exceeded

mod builder;
pub mod config;
mod context;
mod error;
pub mod interceptor;
mod manager;
mod provider;
pub mod transport;

#[cfg(test)]
mod test_support;

pub use builder::ProviderBuilder;
pub use context::{Context, ContextId, Encoding, RequestId, Response};
pub use error::ClientError;
pub use manager::InterceptorManager;
pub use provider::Provider;

// Re-export from config module
pub use config::{defaults, CallOptions, ExponentialBackoff, RetryAttempt, RetryPolicy};

// Re-export from interceptor module
pub use interceptor::{
    BoxFuture, CsrfInterceptor, HeaderInterceptor, Interceptor, TracingInterceptor,
};

pub use transport::Transport;

// Re-export core types that users need
pub use hookchain_core::Code;
