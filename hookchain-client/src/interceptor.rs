//! Interceptors for the request pipeline.
//!
//! Interceptors add cross-cutting logic to every request a [`Provider`]
//! sends, such as:
//! - Adding authentication headers
//! - Capturing and replaying CSRF tokens
//! - Logging
//! - Recovering from rejected responses
//!
//! Interceptors run in registration order on both the outgoing and the
//! incoming side; the order is never reversed for responses.
//!
//! # Example
//!
//! ```ignore
//! use hookchain_client::{HeaderInterceptor, Provider};
//!
//! let provider = Provider::builder(transport)
//!     .with_interceptor(HeaderInterceptor::new("authorization", "Bearer token123"))
//!     .build()?;
//! ```
//!
//! # Shared state
//!
//! A single interceptor instance sees every request of every provider it is
//! registered with, including forks. State kept on the instance (a cached
//! token, a counter) is therefore shared across requests on purpose. Hooks run
//! one step at a time, so each read or write of that state is atomic, but two
//! concurrent requests may still interleave their updates: the last write
//! wins.

mod csrf;
mod logging;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use http::{HeaderName, HeaderValue};

use crate::{ClientError, Context, Provider};

pub use csrf::{CsrfInterceptor, DEFAULT_CSRF_HEADER};
pub use logging::TracingInterceptor;

/// Type alias for a boxed future returning a result.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A set of hooks applied to every request and response.
///
/// Every method has a default implementation, so an interceptor only
/// overrides the hooks it needs. Hooks receive the [`Provider`] that issued
/// the request, which gives access to its transport and configuration.
pub trait Interceptor: Send + Sync {
    /// Name used in log output.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Called before the request is handed to the transport.
    ///
    /// Returning an error aborts the send; every interceptor is then notified
    /// through [`on_outgoing_canceled`](Self::on_outgoing_canceled).
    fn on_outgoing<'a>(
        &'a self,
        provider: &'a Provider,
        ctx: &'a mut Context,
    ) -> BoxFuture<'a, Result<(), ClientError>> {
        let _ = (provider, ctx);
        Box::pin(async { Ok(()) })
    }

    /// Called when the outgoing chain failed or the request was aborted.
    ///
    /// Notification only: an error returned here is logged and otherwise
    /// ignored.
    fn on_outgoing_canceled<'a>(
        &'a self,
        provider: &'a Provider,
        ctx: &'a Context,
        error: &'a ClientError,
    ) -> BoxFuture<'a, Result<(), ClientError>> {
        let _ = (provider, ctx, error);
        Box::pin(async { Ok(()) })
    }

    /// Called with a successfully received response.
    ///
    /// Returning an error sends the request down the rejected path, with the
    /// context as mutated up to this point.
    fn on_incoming<'a>(
        &'a self,
        provider: &'a Provider,
        ctx: &'a mut Context,
    ) -> BoxFuture<'a, Result<(), ClientError>> {
        let _ = (provider, ctx);
        Box::pin(async { Ok(()) })
    }

    /// Called with a rejected response, to attempt recovery.
    ///
    /// `Ok(())` means the interceptor recovered: the incoming chain restarts
    /// from the first interceptor with the context as left by this hook. An
    /// error means it could not, and the next interceptor gets a chance with
    /// that error. The default passes `error` on unchanged.
    fn on_incoming_rejected<'a>(
        &'a self,
        provider: &'a Provider,
        ctx: &'a mut Context,
        error: ClientError,
    ) -> BoxFuture<'a, Result<(), ClientError>> {
        let _ = (provider, ctx);
        Box::pin(async move { Err(error) })
    }

    /// Called exactly once per incoming interception, after it settled.
    ///
    /// `error` is set when the request failed. Notification only: an error
    /// returned here is logged and otherwise ignored.
    fn on_incoming_final<'a>(
        &'a self,
        provider: &'a Provider,
        ctx: &'a Context,
        error: Option<&'a ClientError>,
    ) -> BoxFuture<'a, Result<(), ClientError>> {
        let _ = (provider, ctx, error);
        Box::pin(async { Ok(()) })
    }
}

impl<T: Interceptor + ?Sized> Interceptor for Arc<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn on_outgoing<'a>(
        &'a self,
        provider: &'a Provider,
        ctx: &'a mut Context,
    ) -> BoxFuture<'a, Result<(), ClientError>> {
        (**self).on_outgoing(provider, ctx)
    }

    fn on_outgoing_canceled<'a>(
        &'a self,
        provider: &'a Provider,
        ctx: &'a Context,
        error: &'a ClientError,
    ) -> BoxFuture<'a, Result<(), ClientError>> {
        (**self).on_outgoing_canceled(provider, ctx, error)
    }

    fn on_incoming<'a>(
        &'a self,
        provider: &'a Provider,
        ctx: &'a mut Context,
    ) -> BoxFuture<'a, Result<(), ClientError>> {
        (**self).on_incoming(provider, ctx)
    }

    fn on_incoming_rejected<'a>(
        &'a self,
        provider: &'a Provider,
        ctx: &'a mut Context,
        error: ClientError,
    ) -> BoxFuture<'a, Result<(), ClientError>> {
        (**self).on_incoming_rejected(provider, ctx, error)
    }

    fn on_incoming_final<'a>(
        &'a self,
        provider: &'a Provider,
        ctx: &'a Context,
        error: Option<&'a ClientError>,
    ) -> BoxFuture<'a, Result<(), ClientError>> {
        (**self).on_incoming_final(provider, ctx, error)
    }
}

/// A simple interceptor that adds a header to all requests.
///
/// # Example
///
/// ```ignore
/// use hookchain_client::HeaderInterceptor;
///
/// let auth = HeaderInterceptor::new("authorization", "Bearer token123");
/// let provider = Provider::builder(transport)
///     .with_interceptor(auth)
///     .build()?;
/// ```
#[derive(Clone, Debug)]
pub struct HeaderInterceptor {
    name: HeaderName,
    value: HeaderValue,
}

impl HeaderInterceptor {
    /// Create a new header interceptor.
    ///
    /// # Panics
    ///
    /// Panics if the header name or value is invalid.
    pub fn new(name: &str, value: &str) -> Self {
        Self {
            name: name.parse().expect("invalid header name"),
            value: value.parse().expect("invalid header value"),
        }
    }

    /// Try to create a new header interceptor, returning an error if invalid.
    pub fn try_new(name: &str, value: &str) -> Result<Self, ClientError> {
        let name = name
            .parse()
            .map_err(|_| ClientError::configuration(format!("invalid header name: {}", name)))?;
        let value = value
            .parse()
            .map_err(|_| ClientError::configuration(format!("invalid header value: {}", value)))?;
        Ok(Self { name, value })
    }

    /// Create a new header interceptor from pre-parsed values.
    pub fn from_parts(name: HeaderName, value: HeaderValue) -> Self {
        Self { name, value }
    }
}

impl Interceptor for HeaderInterceptor {
    fn name(&self) -> &str {
        "header"
    }

    fn on_outgoing<'a>(
        &'a self,
        _provider: &'a Provider,
        ctx: &'a mut Context,
    ) -> BoxFuture<'a, Result<(), ClientError>> {
        ctx.headers.insert(self.name.clone(), self.value.clone());
        Box::pin(async { Ok(()) })
    }
}
