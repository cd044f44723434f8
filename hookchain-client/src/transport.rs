//! Transport boundary of the pipeline.
//!
//! The pipeline never touches the network itself. A [`Transport`] turns a
//! fully intercepted [`Context`] into a [`Response`]; connection pooling,
//! TLS and wire framing are its business.
//!
//! # Contract
//!
//! - [`send`](Transport::send) may suspend and may fail. A response with a
//!   non-success status is still a response: return it with `Ok` and the
//!   provider routes it down the rejected path.
//! - [`abort`](Transport::abort) interrupts an in-flight `send` for the same
//!   context. It must be idempotent and must tolerate being called for a
//!   context whose send already finished.
//!
//! # Example
//!
//! ```ignore
//! use hookchain_client::{BoxFuture, ClientError, Context, Response, Transport};
//!
//! struct Loopback;
//!
//! impl Transport for Loopback {
//!     fn send<'a>(&'a self, ctx: &'a Context) -> BoxFuture<'a, Result<Response, ClientError>> {
//!         let body = serde_json::to_vec(&ctx.payload).unwrap_or_default();
//!         Box::pin(async move { Ok(Response::new(http::StatusCode::OK, ctx.headers.clone(), body)) })
//!     }
//! }
//! ```

use std::sync::Arc;

use crate::interceptor::BoxFuture;
use crate::{ClientError, Context, Response};

/// Sends intercepted requests.
pub trait Transport: Send + Sync {
    /// Send the request described by `ctx`.
    fn send<'a>(&'a self, ctx: &'a Context) -> BoxFuture<'a, Result<Response, ClientError>>;

    /// Interrupt an in-flight [`send`](Self::send) for `ctx`.
    ///
    /// The default does nothing, which is correct for transports whose
    /// in-flight work is released by dropping the `send` future.
    fn abort<'a>(&'a self, ctx: &'a Context, reason: &'a ClientError) -> BoxFuture<'a, ()> {
        let _ = (ctx, reason);
        Box::pin(async {})
    }
}

impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn send<'a>(&'a self, ctx: &'a Context) -> BoxFuture<'a, Result<Response, ClientError>> {
        (**self).send(ctx)
    }

    fn abort<'a>(&'a self, ctx: &'a Context, reason: &'a ClientError) -> BoxFuture<'a, ()> {
        (**self).abort(ctx, reason)
    }
}
