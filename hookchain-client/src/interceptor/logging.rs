//! Request logging through `tracing`.

use tracing::{debug, warn};

use super::{BoxFuture, Interceptor};
use crate::{ClientError, Context, Provider};

/// Logs every hook invocation.
///
/// Outgoing requests and successful responses are logged at `DEBUG`;
/// rejections, cancellations and failed requests at `WARN`. Register it first
/// to see requests before other interceptors change them.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingInterceptor;

impl TracingInterceptor {
    pub fn new() -> Self {
        Self
    }
}

impl Interceptor for TracingInterceptor {
    fn name(&self) -> &str {
        "tracing"
    }

    fn on_outgoing<'a>(
        &'a self,
        _provider: &'a Provider,
        ctx: &'a mut Context,
    ) -> BoxFuture<'a, Result<(), ClientError>> {
        debug!(
            context.id = %ctx.id(),
            attempt = ctx.attempt(),
            http.method = %ctx.method,
            http.path = %ctx.path,
            "sending request"
        );
        Box::pin(async { Ok(()) })
    }

    fn on_outgoing_canceled<'a>(
        &'a self,
        _provider: &'a Provider,
        ctx: &'a Context,
        error: &'a ClientError,
    ) -> BoxFuture<'a, Result<(), ClientError>> {
        warn!(context.id = %ctx.id(), error = %error, "request canceled before completion");
        Box::pin(async { Ok(()) })
    }

    fn on_incoming<'a>(
        &'a self,
        _provider: &'a Provider,
        ctx: &'a mut Context,
    ) -> BoxFuture<'a, Result<(), ClientError>> {
        debug!(
            context.id = %ctx.id(),
            incoming.attempt = ctx.incoming_attempts().unwrap_or_default(),
            http.status = ctx.response.as_ref().map(|r| r.status.as_u16()),
            "received response"
        );
        Box::pin(async { Ok(()) })
    }

    fn on_incoming_rejected<'a>(
        &'a self,
        _provider: &'a Provider,
        ctx: &'a mut Context,
        error: ClientError,
    ) -> BoxFuture<'a, Result<(), ClientError>> {
        warn!(context.id = %ctx.id(), error = %error, "response rejected");
        Box::pin(async move { Err(error) })
    }

    fn on_incoming_final<'a>(
        &'a self,
        _provider: &'a Provider,
        ctx: &'a Context,
        error: Option<&'a ClientError>,
    ) -> BoxFuture<'a, Result<(), ClientError>> {
        match error {
            Some(error) => warn!(context.id = %ctx.id(), error = %error, "request failed"),
            None => debug!(context.id = %ctx.id(), "request completed"),
        }
        Box::pin(async { Ok(()) })
    }
}
