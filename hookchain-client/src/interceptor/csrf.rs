//! CSRF token capture and replay.

use std::sync::{PoisonError, RwLock};

use hookchain_core::is_safe;
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};

use super::{BoxFuture, Interceptor};
use crate::{ClientError, Context, Provider};

/// Default header carrying the token in both directions.
pub const DEFAULT_CSRF_HEADER: &str = "x-csrf-token";

/// Captures a CSRF token from responses and attaches it to unsafe requests.
///
/// - `on_outgoing`: adds the cached token to `POST`, `PUT`, `PATCH` and
///   `DELETE` requests.
/// - `on_incoming`: caches the token if the response carries one.
/// - `on_incoming_rejected`: when an unsafe request was refused with `403`
///   and the refusal carries a token different from the one sent, caches it
///   and re-sends the request once with [`Provider::resend`], under the
///   attempt's timeout and cancellation token.
///
/// The cached token is shared by every request going through this instance;
/// concurrent responses overwrite each other and the last one wins.
#[derive(Debug)]
pub struct CsrfInterceptor {
    header: HeaderName,
    token: RwLock<Option<HeaderValue>>,
}

impl Default for CsrfInterceptor {
    fn default() -> Self {
        Self::new()
    }
}

impl CsrfInterceptor {
    /// Create an interceptor using the `x-csrf-token` header.
    pub fn new() -> Self {
        Self::with_header(HeaderName::from_static(DEFAULT_CSRF_HEADER))
    }

    /// Create an interceptor using a custom header.
    pub fn with_header(header: HeaderName) -> Self {
        Self {
            header,
            token: RwLock::new(None),
        }
    }

    /// The currently cached token.
    pub fn token(&self) -> Option<HeaderValue> {
        self.token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replace the cached token.
    pub fn set_token(&self, token: Option<HeaderValue>) {
        *self.token.write().unwrap_or_else(PoisonError::into_inner) = token;
    }

    fn capture(&self, headers: &HeaderMap) {
        if let Some(token) = headers.get(&self.header) {
            self.set_token(Some(token.clone()));
        }
    }
}

impl Interceptor for CsrfInterceptor {
    fn name(&self) -> &str {
        "csrf"
    }

    fn on_outgoing<'a>(
        &'a self,
        _provider: &'a Provider,
        ctx: &'a mut Context,
    ) -> BoxFuture<'a, Result<(), ClientError>> {
        if !is_safe(&ctx.method) {
            if let Some(token) = self.token() {
                ctx.headers.insert(self.header.clone(), token);
            }
        }
        Box::pin(async { Ok(()) })
    }

    fn on_incoming<'a>(
        &'a self,
        _provider: &'a Provider,
        ctx: &'a mut Context,
    ) -> BoxFuture<'a, Result<(), ClientError>> {
        if let Some(response) = &ctx.response {
            self.capture(&response.headers);
        }
        Box::pin(async { Ok(()) })
    }

    fn on_incoming_rejected<'a>(
        &'a self,
        provider: &'a Provider,
        ctx: &'a mut Context,
        error: ClientError,
    ) -> BoxFuture<'a, Result<(), ClientError>> {
        Box::pin(async move {
            if is_safe(&ctx.method) || error.http_status() != Some(StatusCode::FORBIDDEN) {
                return Err(error);
            }
            let fresh = ctx
                .response
                .as_ref()
                .and_then(|response| response.headers.get(&self.header))
                .cloned();
            let Some(fresh) = fresh else {
                return Err(error);
            };
            // Re-sending the token that was just refused cannot succeed.
            if ctx.headers.get(&self.header) == Some(&fresh) {
                return Err(error);
            }

            self.set_token(Some(fresh.clone()));
            ctx.headers.insert(self.header.clone(), fresh);

            let response = provider.resend(ctx).await?;
            let status = response.status;
            ctx.response = Some(response);
            if status.is_success() {
                Ok(())
            } else {
                Err(ClientError::status(status))
            }
        })
    }
}
