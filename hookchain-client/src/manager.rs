//! Orchestration of the outgoing and incoming interceptor chains.
//!
//! The incoming side is a small state machine:
//!
//! ```text
//!            error supplied
//!   start ─────────────────────────────┐
//!     │ no error                       ▼
//!     ▼          hook fails       ┌──────────┐  every hook fails
//! ┌──────────┐ ─────────────────▶ │ Rejected │ ─────────────────▶ FinalFailure
//! │ Standard │                    └──────────┘
//! └──────────┘ ◀───────────────────────┘ a hook recovers
//!     │ all hooks pass     │ entries > limit
//!     ▼                    ▼
//! FinalSuccess        FinalFailure (CycleExceeded)
//! ```
//!
//! A rejected response may be "recovered" by one interceptor only to be
//! rejected again by another, forever. Every entry into `Standard` is counted
//! on the request's [`Context`] and the chain fails with
//! [`ClientError::CycleExceeded`] once the count passes the configured limit.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use tracing::{debug, warn};

use crate::config::defaults;
use crate::{ClientError, Context, Interceptor, Provider};

enum IncomingState {
    Standard,
    Rejected(ClientError),
    FinalSuccess,
    FinalFailure(ClientError),
}

/// Runs requests and responses through an ordered list of interceptors.
///
/// Owned by a [`Provider`] and shared with its forks.
pub struct InterceptorManager {
    interceptors: RwLock<Vec<Arc<dyn Interceptor>>>,
    max_incoming_attempts: AtomicU32,
}

impl std::fmt::Debug for InterceptorManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterceptorManager")
            .field("count", &self.len())
            .field(
                "max_incoming_interceptor_attempts",
                &self.max_incoming_interceptor_attempts(),
            )
            .finish()
    }
}

impl Default for InterceptorManager {
    fn default() -> Self {
        Self::new()
    }
}

impl InterceptorManager {
    /// Create a manager with no interceptors and the default cycle bound.
    pub fn new() -> Self {
        Self {
            interceptors: RwLock::new(Vec::new()),
            max_incoming_attempts: AtomicU32::new(defaults::MAX_INCOMING_INTERCEPTOR_ATTEMPTS),
        }
    }

    /// Append an interceptor. Registration order is execution order.
    pub fn push(&self, interceptor: Arc<dyn Interceptor>) {
        self.interceptors
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(interceptor);
    }

    /// Get the number of registered interceptors.
    pub fn len(&self) -> usize {
        self.interceptors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Check if no interceptor is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of the registered interceptors, in order.
    ///
    /// Each chain run works on its own snapshot, so registering an
    /// interceptor never affects a request already in flight.
    pub fn interceptors(&self) -> Vec<Arc<dyn Interceptor>> {
        self.interceptors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Maximum number of standard-path entries per incoming interception.
    pub fn max_incoming_interceptor_attempts(&self) -> u32 {
        self.max_incoming_attempts.load(Ordering::Relaxed)
    }

    /// Set the cycle bound. Zero is rejected.
    pub fn set_max_incoming_interceptor_attempts(&self, limit: u32) -> Result<(), ClientError> {
        if limit == 0 {
            return Err(ClientError::configuration(
                "max_incoming_interceptor_attempts must be a positive integer",
            ));
        }
        self.max_incoming_attempts.store(limit, Ordering::Relaxed);
        Ok(())
    }

    /// Run `on_outgoing` on every interceptor, in order.
    ///
    /// If a hook fails, every interceptor is notified through
    /// `on_outgoing_canceled` and the hook's error is returned. Outgoing
    /// failures are never recovered.
    pub async fn intercept_outgoing(
        &self,
        provider: &Provider,
        ctx: &mut Context,
    ) -> Result<(), ClientError> {
        let interceptors = self.interceptors();
        for interceptor in &interceptors {
            if let Err(err) = interceptor.on_outgoing(provider, ctx).await {
                debug!(
                    context.id = %ctx.id(),
                    interceptor = interceptor.name(),
                    error = %err,
                    "outgoing interceptor failed"
                );
                notify_outgoing_canceled(&interceptors, provider, ctx, &err).await;
                return Err(err);
            }
        }
        Ok(())
    }

    /// Notify every interceptor that the request will not complete.
    pub async fn cancel_outgoing(&self, provider: &Provider, ctx: &Context, error: &ClientError) {
        notify_outgoing_canceled(&self.interceptors(), provider, ctx, error).await;
    }

    /// Run the incoming chain for a response, or for a transport failure
    /// when `error` is set.
    ///
    /// Returns once the chain settles; `on_incoming_final` has then been
    /// called exactly once on every interceptor and
    /// [`Context::incoming_attempts`] is cleared.
    pub async fn intercept_incoming(
        &self,
        provider: &Provider,
        ctx: &mut Context,
        error: Option<ClientError>,
    ) -> Result<(), ClientError> {
        let interceptors = self.interceptors();
        let limit = self.max_incoming_interceptor_attempts();

        ctx.start_incoming();
        let mut state = match error {
            None => IncomingState::Standard,
            Some(err) => IncomingState::Rejected(err),
        };

        let outcome = loop {
            state = match state {
                IncomingState::Standard => {
                    intercept_incoming_standard(&interceptors, limit, provider, ctx).await
                }
                IncomingState::Rejected(err) => {
                    intercept_incoming_rejected(&interceptors, provider, ctx, err).await
                }
                IncomingState::FinalSuccess => break Ok(()),
                IncomingState::FinalFailure(err) => break Err(err),
            };
        };

        intercept_incoming_final(&interceptors, provider, ctx, outcome.as_ref().err()).await;
        outcome
    }
}

async fn notify_outgoing_canceled(
    interceptors: &[Arc<dyn Interceptor>],
    provider: &Provider,
    ctx: &Context,
    error: &ClientError,
) {
    for interceptor in interceptors {
        if let Err(hook_err) = interceptor.on_outgoing_canceled(provider, ctx, error).await {
            warn!(
                context.id = %ctx.id(),
                interceptor = interceptor.name(),
                error = %hook_err,
                "on_outgoing_canceled failed"
            );
        }
    }
}

async fn intercept_incoming_standard(
    interceptors: &[Arc<dyn Interceptor>],
    limit: u32,
    provider: &Provider,
    ctx: &mut Context,
) -> IncomingState {
    let Some(entry) = ctx.enter_standard(limit) else {
        warn!(context.id = %ctx.id(), limit, "incoming interceptor cycle limit exceeded");
        return IncomingState::FinalFailure(ClientError::CycleExceeded { limit });
    };

    for interceptor in interceptors {
        if let Err(err) = interceptor.on_incoming(provider, ctx).await {
            debug!(
                context.id = %ctx.id(),
                entry,
                interceptor = interceptor.name(),
                error = %err,
                "incoming interceptor rejected response"
            );
            return IncomingState::Rejected(err);
        }
    }
    IncomingState::FinalSuccess
}

async fn intercept_incoming_rejected(
    interceptors: &[Arc<dyn Interceptor>],
    provider: &Provider,
    ctx: &mut Context,
    error: ClientError,
) -> IncomingState {
    let mut current = error;
    for interceptor in interceptors {
        match interceptor.on_incoming_rejected(provider, ctx, current).await {
            Ok(()) => {
                debug!(
                    context.id = %ctx.id(),
                    interceptor = interceptor.name(),
                    "interceptor recovered rejected response"
                );
                return IncomingState::Standard;
            }
            Err(err) => current = err,
        }
    }
    IncomingState::FinalFailure(current)
}

async fn intercept_incoming_final(
    interceptors: &[Arc<dyn Interceptor>],
    provider: &Provider,
    ctx: &mut Context,
    error: Option<&ClientError>,
) {
    ctx.finish_incoming();
    let ctx = &*ctx;
    for interceptor in interceptors {
        if let Err(hook_err) = interceptor.on_incoming_final(provider, ctx, error).await {
            warn!(
                context.id = %ctx.id(),
                interceptor = interceptor.name(),
                error = %hook_err,
                "on_incoming_final failed"
            );
        }
    }
}
