//! The request pipeline entry point.
//!
//! A [`Provider`] ties together an [`InterceptorManager`], a [`RetryPolicy`]
//! and a [`Transport`]. Every call to [`Provider::send`] is one logical
//! request:
//!
//! ```text
//! new Context ─▶ intercept_outgoing ─▶ Transport::send ─▶ intercept_incoming
//!      ▲                                                        │
//!      └──────────── retry (backoff, fresh Context) ◀───────────┘ failure
//! ```

use std::fmt;
use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use http::header::CONTENT_TYPE;
use http::{HeaderMap, HeaderName, HeaderValue, Method};
use serde_json::{Map, Value};
use tracing::{debug, info_span, Instrument};

use crate::builder::ProviderBuilder;
use crate::config::{CallOptions, RetryAttempt, RetryPolicy};
use crate::context::RequestId;
use crate::{ClientError, Context, Encoding, Interceptor, InterceptorManager, Response, Transport};

/// Configuration shared by a provider and all of its forks.
struct Shared {
    manager: InterceptorManager,
    retry: RwLock<RetryPolicy>,
    transport: Arc<dyn Transport>,
}

/// Values copied into every new [`Context`]. Owned per provider.
#[derive(Clone, Debug, Default)]
pub(crate) struct RequestDefaults {
    pub(crate) headers: HeaderMap,
    pub(crate) meta: Map<String, Value>,
    pub(crate) encoding: Encoding,
    pub(crate) timeout: Option<Duration>,
}

/// Sends requests through the interceptor chains and the transport.
///
/// Interceptors, the cycle bound and the retry policy are shared with every
/// [`fork`](Self::fork) of a provider; request defaults are not.
///
/// # Example
///
/// ```ignore
/// use hookchain_client::{CsrfInterceptor, Provider};
/// use http::Method;
///
/// let provider = Provider::builder(transport)
///     .with_interceptor(CsrfInterceptor::new())
///     .auto_retry(3)
///     .build()?;
///
/// let ctx = provider.send(Method::GET, "/items").await?;
/// let items: Vec<Item> = ctx.response.unwrap().json()?;
/// ```
pub struct Provider {
    shared: Arc<Shared>,
    defaults: RequestDefaults,
}

impl fmt::Debug for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Provider")
            .field("manager", &self.shared.manager)
            .field("retry", &self.retry_policy())
            .field("defaults", &self.defaults)
            .finish()
    }
}

impl Provider {
    /// Create a provider with no interceptors and retries disabled.
    pub fn new<T: Transport + 'static>(transport: T) -> Self {
        Self::from_parts(
            InterceptorManager::new(),
            RetryPolicy::no_retry(),
            Arc::new(transport),
            RequestDefaults::default(),
        )
    }

    /// Create a [`ProviderBuilder`] for the given transport.
    pub fn builder<T: Transport + 'static>(transport: T) -> ProviderBuilder {
        ProviderBuilder::new(transport)
    }

    pub(crate) fn from_parts(
        manager: InterceptorManager,
        retry: RetryPolicy,
        transport: Arc<dyn Transport>,
        defaults: RequestDefaults,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                manager,
                retry: RwLock::new(retry),
                transport,
            }),
            defaults,
        }
    }

    /// Create a provider sharing this one's interceptors, cycle bound, retry
    /// policy and transport, with its own copy of the request defaults.
    pub fn fork(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            defaults: self.defaults.clone(),
        }
    }

    /// The interceptor manager shared by this provider and its forks.
    pub fn manager(&self) -> &InterceptorManager {
        &self.shared.manager
    }

    /// The transport requests are sent through.
    ///
    /// Calls made on it directly bypass the attempt's timeout and
    /// cancellation; prefer [`resend`](Self::resend) from interceptors.
    pub fn transport(&self) -> &dyn Transport {
        &*self.shared.transport
    }

    /// Append an interceptor. Forks see it too.
    pub fn use_interceptor<I: Interceptor + 'static>(&self, interceptor: I) -> &Self {
        self.shared.manager.push(Arc::new(interceptor));
        self
    }

    /// Set the bound on standard-path entries per incoming interception.
    ///
    /// Zero is rejected with [`ClientError::Configuration`].
    pub fn set_max_incoming_interceptor_attempts(&self, limit: u32) -> Result<(), ClientError> {
        self.shared.manager.set_max_incoming_interceptor_attempts(limit)
    }

    /// Snapshot of the current retry policy.
    pub fn retry_policy(&self) -> RetryPolicy {
        self.shared
            .retry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replace the retry policy after validating it.
    pub fn set_retry_policy(&self, policy: RetryPolicy) -> Result<(), ClientError> {
        policy.validate()?;
        *self.shared.retry.write().unwrap_or_else(PoisonError::into_inner) = policy;
        Ok(())
    }

    /// Set the retry budget: at most `retries` attempts after the first.
    ///
    /// Zero disables retries. The resulting policy is validated like
    /// [`set_retry_policy`](Self::set_retry_policy); on error the current
    /// policy is kept.
    pub fn auto_retry(&self, retries: u32) -> Result<&Self, ClientError> {
        let mut policy = self.shared.retry.write().unwrap_or_else(PoisonError::into_inner);
        let updated = policy.clone().max_retries(retries);
        updated.validate()?;
        *policy = updated;
        Ok(self)
    }

    /// Replace the retry predicate. See [`RetryPolicy::retry_when`].
    pub fn retry_when<F, Fut>(&self, predicate: F) -> &Self
    where
        F: Fn(RetryAttempt) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = bool> + Send + 'static,
    {
        let mut policy = self.shared.retry.write().unwrap_or_else(PoisonError::into_inner);
        *policy = std::mem::take(&mut *policy).retry_when(predicate);
        self
    }

    /// Set a header sent with every request of this provider.
    pub fn set_header<K, V>(&mut self, name: K, value: V) -> Result<&mut Self, ClientError>
    where
        K: TryInto<HeaderName>,
        V: TryInto<HeaderValue>,
    {
        let name = name
            .try_into()
            .map_err(|_| ClientError::configuration("invalid header name"))?;
        let value = value
            .try_into()
            .map_err(|_| ClientError::configuration(format!("invalid value for header {name}")))?;
        self.defaults.headers.insert(name, value);
        Ok(self)
    }

    /// Set a metadata entry copied into every request of this provider.
    pub fn set_meta(&mut self, key: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.defaults.meta.insert(key.into(), value.into());
        self
    }

    /// Set the encoding of requests sent by this provider.
    pub fn set_encoding(&mut self, encoding: Encoding) -> &mut Self {
        self.defaults.encoding = encoding;
        self
    }

    /// Set the timeout applied to each attempt of every request.
    pub fn set_timeout(&mut self, timeout: Duration) -> &mut Self {
        self.defaults.timeout = Some(timeout);
        self
    }

    /// Send a request with the provider's defaults.
    ///
    /// Returns the context of the successful attempt, carrying the response.
    pub async fn send(
        &self,
        method: Method,
        path: impl Into<String>,
    ) -> Result<Context, ClientError> {
        self.send_with_options(method, path, CallOptions::default())
            .await
    }

    /// Send a request with per-call options layered over the defaults.
    pub async fn send_with_options(
        &self,
        method: Method,
        path: impl Into<String>,
        options: CallOptions,
    ) -> Result<Context, ClientError> {
        let path = path.into();
        let request_id = RequestId::new();
        let span = info_span!(
            "hookchain.request",
            http.method = %method,
            http.path = %path,
            request.id = %request_id,
            otel.kind = "client",
        );
        self.run_with_retries(request_id, method, path, options)
            .instrument(span)
            .await
    }

    async fn run_with_retries(
        &self,
        request_id: RequestId,
        method: Method,
        path: String,
        options: CallOptions,
    ) -> Result<Context, ClientError> {
        let policy = self.retry_policy();
        let mut backoff = policy.backoff();
        let mut failures = Vec::new();
        let mut attempt = 1;

        loop {
            let mut ctx = self.new_context(request_id, attempt, &method, &path, &options);
            let err = match self.execute(&mut ctx).await {
                Ok(()) => return Ok(ctx),
                Err(err) => err,
            };

            if err.is_canceled() || policy.max_retries == 0 {
                return Err(err);
            }

            let opted_in = ctx.is_retryable_opt_in();
            let eligible = opted_in
                || policy
                    .should_retry(RetryAttempt {
                        attempt,
                        method: method.clone(),
                        path: path.clone(),
                        error: err.clone(),
                    })
                    .await;
            if !eligible {
                return Err(err);
            }

            if !backoff.can_retry() {
                failures.push(err);
                return Err(ClientError::RetryExhausted { attempts: failures });
            }
            if !policy.allows_method(&method) {
                return Err(ClientError::configuration(format!(
                    "method {method} is not allowed to be retried"
                )));
            }

            let delay = backoff.next_delay();
            debug!(
                error = %err,
                attempt,
                retry = backoff.attempts(),
                delay_ms = delay.as_millis() as u64,
                "retrying request"
            );
            failures.push(err);
            match &options.cancel {
                Some(token) => tokio::select! {
                    _ = token.cancelled() => {
                        return Err(ClientError::canceled("request aborted during retry backoff"));
                    }
                    _ = tokio::time::sleep(delay) => {}
                },
                None => tokio::time::sleep(delay).await,
            }
            attempt += 1;
        }
    }

    /// One attempt: outgoing chain, transport, incoming chain.
    async fn execute(&self, ctx: &mut Context) -> Result<(), ClientError> {
        let manager = &self.shared.manager;

        if ctx.is_cancelled() {
            return self.abort_before_dispatch(ctx).await;
        }
        manager.intercept_outgoing(self, ctx).await?;
        if ctx.is_cancelled() {
            return self.abort_before_dispatch(ctx).await;
        }

        match self.dispatch(ctx).await {
            Ok(response) => {
                let status = response.status;
                ctx.response = Some(response);
                let error = (!status.is_success()).then(|| ClientError::status(status));
                manager.intercept_incoming(self, ctx, error).await
            }
            Err(err) if err.is_canceled() => {
                manager.cancel_outgoing(self, ctx, &err).await;
                Err(err)
            }
            Err(err) => manager.intercept_incoming(self, ctx, Some(err)).await,
        }
    }

    async fn abort_before_dispatch(&self, ctx: &Context) -> Result<(), ClientError> {
        let err = ClientError::canceled("request aborted before dispatch");
        self.shared.manager.cancel_outgoing(self, ctx, &err).await;
        Err(err)
    }

    /// Send `ctx` through the transport again, under the same timeout and
    /// cancellation token as the attempt it belongs to.
    ///
    /// Interceptors use it to re-send a request while recovering from a
    /// rejected response. The transport is aborted when the timeout or the
    /// token fires, and the call fails with [`ClientError::Timeout`] or
    /// [`ClientError::Canceled`].
    pub async fn resend(&self, ctx: &Context) -> Result<Response, ClientError> {
        if ctx.is_cancelled() {
            return Err(ClientError::canceled("request aborted before re-send"));
        }
        self.dispatch(ctx).await
    }

    /// Hand the context to the transport, honoring timeout and cancellation.
    ///
    /// The transport is aborted when either fires.
    async fn dispatch(&self, ctx: &Context) -> Result<Response, ClientError> {
        let transport = &self.shared.transport;
        let timeout = ctx.timeout();
        let cancel = ctx.cancel_token().cloned().unwrap_or_default();

        let send = async {
            match timeout {
                Some(limit) => tokio::time::timeout(limit, transport.send(ctx))
                    .await
                    .unwrap_or_else(|_| Err(ClientError::Timeout(limit))),
                None => transport.send(ctx).await,
            }
        };

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ClientError::canceled("request aborted during flight")),
            result = send => result,
        };

        if let Err(err @ (ClientError::Canceled(_) | ClientError::Timeout(_))) = &result {
            debug!(context.id = %ctx.id(), error = %err, "aborting transport");
            transport.abort(ctx, err).await;
        }
        result
    }

    fn new_context(
        &self,
        request_id: RequestId,
        attempt: u32,
        method: &Method,
        path: &str,
        options: &CallOptions,
    ) -> Context {
        let mut ctx = Context::for_attempt(request_id, attempt, method.clone(), path.to_owned())
            .with_limits(
                options.timeout.or(self.defaults.timeout),
                options.cancel.clone(),
            );
        ctx.encoding = options.encoding.unwrap_or(self.defaults.encoding);

        ctx.headers = self.defaults.headers.clone();
        ctx.headers.extend(options.headers.clone());
        if !ctx.headers.contains_key(CONTENT_TYPE) {
            ctx.headers.insert(
                CONTENT_TYPE,
                HeaderValue::from_static(ctx.encoding.content_type()),
            );
        }

        ctx.meta = self.defaults.meta.clone();
        ctx.meta.extend(options.meta.clone());
        ctx.payload = options.payload.clone().unwrap_or(Value::Null);
        ctx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interceptor::BoxFuture;
    use crate::test_support::{provider, provider_with, EventLog, Recorder, ScriptedTransport};
    use http::StatusCode;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;
    use tokio_util::sync::CancellationToken;

    fn failing(message: &str) -> Result<Response, ClientError> {
        Err(ClientError::transport(message))
    }

    fn fast_retries(retries: u32) -> RetryPolicy {
        RetryPolicy::new()
            .max_retries(retries)
            .base_delay(Duration::from_millis(1))
            .max_delay(Duration::from_millis(5))
            .jitter(0.0)
    }

    #[tokio::test]
    async fn test_send_returns_context_with_response() {
        let transport = Arc::new(ScriptedTransport::scripted([Ok(Response::new(
            StatusCode::OK,
            HeaderMap::new(),
            r#"{"ok":true}"#,
        ))]));
        let provider = provider_with(transport.clone());

        let ctx = provider.send(Method::GET, "/status").await.unwrap();
        let body: Value = ctx.response.as_ref().unwrap().json().unwrap();
        assert_eq!(body["ok"], true);
        assert_eq!(ctx.attempt(), 1);
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn test_defaults_and_options_are_layered() {
        let transport = Arc::new(ScriptedTransport::always_ok());
        let mut provider = provider_with(transport.clone());
        provider
            .set_header("x-tenant", "acme")
            .unwrap()
            .set_header("x-trace", "default")
            .unwrap();
        provider.set_meta("source", "provider");

        let options = CallOptions::new()
            .header("x-trace", "call")
            .meta("call", 1)
            .payload(serde_json::json!({ "name": "widget" }));
        let ctx = provider
            .send_with_options(Method::POST, "/items", options)
            .await
            .unwrap();

        assert_eq!(ctx.headers.get("x-tenant").unwrap(), "acme");
        assert_eq!(ctx.headers.get("x-trace").unwrap(), "call");
        assert_eq!(ctx.headers.get(CONTENT_TYPE).unwrap(), "application/json");
        assert_eq!(ctx.meta.get("source"), Some(&Value::from("provider")));
        assert_eq!(ctx.meta.get("call"), Some(&Value::from(1)));
        assert_eq!(ctx.payload["name"], "widget");
        assert_eq!(transport.sent_headers()[0].get("x-trace").unwrap(), "call");

        // Per-call values do not persist.
        let ctx = provider.send(Method::GET, "/items").await.unwrap();
        assert_eq!(ctx.headers.get("x-trace").unwrap(), "default");
        assert!(ctx.meta.get("call").is_none());
        assert_eq!(ctx.payload, Value::Null);
    }

    #[tokio::test]
    async fn test_encoding_sets_content_type() {
        let mut provider = provider();
        provider.set_encoding(Encoding::Proto);
        let ctx = provider.send(Method::GET, "/").await.unwrap();
        assert_eq!(ctx.encoding, Encoding::Proto);
        assert_eq!(ctx.headers.get(CONTENT_TYPE).unwrap(), "application/proto");

        let ctx = provider
            .send_with_options(
                Method::GET,
                "/",
                CallOptions::new().header(CONTENT_TYPE, "text/plain"),
            )
            .await
            .unwrap();
        assert_eq!(ctx.headers.get(CONTENT_TYPE).unwrap(), "text/plain");
    }

    #[test]
    fn test_set_header_rejects_invalid_values() {
        let mut provider = provider();
        assert!(matches!(
            provider.set_header("bad header", "v"),
            Err(ClientError::Configuration(_))
        ));
        assert!(provider.set_header("x-ok", "bad\nvalue").is_err());
    }

    #[tokio::test]
    async fn test_non_success_status_goes_through_rejected_path() {
        let transport = Arc::new(ScriptedTransport::scripted([Ok(Response::new(
            StatusCode::NOT_FOUND,
            HeaderMap::new(),
            "",
        ))]));
        let provider = provider_with(transport);
        let log = EventLog::default();
        provider.use_interceptor(Recorder::with_log("r", &log));

        let err = provider.send(Method::GET, "/missing").await.unwrap_err();
        assert_eq!(err.http_status(), Some(StatusCode::NOT_FOUND));
        assert_eq!(
            log.events(),
            vec![
                "r:outgoing",
                "r:rejected:unexpected status 404 Not Found",
                "r:final:unexpected status 404 Not Found",
            ]
        );
    }

    #[tokio::test]
    async fn test_retries_are_disabled_by_default() {
        let transport = Arc::new(ScriptedTransport::scripted([failing("down")]));
        let provider = provider_with(transport.clone());

        let err = provider.send(Method::GET, "/").await.unwrap_err();
        assert!(matches!(err, ClientError::Transport(m) if m == "down"));
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn test_retry_then_success_uses_fresh_contexts() {
        let transport = Arc::new(ScriptedTransport::scripted([
            failing("first"),
            failing("second"),
        ]));
        let provider = provider_with(transport.clone());
        provider.set_retry_policy(fast_retries(3)).unwrap();

        #[derive(Default)]
        struct Ids(Mutex<Vec<(String, String)>>);
        impl Interceptor for Ids {
            fn on_outgoing<'a>(
                &'a self,
                _provider: &'a Provider,
                ctx: &'a mut Context,
            ) -> BoxFuture<'a, Result<(), ClientError>> {
                self.0
                    .lock()
                    .unwrap()
                    .push((ctx.id().to_string(), ctx.request_id().to_string()));
                Box::pin(async { Ok(()) })
            }
        }
        let ids = Arc::new(Ids::default());
        provider.use_interceptor(Arc::clone(&ids));

        let ctx = provider.send(Method::GET, "/").await.unwrap();
        assert_eq!(ctx.attempt(), 3);
        assert_eq!(transport.calls(), 3);

        let ids = ids.0.lock().unwrap();
        assert_eq!(ids.len(), 3);
        assert_ne!(ids[0].0, ids[1].0);
        assert_ne!(ids[1].0, ids[2].0);
        assert!(ids.iter().all(|(_, request)| request == &ids[0].1));
    }

    #[tokio::test]
    async fn test_ineligible_failure_is_not_retried() {
        let transport = Arc::new(ScriptedTransport::scripted([Ok(Response::new(
            StatusCode::BAD_REQUEST,
            HeaderMap::new(),
            "",
        ))]));
        let provider = provider_with(transport.clone());
        provider.set_retry_policy(fast_retries(3)).unwrap();

        let err = provider.send(Method::GET, "/").await.unwrap_err();
        assert_eq!(err.http_status(), Some(StatusCode::BAD_REQUEST));
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn test_disallowed_method_is_a_configuration_error() {
        let transport = Arc::new(ScriptedTransport::scripted([failing("down")]));
        let provider = provider_with(transport.clone());
        provider.set_retry_policy(fast_retries(3)).unwrap();

        let err = provider.send(Method::POST, "/orders").await.unwrap_err();
        assert!(matches!(err, ClientError::Configuration(m) if m.contains("POST")));
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn test_meta_opt_in_overrides_predicate() {
        let transport = Arc::new(ScriptedTransport::scripted([Ok(Response::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            HeaderMap::new(),
            "",
        ))]));
        let provider = provider_with(transport.clone());
        provider.set_retry_policy(fast_retries(2)).unwrap();

        let ctx = provider
            .send_with_options(Method::GET, "/", CallOptions::new().meta("retryable", true))
            .await
            .unwrap();
        assert_eq!(ctx.attempt(), 2);
        assert_eq!(transport.calls(), 2);
    }

    #[tokio::test]
    async fn test_custom_predicate_is_consulted() {
        let transport = Arc::new(ScriptedTransport::scripted([Ok(Response::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            HeaderMap::new(),
            "",
        ))]));
        let provider = provider_with(transport.clone());
        provider.set_retry_policy(fast_retries(2)).unwrap();

        let asked = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&asked);
        provider.retry_when(move |attempt| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                attempt.error.http_status() == Some(StatusCode::INTERNAL_SERVER_ERROR)
            }
        });

        provider.send(Method::GET, "/").await.unwrap();
        assert_eq!(asked.load(Ordering::SeqCst), 1);
        assert_eq!(transport.calls(), 2);
    }

    #[tokio::test]
    async fn test_set_retry_policy_validates() {
        let provider = provider();
        let invalid = RetryPolicy::new()
            .base_delay(Duration::from_secs(10))
            .max_delay(Duration::from_secs(1));
        assert!(matches!(
            provider.set_retry_policy(invalid),
            Err(ClientError::Configuration(_))
        ));
        assert_eq!(provider.retry_policy().max_retries, 0);

        provider.auto_retry(4).unwrap();
        assert_eq!(provider.retry_policy().max_retries, 4);
    }

    #[tokio::test]
    async fn test_auto_retry_validates_resulting_policy() {
        let provider = provider();
        provider
            .set_retry_policy(RetryPolicy::no_retry().methods([]))
            .unwrap();

        assert!(matches!(
            provider.auto_retry(3),
            Err(ClientError::Configuration(_))
        ));
        assert_eq!(provider.retry_policy().max_retries, 0);
        assert!(provider.auto_retry(0).is_ok());
    }

    #[tokio::test]
    async fn test_fork_shares_interceptors_but_not_defaults() {
        let mut parent = provider();
        parent.set_meta("scope", "parent");
        let mut child = parent.fork();
        child.set_meta("scope", "child");

        let log = EventLog::default();
        child.use_interceptor(Recorder::with_log("late", &log));
        parent.auto_retry(2).unwrap();

        assert_eq!(parent.manager().len(), 1);
        assert_eq!(child.retry_policy().max_retries, 2);

        let ctx = parent.send(Method::GET, "/").await.unwrap();
        assert_eq!(ctx.meta.get("scope"), Some(&Value::from("parent")));
        let ctx = child.send(Method::GET, "/").await.unwrap();
        assert_eq!(ctx.meta.get("scope"), Some(&Value::from("child")));
        assert_eq!(log.events().iter().filter(|e| *e == "late:outgoing").count(), 2);
    }

    #[tokio::test]
    async fn test_cancel_before_dispatch_skips_transport() {
        let transport = Arc::new(ScriptedTransport::always_ok());
        let provider = provider_with(transport.clone());
        let log = EventLog::default();
        provider.use_interceptor(Recorder::with_log("r", &log));

        let token = CancellationToken::new();
        token.cancel();
        let err = provider
            .send_with_options(Method::GET, "/", CallOptions::new().cancel_token(token))
            .await
            .unwrap_err();

        assert!(err.is_canceled());
        assert_eq!(transport.calls(), 0);
        assert_eq!(transport.aborts(), 0);
        assert_eq!(
            log.events(),
            vec!["r:canceled:request canceled: request aborted before dispatch"]
        );
    }

    #[tokio::test]
    async fn test_cancel_in_flight_aborts_transport() {
        let transport = Arc::new(ScriptedTransport::hanging());
        let provider = provider_with(transport.clone());
        let log = EventLog::default();
        provider.use_interceptor(Recorder::with_log("r", &log));

        let token = CancellationToken::new();
        let trigger = token.clone();
        let canceller = async move {
            tokio::task::yield_now().await;
            trigger.cancel();
        };
        let (result, ()) = tokio::join!(
            provider.send_with_options(Method::GET, "/", CallOptions::new().cancel_token(token)),
            canceller,
        );

        assert!(result.unwrap_err().is_canceled());
        assert_eq!(transport.calls(), 1);
        assert_eq!(transport.aborts(), 1);
        assert_eq!(
            log.events(),
            vec![
                "r:outgoing",
                "r:canceled:request canceled: request aborted during flight"
            ]
        );
    }

    #[tokio::test]
    async fn test_cancel_after_completion_is_noop() {
        let transport = Arc::new(ScriptedTransport::always_ok());
        let provider = provider_with(transport.clone());
        let token = CancellationToken::new();

        let ctx = provider
            .send_with_options(
                Method::GET,
                "/",
                CallOptions::new().cancel_token(token.clone()),
            )
            .await
            .unwrap();
        token.cancel();
        token.cancel();

        assert_eq!(ctx.response.unwrap().status, StatusCode::OK);
        assert_eq!(transport.aborts(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_aborts_transport() {
        let transport = Arc::new(ScriptedTransport::hanging());
        let provider = provider_with(transport.clone());

        let err = provider
            .send_with_options(
                Method::GET,
                "/",
                CallOptions::new().timeout(Duration::from_millis(50)),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, ClientError::Timeout(d) if d == Duration::from_millis(50)));
        assert_eq!(transport.aborts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_resend_applies_attempt_timeout() {
        let transport = Arc::new(ScriptedTransport::hanging());
        let mut provider = provider_with(transport.clone());
        provider.set_timeout(Duration::from_millis(20));

        let ctx = provider.new_context(
            RequestId::new(),
            1,
            &Method::POST,
            "/orders",
            &CallOptions::default(),
        );
        let err = provider.resend(&ctx).await.unwrap_err();

        assert!(matches!(err, ClientError::Timeout(d) if d == Duration::from_millis(20)));
        assert_eq!(transport.calls(), 1);
        assert_eq!(transport.aborts(), 1);
    }

    #[tokio::test]
    async fn test_resend_refuses_cancelled_attempt() {
        let transport = Arc::new(ScriptedTransport::always_ok());
        let provider = provider_with(transport.clone());
        let token = CancellationToken::new();
        token.cancel();

        let ctx = provider.new_context(
            RequestId::new(),
            1,
            &Method::POST,
            "/orders",
            &CallOptions::new().cancel_token(token),
        );
        assert!(provider.resend(&ctx).await.unwrap_err().is_canceled());
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_backoff_stops_retrying() {
        let transport = Arc::new(ScriptedTransport::scripted([failing("down")]));
        let provider = provider_with(transport.clone());
        provider
            .set_retry_policy(
                RetryPolicy::new()
                    .max_retries(3)
                    .base_delay(Duration::from_secs(60))
                    .jitter(0.0),
            )
            .unwrap();

        let token = CancellationToken::new();
        let trigger = token.clone();
        let canceller = async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            trigger.cancel();
        };
        let (result, ()) = tokio::join!(
            provider.send_with_options(Method::GET, "/", CallOptions::new().cancel_token(token)),
            canceller,
        );

        let err = result.unwrap_err();
        assert!(matches!(err, ClientError::Canceled(m) if m.contains("backoff")));
        assert_eq!(transport.calls(), 1);
    }
}
