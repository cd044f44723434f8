//! Shared fixtures for unit tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use http::HeaderMap;

use crate::interceptor::BoxFuture;
use crate::{ClientError, Context, Interceptor, Provider, Response, Transport};

/// Ordered log of hook invocations, shared between recorders.
#[derive(Clone, Debug, Default)]
pub(crate) struct EventLog(Arc<Mutex<Vec<String>>>);

impl EventLog {
    pub(crate) fn push(&self, event: String) {
        self.0.lock().unwrap().push(event);
    }

    pub(crate) fn events(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

/// Interceptor that records every hook it sees and changes nothing.
pub(crate) struct Recorder {
    name: String,
    log: EventLog,
}

impl Recorder {
    pub(crate) fn new(name: &str) -> Self {
        Self::with_log(name, &EventLog::default())
    }

    pub(crate) fn with_log(name: &str, log: &EventLog) -> Self {
        Self {
            name: name.to_owned(),
            log: log.clone(),
        }
    }

    pub(crate) fn events(&self) -> Vec<String> {
        self.log.events()
    }

    fn record(&self, event: impl std::fmt::Display) {
        self.log.push(format!("{}:{}", self.name, event));
    }
}

impl Interceptor for Recorder {
    fn name(&self) -> &str {
        &self.name
    }

    fn on_outgoing<'a>(
        &'a self,
        _provider: &'a Provider,
        _ctx: &'a mut Context,
    ) -> BoxFuture<'a, Result<(), ClientError>> {
        self.record("outgoing");
        Box::pin(async { Ok(()) })
    }

    fn on_outgoing_canceled<'a>(
        &'a self,
        _provider: &'a Provider,
        _ctx: &'a Context,
        error: &'a ClientError,
    ) -> BoxFuture<'a, Result<(), ClientError>> {
        let detail = match error {
            ClientError::Interception(message) => message.clone(),
            other => other.to_string(),
        };
        self.record(format_args!("canceled:{detail}"));
        Box::pin(async { Ok(()) })
    }

    fn on_incoming<'a>(
        &'a self,
        _provider: &'a Provider,
        _ctx: &'a mut Context,
    ) -> BoxFuture<'a, Result<(), ClientError>> {
        self.record("incoming");
        Box::pin(async { Ok(()) })
    }

    fn on_incoming_rejected<'a>(
        &'a self,
        _provider: &'a Provider,
        _ctx: &'a mut Context,
        error: ClientError,
    ) -> BoxFuture<'a, Result<(), ClientError>> {
        self.record(format_args!("rejected:{error}"));
        Box::pin(async move { Err(error) })
    }

    fn on_incoming_final<'a>(
        &'a self,
        _provider: &'a Provider,
        _ctx: &'a Context,
        error: Option<&'a ClientError>,
    ) -> BoxFuture<'a, Result<(), ClientError>> {
        match error {
            Some(error) => self.record(format_args!("final:{error}")),
            None => self.record("final:ok"),
        }
        Box::pin(async { Ok(()) })
    }
}

/// In-memory transport answering from a script.
///
/// Once the script is used up every send answers `200 OK`, or never
/// completes if the transport was built with [`hanging`](Self::hanging) or
/// [`scripted_then_hang`](Self::scripted_then_hang).
#[derive(Default)]
pub(crate) struct ScriptedTransport {
    script: Mutex<VecDeque<Result<Response, ClientError>>>,
    hang: bool,
    calls: AtomicU32,
    aborts: AtomicU32,
    sent_headers: Mutex<Vec<HeaderMap>>,
}

impl ScriptedTransport {
    pub(crate) fn always_ok() -> Self {
        Self::default()
    }

    pub(crate) fn scripted<I>(replies: I) -> Self
    where
        I: IntoIterator<Item = Result<Response, ClientError>>,
    {
        Self {
            script: Mutex::new(replies.into_iter().collect()),
            ..Default::default()
        }
    }

    /// A transport whose sends never complete.
    pub(crate) fn hanging() -> Self {
        Self::scripted_then_hang([])
    }

    /// A transport answering from `replies`, then never completing.
    pub(crate) fn scripted_then_hang<I>(replies: I) -> Self
    where
        I: IntoIterator<Item = Result<Response, ClientError>>,
    {
        Self {
            hang: true,
            ..Self::scripted(replies)
        }
    }

    pub(crate) fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn aborts(&self) -> u32 {
        self.aborts.load(Ordering::SeqCst)
    }

    pub(crate) fn sent_headers(&self) -> Vec<HeaderMap> {
        self.sent_headers.lock().unwrap().clone()
    }
}

impl Transport for ScriptedTransport {
    fn send<'a>(&'a self, ctx: &'a Context) -> BoxFuture<'a, Result<Response, ClientError>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.sent_headers.lock().unwrap().push(ctx.headers.clone());
        let reply = self.script.lock().unwrap().pop_front();
        let hang = self.hang && reply.is_none();
        Box::pin(async move {
            if hang {
                std::future::pending::<()>().await;
            }
            reply.unwrap_or_else(|| Ok(Response::ok()))
        })
    }

    fn abort<'a>(&'a self, _ctx: &'a Context, _reason: &'a ClientError) -> BoxFuture<'a, ()> {
        self.aborts.fetch_add(1, Ordering::SeqCst);
        Box::pin(async {})
    }
}

/// A provider over a transport that always answers `200 OK`.
pub(crate) fn provider() -> Provider {
    Provider::new(ScriptedTransport::always_ok())
}

pub(crate) fn provider_with(transport: Arc<ScriptedTransport>) -> Provider {
    Provider::new(transport)
}
