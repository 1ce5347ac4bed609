//! Outbound HTTP transport and its tracing wrapper.
//!
//! The context holds one shared transport. Tracer bootstrap wraps it in
//! [`TracedTransport`] exactly once. The wrapper's concrete type is checked
//! before wrapping, so bootstrapping again leaves the installed transport
//! untouched.

use futures::future::BoxFuture;
use opentelemetry::propagation::TextMapPropagator;
use opentelemetry::trace::{SpanKind, Status, TraceContextExt, Tracer};
use opentelemetry::{Context, KeyValue};
use opentelemetry_http::HeaderInjector;
use opentelemetry_semantic_conventions::trace::{
    HTTP_REQUEST_METHOD, HTTP_RESPONSE_STATUS_CODE, SERVER_ADDRESS, URL_FULL,
};
use reqwest::{Method, Url};
use std::any::Any;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use crate::context::TracingHandles;

/// Instrumentation scope for outbound client spans.
pub const INSTRUMENTATION_SCOPE: &str = "service-telemetry/http-client";

/// Result of sending one request.
pub type TransportResult = Result<reqwest::Response, reqwest::Error>;

/// Sends outbound HTTP requests.
pub trait Transport: Send + Sync + 'static {
    /// Send a request and wait for the response headers.
    fn send(&self, request: reqwest::Request) -> BoxFuture<'_, TransportResult>;

    /// Concrete type access for the already-wrapped check.
    fn as_any(&self) -> &dyn Any;
}

/// Plain reqwest client.
#[derive(Debug, Clone, Default)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Use an existing client.
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// The underlying client, for building requests.
    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }
}

impl Transport for ReqwestTransport {
    fn send(&self, request: reqwest::Request) -> BoxFuture<'_, TransportResult> {
        Box::pin(self.client.execute(request))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Span name for an outbound call: method and destination host, no path.
pub fn span_name(method: &Method, url: &Url) -> String {
    match url.host_str() {
        Some(host) => match url.port() {
            Some(port) => format!("{method} {host}:{port}"),
            None => format!("{method} {host}"),
        },
        None => method.to_string(),
    }
}

/// Wraps a transport with a client span per request and propagation headers.
pub struct TracedTransport {
    inner: Arc<dyn Transport>,
    handles: Arc<TracingHandles>,
}

impl TracedTransport {
    /// Wrap `inner`, tracing through whatever `handles` currently hold.
    pub fn new(inner: Arc<dyn Transport>, handles: Arc<TracingHandles>) -> Self {
        Self { inner, handles }
    }

    /// The wrapped transport.
    pub fn inner(&self) -> &Arc<dyn Transport> {
        &self.inner
    }
}

impl fmt::Debug for TracedTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TracedTransport").finish_non_exhaustive()
    }
}

impl Transport for TracedTransport {
    fn send(&self, mut request: reqwest::Request) -> BoxFuture<'_, TransportResult> {
        let Some(tracer) = self.handles.tracer(INSTRUMENTATION_SCOPE) else {
            return self.inner.send(request);
        };

        let host = request.url().host_str().unwrap_or_default().to_string();
        let span = tracer
            .span_builder(span_name(request.method(), request.url()))
            .with_kind(SpanKind::Client)
            .with_attributes(vec![
                KeyValue::new(HTTP_REQUEST_METHOD, request.method().to_string()),
                KeyValue::new(SERVER_ADDRESS, host),
                KeyValue::new(URL_FULL, request.url().to_string()),
            ])
            .start(&tracer);
        let cx = Context::current_with_span(span);

        if let Some(propagator) = self.handles.propagator() {
            propagator.inject_context(&cx, &mut HeaderInjector(request.headers_mut()));
        }

        Box::pin(async move {
            let result = self.inner.send(request).await;

            let span = cx.span();
            match &result {
                Ok(response) => {
                    let status = response.status();
                    span.set_attribute(KeyValue::new(
                        HTTP_RESPONSE_STATUS_CODE,
                        i64::from(status.as_u16()),
                    ));
                    if status.is_server_error() {
                        span.set_status(Status::error(status.to_string()));
                    }
                }
                Err(e) => {
                    span.record_error(e);
                    span.set_status(Status::error(e.to_string()));
                }
            }
            span.end();

            result
        })
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Holder of the shared outbound transport.
pub struct TransportSlot {
    current: RwLock<Arc<dyn Transport>>,
}

impl TransportSlot {
    /// Start with `transport` installed.
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            current: RwLock::new(transport),
        }
    }

    /// The installed transport.
    pub fn current(&self) -> Arc<dyn Transport> {
        Arc::clone(&self.current.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Replace the installed transport, returning the previous one.
    pub fn replace(&self, transport: Arc<dyn Transport>) -> Arc<dyn Transport> {
        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *current, transport)
    }

    /// Whether the installed transport is already a [`TracedTransport`].
    pub fn is_instrumented(&self) -> bool {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_any()
            .is::<TracedTransport>()
    }

    /// Wrap the installed transport with `handles`, unless it is already traced.
    ///
    /// Returns `true` when a wrapper was installed.
    pub fn instrument(&self, handles: &Arc<TracingHandles>) -> bool {
        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        if current.as_any().is::<TracedTransport>() {
            return false;
        }

        let traced = TracedTransport::new(Arc::clone(&current), Arc::clone(handles));
        *current = Arc::new(traced);
        true
    }
}

impl fmt::Debug for TransportSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportSlot")
            .field("instrumented", &self.is_instrumented())
            .finish()
    }
}
