//! Startup context owning the process-wide telemetry handles.
//!
//! Each initializer installs its handles here, and also in the OpenTelemetry
//! globals that ecosystem crates read. Request-handling code only reads the
//! installed values, so sharing a cloned context across threads needs no
//! extra locking by callers.

use opentelemetry::propagation::TextMapCompositePropagator;
use opentelemetry::trace::TracerProvider as _;
use opentelemetry_sdk::logs::LoggerProvider;
use opentelemetry_sdk::trace::{Tracer, TracerProvider};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use crate::config::{EnvSource, ProcessEnv};
use crate::observability::transport::{ReqwestTransport, Transport, TransportSlot};

/// Installed tracer provider and propagator.
///
/// Shared with the traced transport so outbound calls always use whatever is
/// currently installed.
#[derive(Debug, Default)]
pub struct TracingHandles {
    provider: RwLock<Option<(u64, TracerProvider)>>,
    propagator: RwLock<Option<Arc<TextMapCompositePropagator>>>,
    generation: AtomicU64,
}

impl TracingHandles {
    /// The installed tracer provider, if tracing was bootstrapped.
    pub fn provider(&self) -> Option<TracerProvider> {
        self.provider
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|(_, provider)| provider.clone())
    }

    /// A tracer for the given instrumentation scope from the installed provider.
    pub fn tracer(&self, scope: &'static str) -> Option<Tracer> {
        self.provider().map(|provider| provider.tracer(scope))
    }

    /// The installed propagator, if tracing was bootstrapped.
    pub fn propagator(&self) -> Option<Arc<TextMapCompositePropagator>> {
        self.propagator
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Install a provider, replacing any previous one. Returns its generation.
    pub fn install_provider(&self, provider: TracerProvider) -> u64 {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        *self.provider.write().unwrap_or_else(PoisonError::into_inner) =
            Some((generation, provider));
        generation
    }

    /// Remove the provider installed as `generation`, unless a newer one replaced it.
    pub fn clear_provider(&self, generation: u64) -> bool {
        let mut slot = self.provider.write().unwrap_or_else(PoisonError::into_inner);
        match slot.as_ref() {
            Some((current, _)) if *current == generation => {
                *slot = None;
                true
            }
            _ => false,
        }
    }

    /// Install the propagator.
    pub fn install_propagator(&self, propagator: Arc<TextMapCompositePropagator>) {
        *self
            .propagator
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(propagator);
    }
}

struct Inner {
    env: Box<dyn EnvSource>,
    tracing: Arc<TracingHandles>,
    transport: TransportSlot,
    logger_provider: RwLock<Option<LoggerProvider>>,
    reporting: RwLock<Option<Arc<sentry::Client>>>,
}

/// Owner of everything the initializers install.
///
/// Cheap to clone; clones share the same installed state.
#[derive(Clone)]
pub struct TelemetryContext {
    inner: Arc<Inner>,
}

impl TelemetryContext {
    /// Create a context reading settings from `env`, with a plain reqwest
    /// client as the outbound transport.
    pub fn new(env: impl EnvSource + 'static) -> Self {
        Self::with_transport(env, Arc::new(ReqwestTransport::default()))
    }

    /// Create a context reading settings from `env` with a custom transport.
    pub fn with_transport(env: impl EnvSource + 'static, transport: Arc<dyn Transport>) -> Self {
        Self {
            inner: Arc::new(Inner {
                env: Box::new(env),
                tracing: Arc::new(TracingHandles::default()),
                transport: TransportSlot::new(transport),
                logger_provider: RwLock::new(None),
                reporting: RwLock::new(None),
            }),
        }
    }

    /// Create a context reading the process environment.
    pub fn from_process_env() -> Self {
        Self::new(ProcessEnv)
    }

    /// Settings source for the initializers.
    pub fn env(&self) -> &dyn EnvSource {
        self.inner.env.as_ref()
    }

    /// Installed tracing handles.
    pub fn tracing(&self) -> &Arc<TracingHandles> {
        &self.inner.tracing
    }

    /// The installed tracer provider, if any.
    pub fn tracer_provider(&self) -> Option<TracerProvider> {
        self.inner.tracing.provider()
    }

    /// The installed propagator, if any.
    pub fn propagator(&self) -> Option<Arc<TextMapCompositePropagator>> {
        self.inner.tracing.propagator()
    }

    /// The current outbound transport.
    pub fn transport(&self) -> Arc<dyn Transport> {
        self.inner.transport.current()
    }

    /// Slot holding the outbound transport.
    pub fn transport_slot(&self) -> &TransportSlot {
        &self.inner.transport
    }

    /// Logger provider that the telemetry bridge sink forwards into.
    ///
    /// Without an installed provider this returns a provider with no
    /// processors, so bridged records are dropped.
    pub fn logger_provider(&self) -> LoggerProvider {
        if let Some(provider) = self
            .inner
            .logger_provider
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
        {
            return provider.clone();
        }

        self.inner
            .logger_provider
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .get_or_insert_with(|| LoggerProvider::builder().build())
            .clone()
    }

    /// Install the logger provider used by telemetry-aware loggers.
    pub fn install_logger_provider(&self, provider: LoggerProvider) {
        *self
            .inner
            .logger_provider
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(provider);
    }

    /// The active error-reporting client, if reporting is configured.
    pub fn reporting_client(&self) -> Option<Arc<sentry::Client>> {
        self.inner
            .reporting
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Whether error reporting is active.
    pub fn is_reporting_enabled(&self) -> bool {
        self.reporting_client()
            .is_some_and(|client| client.is_enabled())
    }

    pub(crate) fn set_reporting_client(&self, client: Option<Arc<sentry::Client>>) {
        *self
            .inner
            .reporting
            .write()
            .unwrap_or_else(PoisonError::into_inner) = client;
    }
}

impl fmt::Debug for TelemetryContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelemetryContext")
            .field("tracing", &self.inner.tracing.provider().is_some())
            .field("transport_instrumented", &self.inner.transport.is_instrumented())
            .field("reporting", &self.is_reporting_enabled())
            .finish_non_exhaustive()
    }
}
