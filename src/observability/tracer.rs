//! OpenTelemetry tracer bootstrap.
//!
//! Configures, in order:
//! - OTLP/gRPC span exporter toward the collector (TLS for `https://` endpoints)
//! - Resource attributes: service name, version and deployment environment
//! - Parent-based ratio sampler (defaults to recording every trace)
//! - W3C Trace Context + Baggage propagation
//! - Client spans on the shared outbound transport, installed once

use opentelemetry::propagation::TextMapCompositePropagator;
use opentelemetry::{global, KeyValue};
use opentelemetry_otlp::{SpanExporter, SpanExporterBuilder, WithExportConfig};
use opentelemetry_sdk::propagation::{BaggagePropagator, TraceContextPropagator};
use opentelemetry_sdk::trace::{Config, Sampler, TracerProvider};
use opentelemetry_sdk::{runtime, Resource};
use opentelemetry_semantic_conventions::resource::{SERVICE_NAME, SERVICE_VERSION};
use opentelemetry_semantic_conventions::SCHEMA_URL;
use std::sync::Arc;
use tonic::transport::ClientTlsConfig;

use crate::config::{keys, resolve, EnvSource, DEFAULT_OTLP_ENDPOINT};
use crate::context::TelemetryContext;
use crate::error::TelemetryError;
use crate::observability::is_current_thread_runtime;
use crate::observability::shutdown::{run_bounded, ShutdownHandle, PROVIDER_SHUTDOWN_TIMEOUT};

/// Sampling ratio used when the configured value is unusable.
pub const DEFAULT_SAMPLING_RATIO: f64 = 1.0;

/// Resource key for the deployment environment tag.
pub const DEPLOYMENT_ENVIRONMENT: &str = "deployment.environment";

/// Channel security toward the collector, derived from the endpoint scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportSecurity {
    /// TLS with the platform's native roots.
    Secure,
    /// Plaintext gRPC.
    Insecure,
}

impl TransportSecurity {
    /// `https://` means secure; any other scheme, or none, means insecure.
    pub fn from_endpoint(endpoint: &str) -> Self {
        if has_scheme(endpoint, "https://") {
            Self::Secure
        } else {
            Self::Insecure
        }
    }

    /// URI scheme handed to the gRPC channel.
    pub fn scheme(self) -> &'static str {
        match self {
            Self::Secure => "https",
            Self::Insecure => "http",
        }
    }

    pub fn is_secure(self) -> bool {
        self == Self::Secure
    }
}

fn has_scheme(s: &str, scheme: &str) -> bool {
    s.get(..scheme.len())
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case(scheme))
}

/// Strip a leading `http://` or `https://` (any case), leaving `host:port`.
pub fn normalize_endpoint(endpoint: &str) -> &str {
    for scheme in ["https://", "http://"] {
        if has_scheme(endpoint, scheme) {
            return &endpoint[scheme.len()..];
        }
    }
    endpoint
}

/// Parse a sampling ratio.
///
/// Only ASCII digits and `.` are accepted. Anything else, an empty string, or
/// a value outside [0, 1] yields `default`. Parsing reads the leading number
/// and stops at a second `.`, so `"0.5.5"` is 0.5.
pub fn parse_ratio(s: &str, default: f64) -> f64 {
    if s.is_empty() || !s.chars().all(|c| c == '.' || c.is_ascii_digit()) {
        return default;
    }
    let number = match s.match_indices('.').nth(1) {
        Some((second_dot, _)) => &s[..second_dot],
        None => s,
    };
    match number.parse::<f64>() {
        Ok(ratio) if (0.0..=1.0).contains(&ratio) => ratio,
        _ => default,
    }
}

/// Settings resolved for one tracer bootstrap.
#[derive(Debug, Clone, PartialEq)]
pub struct TracingSettings {
    /// Collector address as `host:port`.
    pub endpoint: String,
    pub security: TransportSecurity,
    pub service_name: String,
    pub service_version: String,
    pub environment: String,
    pub sampling_ratio: f64,
}

impl TracingSettings {
    /// Resolve settings from `env` for `service_name`.
    pub fn resolve(env: &dyn EnvSource, service_name: &str) -> Self {
        let raw_endpoint = resolve(env, keys::OTLP_ENDPOINT, DEFAULT_OTLP_ENDPOINT);
        let shared_env = resolve(env, keys::SENTRY_ENV, "");

        Self {
            endpoint: normalize_endpoint(&raw_endpoint).to_string(),
            security: TransportSecurity::from_endpoint(&raw_endpoint),
            service_name: service_name.to_string(),
            service_version: resolve(env, keys::SERVICE_VERSION, ""),
            environment: resolve(env, keys::SERVICE_ENV, &shared_env),
            sampling_ratio: parse_ratio(
                &resolve(env, keys::SAMPLER_RATIO, "1"),
                DEFAULT_SAMPLING_RATIO,
            ),
        }
    }

    /// Endpoint URI for the gRPC exporter.
    pub fn exporter_url(&self) -> String {
        format!("{}://{}", self.security.scheme(), self.endpoint)
    }

    /// Resource describing this service.
    pub fn resource(&self) -> Resource {
        Resource::from_schema_url(
            [
                KeyValue::new(SERVICE_NAME, self.service_name.clone()),
                KeyValue::new(SERVICE_VERSION, self.service_version.clone()),
                KeyValue::new(DEPLOYMENT_ENVIRONMENT, self.environment.clone()),
            ],
            SCHEMA_URL,
        )
    }

    /// Parent-based sampler around a trace-id ratio sampler.
    pub fn sampler(&self) -> Sampler {
        Sampler::ParentBased(Box::new(Sampler::TraceIdRatioBased(self.sampling_ratio)))
    }
}

/// W3C Trace Context + Baggage.
pub fn composite_propagator() -> TextMapCompositePropagator {
    TextMapCompositePropagator::new(vec![
        Box::new(TraceContextPropagator::new()),
        Box::new(BaggagePropagator::new()),
    ])
}

fn build_exporter(settings: &TracingSettings) -> Result<SpanExporter, TelemetryError> {
    let url = settings.exporter_url();

    let mut builder = opentelemetry_otlp::new_exporter()
        .tonic()
        .with_endpoint(url.clone());
    if settings.security.is_secure() {
        builder = builder.with_tls_config(ClientTlsConfig::new().with_native_roots());
    }

    SpanExporterBuilder::from(builder)
        .build_span_exporter()
        .map_err(|source| TelemetryError::Exporter {
            endpoint: url,
            source,
        })
}

/// Bootstrap tracing for `service_name`.
///
/// Installs the tracer provider and propagator in `ctx` and in the
/// OpenTelemetry globals, replacing anything installed earlier, and wraps the
/// outbound transport unless it is already wrapped.
///
/// Must run inside a Tokio runtime. On a multi-threaded runtime the batch
/// processor is spawned on it; on a current-thread runtime it gets a dedicated
/// thread. Shutdown waits at most [`PROVIDER_SHUTDOWN_TIMEOUT`] for the flush.
/// Exporter construction failure is returned as an error: there is no
/// degraded tracing mode, so hosts should abort startup on it.
pub fn init_tracing(
    ctx: &TelemetryContext,
    service_name: &str,
) -> Result<ShutdownHandle, TelemetryError> {
    if tokio::runtime::Handle::try_current().is_err() {
        return Err(TelemetryError::NoRuntime);
    }

    let settings = TracingSettings::resolve(ctx.env(), service_name);
    let exporter = build_exporter(&settings)?;

    let builder = if is_current_thread_runtime() {
        TracerProvider::builder().with_batch_exporter(exporter, runtime::TokioCurrentThread)
    } else {
        TracerProvider::builder().with_batch_exporter(exporter, runtime::Tokio)
    };
    let provider = builder
        .with_config(
            Config::default()
                .with_sampler(settings.sampler())
                .with_resource(settings.resource()),
        )
        .build();

    let generation = ctx.tracing().install_provider(provider.clone());
    global::set_tracer_provider(provider.clone());

    ctx.tracing()
        .install_propagator(Arc::new(composite_propagator()));
    global::set_text_map_propagator(composite_propagator());

    if ctx.transport_slot().instrument(ctx.tracing()) {
        tracing::debug!("Outbound transport instrumented");
    } else {
        tracing::debug!("Outbound transport already instrumented");
    }

    tracing::info!(
        endpoint = %settings.endpoint,
        secure = settings.security.is_secure(),
        service = %settings.service_name,
        sampling_ratio = settings.sampling_ratio,
        "Tracing initialized"
    );

    let handles = Arc::clone(ctx.tracing());
    Ok(ShutdownHandle::new("tracer", move || {
        let result = run_bounded("tracer", PROVIDER_SHUTDOWN_TIMEOUT, move || {
            provider.shutdown()
        });
        if let Some(Err(e)) = result {
            tracing::error!(error = %e, "Failed to shutdown tracer provider");
        }
        handles.clear_provider(generation);
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use opentelemetry::Key;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_normalize_strips_http_and_https() {
        assert_eq!(normalize_endpoint("https://example:4317"), "example:4317");
        assert_eq!(normalize_endpoint("http://example:4317"), "example:4317");
        assert_eq!(normalize_endpoint("HTTPS://example:4317"), "example:4317");
    }

    #[test]
    fn test_normalize_leaves_bare_endpoint() {
        assert_eq!(normalize_endpoint("example:4317"), "example:4317");
        assert_eq!(normalize_endpoint(""), "");
        assert_eq!(normalize_endpoint("grpc://example:4317"), "grpc://example:4317");
    }

    #[test]
    fn test_normalize_handles_multibyte_prefix() {
        assert_eq!(normalize_endpoint("ħost:4317"), "ħost:4317");
    }

    #[test]
    fn test_security_follows_scheme() {
        assert_eq!(
            TransportSecurity::from_endpoint("https://collector:4317"),
            TransportSecurity::Secure
        );
        assert_eq!(
            TransportSecurity::from_endpoint("http://collector:4317"),
            TransportSecurity::Insecure
        );
        assert_eq!(
            TransportSecurity::from_endpoint("collector:4317"),
            TransportSecurity::Insecure
        );
    }

    #[test]
    fn test_parse_ratio_accepts_values_in_range() {
        for (input, expected) in [
            ("0", 0.0),
            ("1", 1.0),
            ("0.25", 0.25),
            (".5", 0.5),
            ("1.0", 1.0),
            ("0.000001", 0.000_001),
            ("0.5.5", 0.5),
            ("1.", 1.0),
        ] {
            assert_eq!(parse_ratio(input, DEFAULT_SAMPLING_RATIO), expected, "{input}");
        }
    }

    #[test]
    fn test_parse_ratio_rejects_bad_input() {
        for input in [
            "", "abc", "-0.5", "1.5", "2", "0.5x", " 0.5", "1e-3", "NaN", "inf", ".", "..5", "1.2.3",
        ] {
            assert_eq!(
                parse_ratio(input, DEFAULT_SAMPLING_RATIO),
                DEFAULT_SAMPLING_RATIO,
                "{input:?}"
            );
        }
    }

    #[test]
    fn test_settings_defaults() {
        let settings = TracingSettings::resolve(&env(&[]), "svc");
        assert_eq!(settings.endpoint, "otel-collector:4317");
        assert_eq!(settings.security, TransportSecurity::Insecure);
        assert_eq!(settings.service_version, "");
        assert_eq!(settings.environment, "");
        assert_eq!(settings.sampling_ratio, 1.0);
        assert_eq!(settings.exporter_url(), "http://otel-collector:4317");
    }

    #[test]
    fn test_settings_secure_endpoint() {
        let settings = TracingSettings::resolve(
            &env(&[(keys::OTLP_ENDPOINT, "https://collector.internal:4317")]),
            "svc",
        );
        assert_eq!(settings.endpoint, "collector.internal:4317");
        assert!(settings.security.is_secure());
        assert_eq!(settings.exporter_url(), "https://collector.internal:4317");
    }

    #[test]
    fn test_environment_falls_back_to_shared_setting() {
        let settings = TracingSettings::resolve(&env(&[(keys::SENTRY_ENV, "staging")]), "svc");
        assert_eq!(settings.environment, "staging");

        let settings = TracingSettings::resolve(
            &env(&[(keys::SENTRY_ENV, "staging"), (keys::SERVICE_ENV, "prod")]),
            "svc",
        );
        assert_eq!(settings.environment, "prod");
    }

    #[test]
    fn test_resource_carries_service_attributes() {
        let settings = TracingSettings::resolve(
            &env(&[(keys::SERVICE_VERSION, "3.1.0"), (keys::SERVICE_ENV, "prod")]),
            "checkout",
        );
        let resource = settings.resource();

        assert_eq!(
            resource.get(Key::new(SERVICE_NAME)).map(|v| v.to_string()),
            Some("checkout".to_string())
        );
        assert_eq!(
            resource.get(Key::new(SERVICE_VERSION)).map(|v| v.to_string()),
            Some("3.1.0".to_string())
        );
        assert_eq!(
            resource
                .get(Key::new("deployment.environment"))
                .map(|v| v.to_string()),
            Some("prod".to_string())
        );
        assert_eq!(resource.schema_url(), Some(SCHEMA_URL));
    }

    #[test]
    fn test_bad_ratio_setting_uses_full_sampling() {
        let settings = TracingSettings::resolve(&env(&[(keys::SAMPLER_RATIO, "half")]), "svc");
        assert_eq!(settings.sampling_ratio, 1.0);

        let settings = TracingSettings::resolve(&env(&[(keys::SAMPLER_RATIO, "0.1")]), "svc");
        assert_eq!(settings.sampling_ratio, 0.1);
    }

    #[test]
    fn test_composite_propagator_fields() {
        use opentelemetry::propagation::TextMapPropagator;

        let fields: Vec<String> = composite_propagator().fields().map(str::to_string).collect();
        assert!(fields.contains(&"traceparent".to_string()));
        assert!(fields.contains(&"baggage".to_string()));
    }

    #[test]
    fn test_init_tracing_requires_runtime() {
        let ctx = TelemetryContext::new(env(&[]));
        let err = init_tracing(&ctx, "svc").unwrap_err();
        assert!(matches!(err, TelemetryError::NoRuntime));
    }
}
