//! OTLP log export.
//!
//! Installs a batching `LoggerProvider` in the context. Loggers built with
//! [`create_logger_with_telemetry`](super::logger::create_logger_with_telemetry)
//! after this call forward their records through it. Export is optional: with
//! no endpoint, no runtime, or an exporter that cannot be built, bridged
//! records are dropped and the host keeps running.

use opentelemetry::logs::LogError;
use opentelemetry_otlp::{Protocol, WithExportConfig};
use opentelemetry_sdk::logs::LoggerProvider;
use opentelemetry_sdk::runtime::{self, RuntimeChannel};

use crate::context::TelemetryContext;
use crate::observability::is_current_thread_runtime;
use crate::observability::shutdown::{run_bounded, ShutdownHandle, PROVIDER_SHUTDOWN_TIMEOUT};

fn build_provider<R: RuntimeChannel>(endpoint: &str, runtime: R) -> Result<LoggerProvider, LogError> {
    let exporter = opentelemetry_otlp::new_exporter()
        .tonic()
        .with_endpoint(endpoint)
        .with_protocol(Protocol::Grpc);

    opentelemetry_otlp::new_pipeline()
        .logging()
        .with_exporter(exporter)
        .install_batch(runtime)
}

/// Bootstrap OTLP log export.
///
/// # Arguments
///
/// * `ctx` - Context receiving the logger provider
/// * `endpoint` - Optional OTLP endpoint (`http://host:port`) for log export
pub fn init_log_export(ctx: &TelemetryContext, endpoint: Option<&str>) -> ShutdownHandle {
    let Some(endpoint) = endpoint else {
        tracing::info!("Log export not configured");
        return ShutdownHandle::noop("logs");
    };

    if tokio::runtime::Handle::try_current().is_err() {
        tracing::warn!(endpoint, "No Tokio runtime for OTLP log export, continuing without it");
        return ShutdownHandle::noop("logs");
    }

    let built = if is_current_thread_runtime() {
        build_provider(endpoint, runtime::TokioCurrentThread)
    } else {
        build_provider(endpoint, runtime::Tokio)
    };
    let provider = match built {
        Ok(provider) => provider,
        Err(e) => {
            tracing::warn!(endpoint, error = %e, "Failed to create OTLP log exporter, continuing without it");
            return ShutdownHandle::noop("logs");
        }
    };

    ctx.install_logger_provider(provider.clone());
    tracing::info!(endpoint, "OTLP log exporter configured");

    ShutdownHandle::new("logs", move || {
        let result = run_bounded("logs", PROVIDER_SHUTDOWN_TIMEOUT, move || provider.shutdown());
        if let Some(Err(e)) = result {
            tracing::error!(error = %e, "Failed to shutdown logger provider");
        }
    })
}
