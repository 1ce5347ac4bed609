//! Metrics provider bootstrap and meter accessor.
//!
//! Instruments are created by callers from [`get_meter`]. Before a provider
//! is installed the meter is a no-op, so recording is always safe.

use opentelemetry::global;
use opentelemetry::metrics::{Meter, Result as MetricsResult};
use opentelemetry_otlp::{Protocol, WithExportConfig};
use opentelemetry_sdk::metrics::{ManualReader, SdkMeterProvider};
use opentelemetry_sdk::runtime::{self, Runtime};
use std::time::Duration;

use crate::observability::is_current_thread_runtime;
use crate::observability::shutdown::{run_bounded, ShutdownHandle, PROVIDER_SHUTDOWN_TIMEOUT};

/// Name of the process-wide meter.
pub const METER_NAME: &str = "main";

/// Interval between OTLP metric exports.
pub const EXPORT_INTERVAL: Duration = Duration::from_secs(10);

/// The process-wide meter.
pub fn get_meter() -> Meter {
    global::meter(METER_NAME)
}

fn manual_provider() -> SdkMeterProvider {
    let reader = ManualReader::builder().build();
    SdkMeterProvider::builder().with_reader(reader).build()
}

fn build_otlp<R: Runtime>(endpoint: &str, runtime: R) -> MetricsResult<SdkMeterProvider> {
    let exporter = opentelemetry_otlp::new_exporter()
        .tonic()
        .with_endpoint(endpoint)
        .with_protocol(Protocol::Grpc);

    opentelemetry_otlp::new_pipeline()
        .metrics(runtime)
        .with_exporter(exporter)
        .with_period(EXPORT_INTERVAL)
        .build()
}

fn otlp_provider(endpoint: &str) -> Option<SdkMeterProvider> {
    if tokio::runtime::Handle::try_current().is_err() {
        tracing::warn!(endpoint, "No Tokio runtime for OTLP metrics, using local reader");
        return None;
    }

    let built = if is_current_thread_runtime() {
        build_otlp(endpoint, runtime::TokioCurrentThread)
    } else {
        build_otlp(endpoint, runtime::Tokio)
    };
    match built {
        Ok(provider) => {
            tracing::info!(endpoint, "OTLP metrics exporter configured");
            Some(provider)
        }
        Err(e) => {
            tracing::warn!(error = %e, "Failed to create OTLP metrics exporter, using local reader");
            None
        }
    }
}

/// Install the process-wide meter provider.
///
/// # Arguments
///
/// * `endpoint` - Optional OTLP endpoint for metrics export. Without one, or
///   when the exporter cannot be built, metrics are recorded but not exported.
pub fn init_metrics(endpoint: Option<&str>) -> ShutdownHandle {
    let provider = endpoint
        .and_then(otlp_provider)
        .unwrap_or_else(manual_provider);
    global::set_meter_provider(provider.clone());

    ShutdownHandle::new("metrics", move || {
        let result = run_bounded("metrics", PROVIDER_SHUTDOWN_TIMEOUT, move || {
            provider.shutdown()
        });
        if let Some(Err(e)) = result {
            tracing::error!(error = %e, "Metrics provider shutdown failed");
        }
    })
}
