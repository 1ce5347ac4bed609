//! Bootstrap errors.
//!
//! Only the conditions with no sensible degraded mode surface here. Reporting
//! and metrics misconfiguration is absorbed by the initializers with a log line.

use opentelemetry::trace::TraceError;
use thiserror::Error;

/// Errors returned by the telemetry initializers.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// The batch span processor needs a Tokio runtime to run on.
    #[error("tracer bootstrap must run inside a Tokio runtime")]
    NoRuntime,

    /// The OTLP span exporter could not be constructed.
    #[error("failed to create OTLP exporter for {endpoint}: {source}")]
    Exporter {
        endpoint: String,
        #[source]
        source: TraceError,
    },

    /// A global subscriber was already set when installing a logger.
    #[error("a global logger is already installed")]
    LoggerInstalled(#[from] tracing::dispatcher::SetGlobalDefaultError),
}
