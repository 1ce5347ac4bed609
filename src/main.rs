//! Service telemetry demo host.
//!
//! # Usage
//!
//! ```bash
//! service-telemetry --service-name orders --log-level info --probe-url http://inventory:8080/health
//! ```
//!
//! Environment variables can also be used:
//! - `SERVICE_NAME`: Service name reported to the tracing backend
//! - `RUST_LOG`: Console log filter
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: Trace collector (`host:port` or URL)
//! - `OTEL_EXPORTER_OTLP_METRICS_ENDPOINT`: Metrics collector (optional)
//! - `OTEL_EXPORTER_OTLP_LOGS_ENDPOINT`: Log collector (optional)
//! - `SENTRY_DSN`: Error-reporting DSN (optional)
//! - `PROBE_URL`: URL fetched once through the instrumented transport

use opentelemetry::KeyValue;
use service_telemetry::config::Config;
use service_telemetry::context::TelemetryContext;
use service_telemetry::observability::logger::create_logger_with_telemetry;
use service_telemetry::observability::logs::init_log_export;
use service_telemetry::observability::metrics::{get_meter, init_metrics};
use service_telemetry::observability::reporting::init_error_reporting;
use service_telemetry::observability::tracer::init_tracing;
use service_telemetry::observability::ShutdownHandle;

/// Print startup banner with version and configuration.
fn print_banner(config: &Config, ctx: &TelemetryContext) {
    let version = env!("CARGO_PKG_VERSION");
    eprintln!(
        r#"
  service-telemetry v{}

  Configuration:
    Service:    {}
    Log Level:  {}
    Metrics:    {}
    Logs:       {}
    Reporting:  {}

  Press Ctrl+C to shutdown gracefully.
"#,
        version,
        config.service_name,
        config.log_level,
        config.metrics_endpoint.as_deref().unwrap_or("local only"),
        config.logs_endpoint.as_deref().unwrap_or("console only"),
        if ctx.is_reporting_enabled() {
            "enabled"
        } else {
            "disabled"
        }
    );
}

/// Fetch `url` once through the context's transport.
async fn probe(ctx: &TelemetryContext, url: &str) -> anyhow::Result<()> {
    let request = reqwest::Request::new(reqwest::Method::GET, url.parse()?);
    let transport = ctx.transport();
    let response = transport.send(request).await?;
    tracing::info!(url, status = response.status().as_u16(), "Probe finished");
    Ok(())
}

/// Wait for SIGTERM or SIGINT (Ctrl+C).
async fn wait_for_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {
                        tracing::info!("Received SIGINT (Ctrl+C), initiating shutdown...");
                    }
                    _ = sigterm.recv() => {
                        tracing::info!("Received SIGTERM, initiating shutdown...");
                    }
                }
                return;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to install SIGTERM handler, waiting for Ctrl+C only");
            }
        }
    }

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl+C");
        return;
    }
    tracing::info!("Received Ctrl+C, initiating shutdown...");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse configuration from CLI arguments and environment
    let config = Config::parse_args();
    let ctx = TelemetryContext::from_process_env();

    // Bootstrap order: tracer, error reporting, log export, logger, metrics.
    // Log export must precede the logger, which captures the provider when built.
    let tracing_shutdown = init_tracing(&ctx, &config.service_name)?;
    let reporting_shutdown = init_error_reporting(&ctx);
    let logs_shutdown = init_log_export(&ctx, config.logs_endpoint.as_deref());
    create_logger_with_telemetry(&ctx, &config.log_level).install_global()?;
    let metrics_shutdown = init_metrics(config.metrics_endpoint.as_deref());

    print_banner(&config, &ctx);

    let starts = get_meter().u64_counter("service_starts_total").init();
    starts.add(1, &[KeyValue::new("service", config.service_name.clone())]);

    if let Some(url) = config.probe_url.as_deref() {
        if let Err(e) = probe(&ctx, url).await {
            tracing::warn!(url, error = %e, "Probe failed");
        }
    }

    wait_for_signal().await;

    // Reverse of bootstrap order, so late logs still reach the exporters.
    // Flushing blocks, and the exporters need the runtime workers to make progress.
    let handles: [ShutdownHandle; 4] = [
        metrics_shutdown,
        logs_shutdown,
        reporting_shutdown,
        tracing_shutdown,
    ];
    tokio::task::spawn_blocking(move || {
        for handle in handles {
            handle.shutdown();
        }
    })
    .await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
