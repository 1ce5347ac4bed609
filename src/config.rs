//! Configuration for the telemetry initializers and the host binary.
//!
//! Supports:
//! - Environment-style key resolution with fallback defaults
//! - Injectable key/value sources for tests and embedding
//! - CLI arguments for the host binary via clap

use clap::Parser;
use std::collections::HashMap;

/// Environment keys read by the initializers.
pub mod keys {
    /// OTLP/gRPC collector address, optionally with an http(s) scheme.
    pub const OTLP_ENDPOINT: &str = "OTEL_EXPORTER_OTLP_ENDPOINT";
    /// `service.version` resource attribute.
    pub const SERVICE_VERSION: &str = "SERVICE_VERSION";
    /// `deployment.environment` resource attribute.
    pub const SERVICE_ENV: &str = "OTEL_SERVICE_ENV";
    /// Trace sampling probability in [0, 1].
    pub const SAMPLER_RATIO: &str = "OTEL_SAMPLER_RATIO";
    /// Error-reporting DSN. Reporting is disabled when unset.
    pub const SENTRY_DSN: &str = "SENTRY_DSN";
    /// Error-event sampling probability in [0, 1].
    pub const SENTRY_SAMPLE_RATE: &str = "SENTRY_SAMPLE_RATE";
    /// Environment tag for reported events; also the fallback for `OTEL_SERVICE_ENV`.
    pub const SENTRY_ENV: &str = "SENTRY_ENV";
    /// Release tag for reported events.
    pub const SENTRY_RELEASE: &str = "SENTRY_RELEASE";
    /// Flush bound in milliseconds used when reporting shuts down.
    pub const SENTRY_FLUSH_MS: &str = "SENTRY_FLUSH_MS";
}

/// Default collector endpoint for local and docker-compose setups.
pub const DEFAULT_OTLP_ENDPOINT: &str = "http://otel-collector:4317";

/// Source of environment-style settings.
pub trait EnvSource: Send + Sync {
    /// Look up a raw value. `None` when the key is absent.
    fn var(&self, key: &str) -> Option<String>;
}

/// Reads the real process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

impl EnvSource for HashMap<String, String> {
    fn var(&self, key: &str) -> Option<String> {
        self.get(key).cloned()
    }
}

/// Resolve `key` from `env`, falling back to `default` when absent or empty.
pub fn resolve(env: &dyn EnvSource, key: &str, default: &str) -> String {
    match env.var(key) {
        Some(value) if !value.is_empty() => value,
        _ => default.to_string(),
    }
}

/// Service telemetry demo host.
#[derive(Parser, Debug, Clone)]
#[command(name = "service-telemetry")]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// Service name reported as the `service.name` resource attribute
    #[arg(long, env = "SERVICE_NAME", default_value = "service-telemetry")]
    pub service_name: String,

    /// Console log filter (trace, debug, info, warn, error or a RUST_LOG directive)
    #[arg(long, env = "RUST_LOG", default_value = "info")]
    pub log_level: String,

    /// OpenTelemetry collector endpoint for metrics export (optional)
    #[arg(long, env = "OTEL_EXPORTER_OTLP_METRICS_ENDPOINT")]
    pub metrics_endpoint: Option<String>,

    /// OpenTelemetry collector endpoint for log export (optional)
    #[arg(long, env = "OTEL_EXPORTER_OTLP_LOGS_ENDPOINT")]
    pub logs_endpoint: Option<String>,

    /// URL fetched once through the instrumented transport after startup (optional)
    #[arg(long, env = "PROBE_URL")]
    pub probe_url: Option<String>,
}

impl Config {
    /// Parse configuration from CLI arguments and environment.
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service_name: "service-telemetry".into(),
            log_level: "info".into(),
            metrics_endpoint: None,
            logs_endpoint: None,
            probe_url: None,
        }
    }
}
