//! Error-reporting (Sentry) bootstrap.
//!
//! Reporting is optional: without a DSN, or when the client cannot be
//! created, the host keeps running with a no-op shutdown handle.

use sentry::types::Dsn;
use std::borrow::Cow;
use std::time::Duration;

use crate::config::{keys, resolve, EnvSource};
use crate::context::TelemetryContext;
use crate::observability::shutdown::ShutdownHandle;

/// Sample rate used when the configured value is unusable.
pub const DEFAULT_SAMPLE_RATE: f64 = 1.0;

/// Flush bound used when the configured value is unusable.
pub const DEFAULT_FLUSH_TIMEOUT: Duration = Duration::from_millis(2000);

/// Parse the error-event sample rate.
///
/// Unparseable, NaN and infinite input yield the default; finite values are
/// clamped to [0, 1].
pub fn parse_sample_rate(s: &str) -> f64 {
    match s.parse::<f64>() {
        Ok(rate) if rate.is_finite() => rate.clamp(0.0, 1.0),
        _ => DEFAULT_SAMPLE_RATE,
    }
}

/// Parse the shutdown flush bound in milliseconds.
///
/// Negative or non-numeric input is ignored in favor of the default.
pub fn parse_flush_timeout(s: &str) -> Duration {
    match s.parse::<i64>() {
        Ok(ms) if ms >= 0 => Duration::from_millis(ms.unsigned_abs()),
        _ => DEFAULT_FLUSH_TIMEOUT,
    }
}

/// Settings resolved for one reporting bootstrap.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportingSettings {
    /// `None` disables reporting.
    pub dsn: Option<String>,
    pub sample_rate: f64,
    pub environment: Option<String>,
    pub release: Option<String>,
}

impl ReportingSettings {
    /// Resolve settings from `env`.
    pub fn resolve(env: &dyn EnvSource) -> Self {
        let optional = |key| Some(resolve(env, key, "")).filter(|v| !v.is_empty());

        Self {
            dsn: optional(keys::SENTRY_DSN),
            sample_rate: parse_sample_rate(&resolve(env, keys::SENTRY_SAMPLE_RATE, "")),
            environment: optional(keys::SENTRY_ENV),
            release: optional(keys::SENTRY_RELEASE),
        }
    }

    /// Client options for a parsed DSN.
    pub fn client_options(&self, dsn: Dsn) -> sentry::ClientOptions {
        sentry::ClientOptions {
            dsn: Some(dsn),
            sample_rate: self.sample_rate as f32,
            environment: self.environment.clone().map(Cow::Owned),
            release: self.release.clone().map(Cow::Owned),
            ..Default::default()
        }
    }
}

/// Bootstrap error reporting.
///
/// Never fails: a missing DSN is the normal disabled path, and an unusable DSN
/// is logged and treated the same way.
pub fn init_error_reporting(ctx: &TelemetryContext) -> ShutdownHandle {
    let settings = ReportingSettings::resolve(ctx.env());

    let Some(raw_dsn) = settings.dsn.as_deref() else {
        tracing::info!("Error reporting not configured");
        return ShutdownHandle::noop("reporting");
    };

    let dsn = match raw_dsn.parse::<Dsn>() {
        Ok(dsn) => dsn,
        Err(e) => {
            tracing::warn!(error = %e, "Error reporting init failed, continuing without it");
            return ShutdownHandle::noop("reporting");
        }
    };

    let guard = sentry::init(settings.client_options(dsn));
    if !guard.is_enabled() {
        tracing::warn!("Error reporting client is disabled, continuing without it");
        return ShutdownHandle::noop("reporting");
    }
    ctx.set_reporting_client(sentry::Hub::main().client());

    tracing::info!(
        sample_rate = settings.sample_rate,
        environment = settings.environment.as_deref().unwrap_or_default(),
        release = settings.release.as_deref().unwrap_or_default(),
        "Error reporting initialized"
    );

    let ctx = ctx.clone();
    ShutdownHandle::new("reporting", move || {
        let timeout = ctx
            .env()
            .var(keys::SENTRY_FLUSH_MS)
            .map_or(DEFAULT_FLUSH_TIMEOUT, |v| parse_flush_timeout(&v));

        if !guard.close(Some(timeout)) {
            tracing::warn!(
                timeout_ms = timeout.as_millis() as u64,
                "Error reporting flush timed out"
            );
        }
        ctx.set_reporting_client(None);
        drop(guard);
    })
}
