//! Structured logger fan-out.
//!
//! A [`Logger`] delivers every record to an ordered list of sinks:
//! - Console output (JSON by default) filtered by an `EnvFilter` directive
//! - A bridge into the OpenTelemetry logs pipeline under a fixed scope name
//! - Span export through `tracing-opentelemetry`
//! - Error reporting, which only sees records at or above its threshold
//!
//! Each sink is its own layer with its own filter, so a sink that drops or
//! fails to write a record does not affect delivery to the others.

use opentelemetry::logs::LoggerProvider as _;
use opentelemetry::InstrumentationLibrary;
use opentelemetry_appender_tracing::layer::OpenTelemetryTracingBridge;
use opentelemetry_sdk::logs::{Logger as OtelLogger, LoggerProvider};
use opentelemetry_sdk::trace::Tracer;
use sentry_tracing::EventFilter;
use std::fmt;
use std::sync::Arc;
use tracing::{Dispatch, Level};
use tracing_subscriber::filter::{filter_fn, EnvFilter, LevelFilter};
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{Layer, Registry};

use crate::context::TelemetryContext;
use crate::error::TelemetryError;

/// Scope name for records and spans forwarded into OpenTelemetry.
pub const TELEMETRY_SCOPE: &str = "main";

/// One type-erased sink layer.
pub type BoxedSink = Box<dyn Layer<Registry> + Send + Sync + 'static>;

/// Console line format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConsoleFormat {
    #[default]
    Json,
    Compact,
}

/// A log destination and its filter.
pub enum Sink {
    /// Formatted output to `writer`, filtered by an `EnvFilter` directive.
    Console {
        format: ConsoleFormat,
        filter: String,
        writer: BoxMakeWriter,
    },
    /// Records forwarded to an OpenTelemetry logger named `scope`.
    TelemetryBridge {
        provider: LoggerProvider,
        scope: &'static str,
    },
    /// Spans exported through `tracer`.
    Spans { tracer: Tracer },
    /// Records at or above `threshold` captured as error-reporting events.
    ErrorReporting { threshold: Level },
}

impl Sink {
    /// JSON lines on stdout.
    pub fn json_stdout(filter: &str) -> Self {
        Self::Console {
            format: ConsoleFormat::Json,
            filter: filter.to_string(),
            writer: BoxMakeWriter::new(std::io::stdout),
        }
    }

    /// Error-reporting sink for `ERROR` records.
    pub fn error_reporting() -> Self {
        Self::ErrorReporting {
            threshold: Level::ERROR,
        }
    }

    /// Short name of the sink variant.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Console { .. } => "console",
            Self::TelemetryBridge { .. } => "telemetry",
            Self::Spans { .. } => "spans",
            Self::ErrorReporting { .. } => "error-reporting",
        }
    }

    fn into_layer(self) -> BoxedSink {
        match self {
            Self::Console {
                format,
                filter,
                writer,
            } => {
                let filter = EnvFilter::try_new(&filter).unwrap_or_else(|e| {
                    eprintln!("invalid log filter {filter:?} ({e}), using \"info\"");
                    EnvFilter::new("info")
                });
                match format {
                    ConsoleFormat::Json => tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(writer)
                        .with_filter(filter)
                        .boxed(),
                    ConsoleFormat::Compact => tracing_subscriber::fmt::layer()
                        .compact()
                        .with_writer(writer)
                        .with_filter(filter)
                        .boxed(),
                }
            }
            Self::TelemetryBridge { provider, scope } => {
                OpenTelemetryTracingBridge::new(&ScopedLoggerProvider::new(provider, scope))
                    // The SDK logs about itself through tracing; forwarding those would loop.
                    .with_filter(filter_fn(|metadata| {
                        !metadata.target().starts_with("opentelemetry")
                    }))
                    .boxed()
            }
            Self::Spans { tracer } => tracing_opentelemetry::layer().with_tracer(tracer).boxed(),
            Self::ErrorReporting { threshold } => sentry_tracing::layer()
                .event_filter(move |metadata| {
                    if *metadata.level() <= threshold {
                        EventFilter::Event
                    } else {
                        EventFilter::Ignore
                    }
                })
                .span_filter(|_| false)
                .with_filter(LevelFilter::from_level(threshold))
                .boxed(),
        }
    }
}

impl fmt::Debug for Sink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Console { format, filter, .. } => f
                .debug_struct("Console")
                .field("format", format)
                .field("filter", filter)
                .finish_non_exhaustive(),
            Self::TelemetryBridge { scope, .. } => f
                .debug_struct("TelemetryBridge")
                .field("scope", scope)
                .finish_non_exhaustive(),
            Self::Spans { .. } => f.debug_struct("Spans").finish_non_exhaustive(),
            Self::ErrorReporting { threshold } => f
                .debug_struct("ErrorReporting")
                .field("threshold", threshold)
                .finish(),
        }
    }
}

/// Logger provider that names every logger after one fixed scope.
///
/// The tracing bridge asks for a logger named after itself; records are
/// reported under `scope` instead.
#[derive(Clone)]
pub struct ScopedLoggerProvider {
    inner: LoggerProvider,
    scope: &'static str,
}

impl ScopedLoggerProvider {
    pub fn new(inner: LoggerProvider, scope: &'static str) -> Self {
        Self { inner, scope }
    }

    pub fn scope(&self) -> &'static str {
        self.scope
    }
}

impl opentelemetry::logs::LoggerProvider for ScopedLoggerProvider {
    type Logger = OtelLogger;

    fn library_logger(&self, _library: Arc<InstrumentationLibrary>) -> Self::Logger {
        self.inner.logger(self.scope)
    }
}

/// Builds a [`Logger`] from sinks in declaration order.
#[derive(Debug, Default)]
pub struct LoggerBuilder {
    sinks: Vec<Sink>,
}

impl LoggerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a sink.
    pub fn sink(mut self, sink: Sink) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn build(self) -> Logger {
        let kinds: Arc<[&'static str]> = self.sinks.iter().map(Sink::kind).collect();
        let layers: Vec<BoxedSink> = self.sinks.into_iter().map(Sink::into_layer).collect();
        let subscriber = tracing_subscriber::registry().with(layers);

        Logger {
            dispatch: Dispatch::new(subscriber),
            kinds,
        }
    }
}

/// A fan-out logger.
///
/// Not installed anywhere until the owner asks: use [`in_scope`](Self::in_scope)
/// or [`set_default`](Self::set_default) for the current thread, or
/// [`install_global`](Self::install_global) for the whole process. Cloning is
/// cheap and clones share the same sinks.
#[derive(Clone)]
pub struct Logger {
    dispatch: Dispatch,
    kinds: Arc<[&'static str]>,
}

impl Logger {
    /// The underlying dispatcher.
    pub fn dispatch(&self) -> &Dispatch {
        &self.dispatch
    }

    /// Sink kinds in delivery order.
    pub fn sink_kinds(&self) -> &[&'static str] {
        &self.kinds
    }

    /// Deliver one record to every sink.
    pub fn log(&self, level: Level, message: &str) {
        self.in_scope(|| match level {
            Level::ERROR => tracing::error!("{message}"),
            Level::WARN => tracing::warn!("{message}"),
            Level::INFO => tracing::info!("{message}"),
            Level::DEBUG => tracing::debug!("{message}"),
            _ => tracing::trace!("{message}"),
        });
    }

    /// Run `f` with this logger as the current thread's default.
    pub fn in_scope<T>(&self, f: impl FnOnce() -> T) -> T {
        tracing::dispatcher::with_default(&self.dispatch, f)
    }

    /// Make this logger the current thread's default until the guard drops.
    pub fn set_default(&self) -> tracing::dispatcher::DefaultGuard {
        tracing::dispatcher::set_default(&self.dispatch)
    }

    /// Make this logger the process-wide default.
    pub fn install_global(self) -> Result<(), TelemetryError> {
        tracing::dispatcher::set_global_default(self.dispatch)?;
        Ok(())
    }
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger").field("sinks", &self.kinds).finish()
    }
}

/// JSON console plus error reporting.
pub fn create_logger(filter: &str) -> Logger {
    LoggerBuilder::new()
        .sink(Sink::json_stdout(filter))
        .sink(Sink::error_reporting())
        .build()
}

/// JSON console, telemetry bridge, span export (when tracing is bootstrapped)
/// and error reporting.
pub fn create_logger_with_telemetry(ctx: &TelemetryContext, filter: &str) -> Logger {
    let mut builder = LoggerBuilder::new()
        .sink(Sink::json_stdout(filter))
        .sink(Sink::TelemetryBridge {
            provider: ctx.logger_provider(),
            scope: TELEMETRY_SCOPE,
        });
    if let Some(tracer) = ctx.tracing().tracer(TELEMETRY_SCOPE) {
        builder = builder.sink(Sink::Spans { tracer });
    }
    builder.sink(Sink::error_reporting()).build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use opentelemetry::logs::{AnyValue, Severity};
    use opentelemetry_sdk::testing::logs::InMemoryLogsExporter;
    use std::collections::HashMap;
    use std::io;
    use std::sync::Mutex;
    use tracing_subscriber::fmt::MakeWriter;

    #[derive(Clone, Default)]
    struct Buffer(Arc<Mutex<Vec<u8>>>);

    impl Buffer {
        fn contents(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    impl io::Write for Buffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for Buffer {
        type Writer = Buffer;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    struct BrokenWriter;

    impl io::Write for BrokenWriter {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
        }
    }

    fn console(filter: &str, buffer: &Buffer) -> Sink {
        Sink::Console {
            format: ConsoleFormat::Json,
            filter: filter.to_string(),
            writer: BoxMakeWriter::new(buffer.clone()),
        }
    }

    fn provider(exporter: &InMemoryLogsExporter) -> LoggerProvider {
        LoggerProvider::builder()
            .with_simple_exporter(exporter.clone())
            .build()
    }

    fn bridge(exporter: &InMemoryLogsExporter) -> Sink {
        Sink::TelemetryBridge {
            provider: provider(exporter),
            scope: TELEMETRY_SCOPE,
        }
    }

    #[test]
    fn test_console_sink_writes_json_lines() {
        let buffer = Buffer::default();
        let logger = LoggerBuilder::new().sink(console("info", &buffer)).build();

        logger.in_scope(|| tracing::info!(order_id = 42, "order placed"));

        let line = buffer.contents();
        let json: serde_json::Value = serde_json::from_str(line.trim()).unwrap();
        assert_eq!(json["level"], "INFO");
        assert_eq!(json["fields"]["message"], "order placed");
        assert_eq!(json["fields"]["order_id"], 42);
    }

    #[test]
    fn test_console_sink_applies_its_filter() {
        let buffer = Buffer::default();
        let logger = LoggerBuilder::new().sink(console("warn", &buffer)).build();

        logger.log(Level::INFO, "quiet");
        logger.log(Level::WARN, "loud");

        let contents = buffer.contents();
        assert!(!contents.contains("quiet"));
        assert!(contents.contains("loud"));
    }

    #[test]
    fn test_invalid_filter_falls_back_to_info() {
        let buffer = Buffer::default();
        let logger = LoggerBuilder::new()
            .sink(console("=[not a filter", &buffer))
            .build();

        logger.log(Level::DEBUG, "hidden");
        logger.log(Level::INFO, "shown");

        let contents = buffer.contents();
        assert!(!contents.contains("hidden"));
        assert!(contents.contains("shown"));
    }

    #[test]
    fn test_error_sink_only_captures_errors() {
        let logger = LoggerBuilder::new().sink(Sink::error_reporting()).build();

        let events = sentry::test::with_captured_events(|| {
            logger.log(Level::INFO, "started");
            logger.log(Level::WARN, "slow query");
            logger.log(Level::ERROR, "database unreachable");
        });

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].level, sentry::Level::Error);
        assert_eq!(events[0].message.as_deref(), Some("database unreachable"));
    }

    #[test]
    fn test_bridge_forwards_under_fixed_scope() {
        let exporter = InMemoryLogsExporter::default();
        let logger = LoggerBuilder::new().sink(bridge(&exporter)).build();

        logger.in_scope(|| tracing::warn!(attempt = 3, "retrying payment"));

        let logs = exporter.get_emitted_logs().unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].instrumentation.name, TELEMETRY_SCOPE);
        assert_eq!(logs[0].record.severity_number, Some(Severity::Warn));
        assert_eq!(
            logs[0].record.body,
            Some(AnyValue::from("retrying payment".to_string()))
        );
    }

    #[test]
    fn test_fanout_reaches_every_sink_in_order() {
        let buffer = Buffer::default();
        let exporter = InMemoryLogsExporter::default();
        let logger = LoggerBuilder::new()
            .sink(console("info", &buffer))
            .sink(bridge(&exporter))
            .sink(Sink::error_reporting())
            .build();

        assert_eq!(
            logger.sink_kinds(),
            &["console", "telemetry", "error-reporting"]
        );

        let events = sentry::test::with_captured_events(|| {
            logger.log(Level::ERROR, "payment failed");
        });

        assert!(buffer.contents().contains("payment failed"));
        assert_eq!(exporter.get_emitted_logs().unwrap().len(), 1);
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn test_failing_sink_does_not_block_others() {
        let exporter = InMemoryLogsExporter::default();
        let logger = LoggerBuilder::new()
            .sink(Sink::Console {
                format: ConsoleFormat::Compact,
                filter: "trace".into(),
                writer: BoxMakeWriter::new(|| BrokenWriter),
            })
            .sink(bridge(&exporter))
            .build();

        logger.log(Level::INFO, "still delivered");

        assert_eq!(exporter.get_emitted_logs().unwrap().len(), 1);
    }

    #[test]
    fn test_bridge_skips_sdk_internal_events() {
        let exporter = InMemoryLogsExporter::default();
        let logger = LoggerBuilder::new().sink(bridge(&exporter)).build();

        logger.in_scope(|| tracing::info!(target: "opentelemetry_sdk", "export done"));

        assert!(exporter.get_emitted_logs().unwrap().is_empty());
    }

    #[test]
    fn test_create_logger_sinks() {
        let logger = create_logger("info");
        assert_eq!(logger.sink_kinds(), &["console", "error-reporting"]);
    }

    #[test]
    fn test_telemetry_logger_without_tracing_has_no_span_sink() {
        let ctx = TelemetryContext::new(HashMap::new());
        let logger = create_logger_with_telemetry(&ctx, "info");
        assert_eq!(
            logger.sink_kinds(),
            &["console", "telemetry", "error-reporting"]
        );
    }

    #[test]
    fn test_telemetry_logger_forwards_into_installed_provider() {
        let exporter = InMemoryLogsExporter::default();
        let ctx = TelemetryContext::new(HashMap::new());
        ctx.install_logger_provider(provider(&exporter));

        let logger = create_logger_with_telemetry(&ctx, "info");
        logger.log(Level::INFO, "order shipped");

        let logs = exporter.get_emitted_logs().unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].instrumentation.name, TELEMETRY_SCOPE);
        assert_eq!(
            logs[0].record.body,
            Some(AnyValue::from("order shipped".to_string()))
        );
    }
}
