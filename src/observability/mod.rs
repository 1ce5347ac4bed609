//! Telemetry initializers.
//!
//! Provides:
//! - Tracer bootstrap with OTLP export and context propagation
//! - Error-reporting bootstrap
//! - Fan-out structured logger
//! - OTLP log export for the logger's telemetry bridge
//! - Meter accessor and metrics provider bootstrap
//! - Outbound HTTP transport instrumentation

pub mod logger;
pub mod logs;
pub mod metrics;
pub mod reporting;
pub mod shutdown;
pub mod tracer;
pub mod transport;

pub use shutdown::ShutdownHandle;

/// Whether the caller runs on a single-threaded Tokio runtime.
///
/// Batch processors spawned onto such a runtime stall while a shutdown blocks
/// its only thread, so they are given a dedicated thread instead.
pub(crate) fn is_current_thread_runtime() -> bool {
    tokio::runtime::Handle::try_current()
        .is_ok_and(|handle| handle.runtime_flavor() == tokio::runtime::RuntimeFlavor::CurrentThread)
}
