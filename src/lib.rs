//! Service telemetry: process-wide tracing, logging, metrics and error
//! reporting bootstrap.
//!
//! A host calls the initializers once at startup, in this order, and keeps the
//! returned shutdown handles until process exit:
//!
//! ```no_run
//! use service_telemetry::context::TelemetryContext;
//! use service_telemetry::observability::{logger, metrics, reporting, tracer};
//!
//! # async fn boot() -> Result<(), service_telemetry::error::TelemetryError> {
//! let ctx = TelemetryContext::from_process_env();
//! let tracing_shutdown = tracer::init_tracing(&ctx, "orders")?;
//! let reporting_shutdown = reporting::init_error_reporting(&ctx);
//! logger::create_logger_with_telemetry(&ctx, "info").install_global()?;
//! let meter = metrics::get_meter();
//! # let _ = meter;
//!
//! reporting_shutdown.shutdown();
//! tracing_shutdown.shutdown();
//! # Ok(())
//! # }
//! ```
//!
//! # Modules
//!
//! - [`config`]: Environment resolution and host CLI configuration
//! - [`context`]: Owner of the installed process-wide handles
//! - [`error`]: Bootstrap error type
//! - [`observability`]: Tracer, reporting, logger and meter initializers
//! - [`responder`]: HTTP error responses that report to the error backend

// Lint configuration
#![warn(clippy::all)]
#![allow(
    clippy::module_name_repetitions, // observability::tracer::TracerSettings is fine
    clippy::must_use_candidate,      // Not all functions need #[must_use]
    clippy::missing_errors_doc,      // Error docs can be verbose
    clippy::missing_panics_doc       // Panic docs can be verbose
)]

pub mod config;
pub mod context;
pub mod error;
pub mod observability;
pub mod responder;
