//! Shutdown handles returned by the initializers.

use std::fmt;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

/// Upper bound on waiting for a telemetry provider to flush and stop.
pub const PROVIDER_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Teardown for one bootstrapped subsystem.
///
/// Consumed on use, so a subsystem is torn down at most once. A handle from an
/// initializer that skipped real work is a no-op and is always safe to call.
#[must_use = "keep the handle and call shutdown() at process exit"]
pub struct ShutdownHandle {
    name: &'static str,
    action: Option<Box<dyn FnOnce() + Send>>,
}

impl ShutdownHandle {
    /// Wrap a teardown closure for the named subsystem.
    pub fn new<F>(name: &'static str, action: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            name,
            action: Some(Box::new(action)),
        }
    }

    /// A handle that does nothing.
    pub fn noop(name: &'static str) -> Self {
        Self { name, action: None }
    }

    /// Subsystem this handle tears down.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Whether calling [`shutdown`](Self::shutdown) performs any work.
    pub fn is_noop(&self) -> bool {
        self.action.is_none()
    }

    /// Run the teardown.
    pub fn shutdown(mut self) {
        if let Some(action) = self.action.take() {
            tracing::debug!(subsystem = self.name, "Shutting down");
            action();
        }
    }
}

impl fmt::Debug for ShutdownHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShutdownHandle")
            .field("name", &self.name)
            .field("noop", &self.is_noop())
            .finish()
    }
}

/// Run `f` on its own thread and wait at most `timeout` for its result.
///
/// Returns `None` if the wait timed out or the thread could not be started.
/// A timed-out thread is left to finish on its own.
pub fn run_bounded<T, F>(name: &'static str, timeout: Duration, f: F) -> Option<T>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    let (tx, rx) = mpsc::channel();
    let spawned = thread::Builder::new()
        .name(format!("{name}-shutdown"))
        .spawn(move || {
            let _ = tx.send(f());
        });
    if let Err(e) = spawned {
        tracing::error!(subsystem = name, error = %e, "Failed to start shutdown thread");
        return None;
    }

    match rx.recv_timeout(timeout) {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(
                subsystem = name,
                timeout_ms = timeout.as_millis() as u64,
                "Shutdown did not finish in time, continuing"
            );
            None
        }
    }
}
