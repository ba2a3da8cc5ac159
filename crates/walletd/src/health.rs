//! Structured health reporting for daemon lifecycle events.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use walletd_config::Config;

use crate::bootstrap::BootstrapError;
use crate::process::LockRecord;

const HEALTH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::health");

/// Observer trait used to surface lifecycle events to telemetry sinks.
pub trait HealthReporter: Send + Sync {
    /// Invoked before configuration loading begins.
    fn bootstrap_starting(&self);

    /// Invoked after bootstrap completes successfully.
    fn bootstrap_succeeded(&self, config: &Config);

    /// Invoked when bootstrap fails.
    fn bootstrap_failed(&self, error: &BootstrapError);

    /// Invoked once this process holds the instance lock.
    fn lock_acquired(&self, path: &Path);

    /// Invoked when another daemon already answers for the data directory.
    fn daemon_already_running(&self, record: &LockRecord);

    /// Invoked when a listener accepts connections.
    fn listener_ready(&self, name: &str, address: SocketAddr);

    /// Invoked when the shutdown sequence begins.
    fn shutdown_started(&self);

    /// Invoked after the shutdown sequence completes.
    fn shutdown_completed(&self);
}

impl<T> HealthReporter for Arc<T>
where
    T: HealthReporter + ?Sized,
{
    fn bootstrap_starting(&self) {
        (**self).bootstrap_starting();
    }

    fn bootstrap_succeeded(&self, config: &Config) {
        (**self).bootstrap_succeeded(config);
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        (**self).bootstrap_failed(error);
    }

    fn lock_acquired(&self, path: &Path) {
        (**self).lock_acquired(path);
    }

    fn daemon_already_running(&self, record: &LockRecord) {
        (**self).daemon_already_running(record);
    }

    fn listener_ready(&self, name: &str, address: SocketAddr) {
        (**self).listener_ready(name, address);
    }

    fn shutdown_started(&self) {
        (**self).shutdown_started();
    }

    fn shutdown_completed(&self) {
        (**self).shutdown_completed();
    }
}

/// Default reporter that records lifecycle events using `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuredHealthReporter;

impl StructuredHealthReporter {
    /// Builds a new reporter.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl HealthReporter for StructuredHealthReporter {
    fn bootstrap_starting(&self) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "bootstrap_starting",
            "starting daemon bootstrap"
        );
    }

    fn bootstrap_succeeded(&self, config: &Config) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "bootstrap_succeeded",
            data_dir = %config.data_dir().display(),
            offline = config.offline(),
            log_filter = %config.log_filter(),
            log_format = %config.log_format(),
            "daemon bootstrap completed"
        );
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        tracing::error!(
            target: HEALTH_TARGET,
            event = "bootstrap_failed",
            error = %error,
            "daemon bootstrap failed"
        );
    }

    fn lock_acquired(&self, path: &Path) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "lock_acquired",
            file = %path.display(),
            "instance lock acquired"
        );
    }

    fn daemon_already_running(&self, record: &LockRecord) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "daemon_already_running",
            address = %record.url(),
            "another daemon holds the instance lock"
        );
    }

    fn listener_ready(&self, name: &str, address: SocketAddr) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "listener_ready",
            listener = name,
            address = %address,
            "listener ready"
        );
    }

    fn shutdown_started(&self) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "shutdown_started",
            "daemon shutting down"
        );
    }

    fn shutdown_completed(&self) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "shutdown_completed",
            "daemon stopped"
        );
    }
}
