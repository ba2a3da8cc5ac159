//! Defines the unified error surface for daemon launch and supervision.

use std::io;
use std::path::PathBuf;

use thiserror::Error;
use walletd_config::ConfigError;

use crate::bootstrap::BootstrapError;
use crate::registry::RegistryError;
use crate::rpc::{ClientError, ListenerError};
use crate::scheduler::BridgeError;

use super::daemonizer::DaemonizeError;
use super::shutdown::ShutdownError;

/// Errors raised while electing the daemon through the instance lock.
#[derive(Debug, Error)]
pub enum LockError {
    /// Creating the lock file failed for a reason other than contention.
    #[error("failed to create lock file '{path}': {source}")]
    Create {
        /// Lock file path.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Reading an existing lock failed.
    #[error("failed to read lock file '{path}': {source}")]
    Inspect {
        /// Lock file path.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Removing a stale lock failed.
    #[error("failed to remove stale lock file '{path}': {source}")]
    Remove {
        /// Lock file path.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Writing the listener address into the lock failed.
    #[error("failed to write lock file '{path}': {source}")]
    Write {
        /// Lock file path.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Another process kept a young lock for every attempt.
    #[error("lock file '{path}' is held by another starting daemon after {attempts} attempts")]
    Contended {
        /// Lock file path.
        path: PathBuf,
        /// Attempts made.
        attempts: u32,
    },
}

/// Errors surfaced while launching or supervising the daemon process.
#[derive(Debug, Error)]
pub enum LaunchError {
    /// Bootstrapping the daemon failed.
    #[error("daemon bootstrap failed: {source}")]
    Bootstrap {
        /// Underlying bootstrap error.
        #[source]
        source: BootstrapError,
    },
    /// The instance lock could not be settled.
    #[error("instance lock failed: {source}")]
    Lock {
        /// Underlying lock error.
        #[source]
        source: LockError,
    },
    /// A daemon already answers for this data directory.
    #[error("daemon already running at {address}")]
    AlreadyRunning {
        /// Address recorded in the lock.
        address: String,
    },
    /// RPC credentials could not be persisted.
    #[error("failed to persist RPC credentials: {source}")]
    Credentials {
        /// Underlying configuration error.
        #[source]
        source: ConfigError,
    },
    /// The operation table failed validation.
    #[error("invalid operation table: {source}")]
    Registry {
        /// Underlying registry error.
        #[source]
        source: RegistryError,
    },
    /// The scheduler could not be started or reached.
    #[error("scheduler failed: {source}")]
    Scheduler {
        /// Underlying bridge error.
        #[source]
        source: BridgeError,
    },
    /// A listener could not be started.
    #[error("daemon listener failed: {source}")]
    Listener {
        /// Underlying listener error.
        #[source]
        source: ListenerError,
    },
    /// The liveness probe could not be built.
    #[error("failed to build liveness probe: {source}")]
    Probe {
        /// Underlying client error.
        #[source]
        source: ClientError,
    },
    /// Daemonisation failed.
    #[error("failed to daemonise: {source}")]
    Daemonize {
        /// Underlying daemonisation error.
        #[source]
        source: DaemonizeError,
    },
    /// Waiting for shutdown failed.
    #[error("failed to await shutdown signal: {source}")]
    Shutdown {
        /// Underlying shutdown error.
        #[source]
        source: ShutdownError,
    },
}

impl From<BootstrapError> for LaunchError {
    fn from(source: BootstrapError) -> Self {
        Self::Bootstrap { source }
    }
}

impl From<LockError> for LaunchError {
    fn from(source: LockError) -> Self {
        Self::Lock { source }
    }
}

impl From<RegistryError> for LaunchError {
    fn from(source: RegistryError) -> Self {
        Self::Registry { source }
    }
}

impl From<BridgeError> for LaunchError {
    fn from(source: BridgeError) -> Self {
        Self::Scheduler { source }
    }
}

impl From<ListenerError> for LaunchError {
    fn from(source: ListenerError) -> Self {
        Self::Listener { source }
    }
}

impl From<ClientError> for LaunchError {
    fn from(source: ClientError) -> Self {
        Self::Probe { source }
    }
}

impl From<DaemonizeError> for LaunchError {
    fn from(source: DaemonizeError) -> Self {
        Self::Daemonize { source }
    }
}

impl From<ShutdownError> for LaunchError {
    fn from(source: ShutdownError) -> Self {
        Self::Shutdown { source }
    }
}
