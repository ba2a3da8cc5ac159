//! The wallet daemon.
//!
//! One `walletd` process owns a data directory. It elects itself through an
//! instance lock, serves JSON-RPC on loopback and runs every operation on a
//! single scheduler thread, so wallet sessions and the network are never
//! touched concurrently.
//!
//! ## Request path
//!
//! 1. The [`rpc`] front door authenticates the caller and decodes the
//!    JSON-RPC envelope into a [`dispatch::PendingInvocation`].
//! 2. [`dispatch::dispatch`] resolves the name in the [`registry`], binds the
//!    parameters to the declared contract and enforces the operation's
//!    requirements: a loaded wallet, a network, the wallet password.
//! 3. The body from [`operations`] runs on the [`scheduler`] thread against
//!    the [`state::DaemonCore`].
//!
//! A failed requirement is an answer, not a fault: callers receive
//! `{"error": "wallet not loaded"}` with HTTP 200. Malformed calls, unknown
//! names and rejected credentials are transport faults.
//!
//! ## Lifecycle
//!
//! [`run_daemon`] loads the configuration, installs telemetry, takes the
//! instance lock, starts the scheduler and listeners, and records the bound
//! address in the lock file. It then waits for a termination signal or a
//! `stop` call and tears everything down in reverse.

pub mod bootstrap;
pub mod cli;
pub mod dispatch;
pub mod health;
pub mod network;
pub mod operations;
pub mod process;
pub mod registry;
pub mod rpc;
pub mod scheduler;
pub mod sessions;
pub mod state;
pub mod telemetry;
pub mod watchtower;

/// Version reported by the `version` operation.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use bootstrap::{
    BootstrapError, Bootstrapped, ConfigLoader, StaticConfigLoader, SystemConfigLoader,
    bootstrap_with,
};
pub use health::{HealthReporter, StructuredHealthReporter};
pub use process::{DaemonDeps, LaunchError, LaunchMode, RunningDaemon, run_daemon, start_daemon};
pub use telemetry::{TelemetryError, TelemetryHandle};

#[cfg(test)]
mod tests;
