use std::time::Duration;

pub(crate) mod daemonizer;
mod errors;
pub(crate) mod launch;
mod lock;
pub(crate) mod shutdown;

pub use daemonizer::{DaemonizeError, Daemonizer, SystemDaemonizer};
pub use errors::{LaunchError, LockError};
pub use launch::{DaemonDeps, LaunchMode, RunningDaemon, run_daemon, start_daemon};
pub use lock::{InstanceLock, LivenessProbe, LockOutcome, LockPolicy, LockRecord, LockSnapshot};
pub use shutdown::{FlagShutdownSignal, ShutdownError, ShutdownSignal, SystemShutdownSignal};

#[cfg(test)]
pub(crate) use lock::MockLivenessProbe;

pub(crate) const PROCESS_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::process");
pub(crate) const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);
