use std::io;
use std::thread;
use std::time::Duration;

use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGQUIT, SIGTERM};
use signal_hook::iterator::Signals;
use thiserror::Error;
use tracing::info;

use crate::state::RunState;

use super::PROCESS_TARGET;

/// How often the run loop checks the running flag.
pub(crate) const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Abstraction over shutdown notification mechanisms.
pub trait ShutdownSignal: Send + Sync {
    /// Blocks until `state` reports a stop, requesting one when a shutdown
    /// notification arrives.
    fn wait(&self, state: &RunState) -> Result<(), ShutdownError>;
}

/// Errors reported by shutdown signal listeners.
#[derive(Debug, Error)]
pub enum ShutdownError {
    /// Installing signal handlers failed.
    #[error("failed to install signal handlers: {source}")]
    Install {
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
}

/// Shutdown listener that turns termination signals into stop requests.
///
/// A helper thread forwards `SIGTERM`, `SIGINT`, `SIGQUIT` and `SIGHUP` to
/// the running flag; the calling thread polls the flag. A `stop` call
/// reaches the flag directly.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemShutdownSignal;

impl ShutdownSignal for SystemShutdownSignal {
    fn wait(&self, state: &RunState) -> Result<(), ShutdownError> {
        let mut signals = Signals::new([SIGTERM, SIGINT, SIGQUIT, SIGHUP])
            .map_err(|source| ShutdownError::Install { source })?;
        let signal_handle = signals.handle();
        let forwarded = state.clone();
        let listener = thread::spawn(move || {
            if let Some(signal) = signals.forever().next() {
                info!(target: PROCESS_TARGET, signal, "shutdown signal received");
                forwarded.request_stop();
            }
        });
        poll_until_stopped(state);
        signal_handle.close();
        let _ = listener.join();
        Ok(())
    }
}

/// Shutdown listener that only observes the running flag.
#[derive(Debug, Clone, Copy, Default)]
pub struct FlagShutdownSignal;

impl ShutdownSignal for FlagShutdownSignal {
    fn wait(&self, state: &RunState) -> Result<(), ShutdownError> {
        poll_until_stopped(state);
        Ok(())
    }
}

fn poll_until_stopped(state: &RunState) {
    while state.is_running() {
        thread::sleep(POLL_INTERVAL);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use super::*;

    #[test]
    fn flag_signal_returns_once_a_stop_is_requested() {
        let state = RunState::new();
        let stopper = state.clone();
        let started = Instant::now();
        let waiter = thread::spawn(move || FlagShutdownSignal.wait(&state));
        thread::sleep(Duration::from_millis(150));
        stopper.request_stop();
        waiter
            .join()
            .expect("waiter thread")
            .expect("wait succeeds");
        assert!(started.elapsed() >= Duration::from_millis(150));
    }
}
