use std::io;
use std::time::Duration;

use thiserror::Error;

/// Failures of the hand-off between callers and the scheduler thread.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// The scheduler is not running, or stopped before answering.
    #[error("scheduler is not running")]
    SchedulerUnavailable,
    /// No result arrived within the caller's budget. The work keeps running.
    #[error("no result within {}ms", timeout.as_millis())]
    Timeout {
        /// Budget that elapsed.
        timeout: Duration,
    },
    /// A blocking wait was attempted from the scheduler thread itself.
    #[error("blocking wait on the scheduler thread would deadlock")]
    ReentrantWait,
    /// The scheduler thread or its runtime could not be started.
    #[error("failed to start scheduler: {source}")]
    Start {
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The scheduler thread panicked.
    #[error("scheduler thread panicked")]
    ThreadPanic,
}
