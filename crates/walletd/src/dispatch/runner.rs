use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use crate::registry::Registry;
use crate::scheduler::SchedulerHandle;
use crate::state::DaemonCore;

use super::enforcer::dispatch;
use super::errors::DispatchError;
use super::invocation::PendingInvocation;

/// Runs commands from a synchronous caller through the scheduler.
///
/// Used by consoles and test harnesses living on their own thread. Each call
/// blocks until the command finishes or the timeout elapses.
#[derive(Debug, Clone)]
pub struct CommandRunner {
    handle: SchedulerHandle<DaemonCore>,
    registry: Arc<Registry>,
    timeout: Option<Duration>,
}

impl CommandRunner {
    /// Builds a runner that waits at most `timeout` per command.
    #[must_use]
    pub fn new(
        handle: SchedulerHandle<DaemonCore>,
        registry: Arc<Registry>,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            handle,
            registry,
            timeout,
        }
    }

    /// Runs `invocation` and returns its rendered result.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError`] when the call faults or the bridge fails.
    pub fn run(&self, invocation: PendingInvocation) -> Result<Value, DispatchError> {
        let timeout = self.timeout;
        let outcome = self
            .handle
            .submit_and_wait(move |core| dispatch(core, invocation), timeout)??;
        Ok(outcome.into_value())
    }

    /// Runs `invocation`, asking `prompt` for a password when one is needed.
    ///
    /// The prompt is consulted only when the command demands a password, the
    /// bound wallet has one and none was supplied. A `None` answer aborts the
    /// command and yields `Ok(None)`.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError`] when the call faults or the bridge fails.
    pub fn run_with_prompt<F>(
        &self,
        invocation: PendingInvocation,
        prompt: F,
    ) -> Result<Option<Value>, DispatchError>
    where
        F: FnOnce() -> Option<String>,
    {
        let descriptor = self.registry.lookup(invocation.method())?;
        if !descriptor.needs_password_if_set() || invocation.password().is_some() {
            return self.run(invocation).map(Some);
        }
        let selector: Option<PathBuf> = invocation.wallet_path().cloned();
        let protected = self.handle.submit_and_wait(
            move |core| async move {
                core.bind_session(selector.as_deref())
                    .is_some_and(|session| session.wallet().has_password())
            },
            self.timeout,
        )?;
        if !protected {
            return self.run(invocation).map(Some);
        }
        match prompt() {
            Some(password) => self.run(invocation.with_password(Some(password))).map(Some),
            None => Ok(None),
        }
    }
}
