//! A daemon core running on a real scheduler, without listeners.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use rstest::fixture;
use serde_json::{Value, json};
use tempfile::TempDir;
use walletd_config::Config;

use crate::dispatch::{
    CommandRunner, DispatchError, DispatchOutcome, Params, PendingInvocation, dispatch,
};
use crate::registry::Registry;
use crate::scheduler::Scheduler;
use crate::sessions::{FileStorageProvider, WalletDocument};
use crate::state::{DaemonCore, RunState, SystemCollaborators};

pub(crate) const TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Scheduler-backed core rooted in a temporary data directory.
pub(crate) struct CoreHarness {
    runner: CommandRunner,
    scheduler: Scheduler<DaemonCore>,
    run_state: RunState,
    config: Config,
    _dir: TempDir,
}

impl CoreHarness {
    /// Starts a core with the built-in operations.
    pub(crate) fn start(offline: bool) -> Self {
        let registry = Registry::builtin().expect("builtin registry");
        Self::with_registry(registry, offline)
    }

    /// Starts a core serving `registry`.
    pub(crate) fn with_registry(registry: Registry, offline: bool) -> Self {
        let dir = tempfile::tempdir().expect("temp dir");
        let config = Config::in_dir(dir.path()).with_offline(offline);
        let registry = Arc::new(registry);
        let run_state = RunState::new();
        let scheduler = {
            let registry = Arc::clone(&registry);
            let config = config.clone();
            let run_state = run_state.clone();
            Scheduler::start("walletd-test", move |_handle| {
                let core = DaemonCore::new(registry, config, run_state, &SystemCollaborators);
                core.start();
                core
            })
            .expect("scheduler starts")
        };
        let runner = CommandRunner::new(scheduler.handle(), registry, Some(TEST_TIMEOUT));
        Self {
            runner,
            scheduler,
            run_state,
            config,
            _dir: dir,
        }
    }

    pub(crate) fn runner(&self) -> &CommandRunner {
        &self.runner
    }

    pub(crate) fn run_state(&self) -> &RunState {
        &self.run_state
    }

    pub(crate) fn data_dir(&self) -> &Path {
        self.config.data_dir()
    }

    /// Runs `method` with JSON `params` through the runner.
    pub(crate) fn run(&self, method: &str, params: Value) -> Result<Value, DispatchError> {
        let params: Params = serde_json::from_value(params).expect("params shape");
        self.runner.run(PendingInvocation::new(method, params))
    }

    /// Dispatches `invocation` and returns the unrendered outcome.
    pub(crate) fn dispatch(
        &self,
        invocation: PendingInvocation,
    ) -> Result<DispatchOutcome, DispatchError> {
        self.scheduler
            .handle()
            .submit_and_wait(move |core| dispatch(core, invocation), Some(TEST_TIMEOUT))
            .expect("scheduler answers")
    }

    /// Runs `inspect` against the core on the scheduler thread.
    pub(crate) fn with_core<T, F>(&self, inspect: F) -> T
    where
        F: FnOnce(&DaemonCore) -> T + Send + 'static,
        T: Send + 'static,
    {
        self.scheduler
            .handle()
            .submit_and_wait(move |core| async move { inspect(&core) }, Some(TEST_TIMEOUT))
            .expect("scheduler answers")
    }

    /// Writes a wallet named `name` into the wallets directory.
    ///
    /// The wallet stores its own name under the `label` item.
    pub(crate) fn create_wallet(&self, name: &str, password: Option<&str>) -> PathBuf {
        let path = self.config.wallets_dir().join(name);
        let mut document = WalletDocument::default();
        document.items.insert("label".to_owned(), json!(name));
        FileStorageProvider::create(&path, &document, password).expect("wallet written");
        path
    }
}

#[fixture]
pub(crate) fn core_harness() -> CoreHarness {
    CoreHarness::start(true)
}

#[fixture]
pub(crate) fn online_harness() -> CoreHarness {
    CoreHarness::start(false)
}
