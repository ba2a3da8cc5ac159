//! Supervises daemon launch sequencing and shutdown.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};
use walletd_config::{Config, ConfigOverrides};

use crate::bootstrap::{ConfigLoader, SystemConfigLoader, bootstrap_with};
use crate::dispatch::CommandRunner;
use crate::health::{HealthReporter, StructuredHealthReporter};
use crate::registry::Registry;
use crate::rpc::{
    ListenerError, ListenerHandle, RpcCredentials, RpcProbe, RpcSettings, start_rpc_server,
};
use crate::scheduler::{Scheduler, SchedulerHandle};
use crate::state::{Collaborators, DaemonCore, RunState, SystemCollaborators};
use crate::watchtower::start_watchtower;

use super::daemonizer::{Daemonizer, SystemDaemonizer};
use super::errors::LaunchError;
use super::lock::{InstanceLock, LivenessProbe, LockOutcome, LockPolicy};
use super::shutdown::{ShutdownSignal, SystemShutdownSignal};
use super::{PROCESS_TARGET, SHUTDOWN_TIMEOUT};

const SCHEDULER_THREAD: &str = concat!(env!("CARGO_PKG_NAME"), "-scheduler");

/// Launch mode for the daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchMode {
    /// Fork into the background and detach from the controlling terminal.
    Background,
    /// Remain attached to the terminal.
    Foreground,
}

impl LaunchMode {
    /// Mode selected by the `--detach` flag.
    #[must_use]
    pub const fn from_detach(detach: bool) -> Self {
        if detach {
            Self::Background
        } else {
            Self::Foreground
        }
    }
}

/// Process-level collaborators needed to control daemon lifecycle.
pub(crate) struct ProcessControl<D, S> {
    pub(crate) mode: LaunchMode,
    pub(crate) daemonizer: D,
    pub(crate) shutdown: S,
}

/// Service dependencies required to construct the daemon runtime.
pub(crate) struct ServiceDeps<L> {
    pub(crate) loader: L,
    pub(crate) daemon: DaemonDeps,
}

/// Collaborators required to launch the daemon runtime.
pub(crate) struct LaunchPlan<L, D, S> {
    pub(crate) process: ProcessControl<D, S>,
    pub(crate) services: ServiceDeps<L>,
}

/// Collaborators of a running daemon.
pub struct DaemonDeps {
    /// Lifecycle observer.
    pub reporter: Arc<dyn HealthReporter>,
    /// Storage, network and sweep store factory.
    pub collaborators: Box<dyn Collaborators>,
    /// Probe used when the lock is already held.
    pub probe: Box<dyn LivenessProbe>,
}

impl DaemonDeps {
    /// Production collaborators.
    ///
    /// # Errors
    ///
    /// Returns [`LaunchError::Probe`] when the liveness probe cannot be built.
    pub fn system() -> Result<Self, LaunchError> {
        Ok(Self {
            reporter: Arc::new(StructuredHealthReporter::new()),
            collaborators: Box::new(SystemCollaborators),
            probe: Box::new(RpcProbe::new()?),
        })
    }
}

/// Runs the daemon with the production collaborators until it is stopped.
///
/// # Errors
///
/// Returns [`LaunchError::AlreadyRunning`] when another daemon answers for
/// the data directory, and any other [`LaunchError`] when start-up or
/// shutdown fails.
pub fn run_daemon(overrides: ConfigOverrides, mode: LaunchMode) -> Result<(), LaunchError> {
    let plan = LaunchPlan {
        process: ProcessControl {
            mode,
            daemonizer: SystemDaemonizer,
            shutdown: SystemShutdownSignal,
        },
        services: ServiceDeps {
            loader: SystemConfigLoader::new(overrides),
            daemon: DaemonDeps::system()?,
        },
    };
    run_daemon_with(plan)
}

/// Runs the daemon with injected collaborators.
pub(crate) fn run_daemon_with<L, D, S>(plan: LaunchPlan<L, D, S>) -> Result<(), LaunchError>
where
    L: ConfigLoader,
    D: Daemonizer,
    S: ShutdownSignal,
{
    let LaunchPlan { process, services } = plan;
    let ProcessControl {
        mode,
        daemonizer,
        shutdown,
    } = process;
    let ServiceDeps { loader, daemon } = services;

    info!(target: PROCESS_TARGET, ?mode, "starting daemon runtime");
    let config = bootstrap_with(&loader, &daemon.reporter)?.into_config();
    let lock = elect(&config, &daemon)?;
    if matches!(mode, LaunchMode::Background) {
        daemonizer.daemonize(config.data_dir())?;
    }
    let running = RunningDaemon::launch(config, lock, daemon)?;
    shutdown.wait(running.run_state())?;
    running.stop()
}

/// Elects this process as the daemon and starts it.
///
/// The caller owns the returned daemon and must keep it alive; dropping it
/// runs the shutdown sequence.
///
/// # Errors
///
/// Returns [`LaunchError::AlreadyRunning`] when another daemon answers for
/// the data directory, and any other [`LaunchError`] when start-up fails.
pub fn start_daemon(config: Config, deps: DaemonDeps) -> Result<RunningDaemon, LaunchError> {
    let lock = elect(&config, &deps)?;
    RunningDaemon::launch(config, lock, deps)
}

fn elect(config: &Config, deps: &DaemonDeps) -> Result<InstanceLock, LaunchError> {
    let policy = LockPolicy::with_grace(config.lock_grace());
    match InstanceLock::acquire(&config.lock_path(), policy, deps.probe.as_ref())? {
        LockOutcome::Acquired(lock) => {
            deps.reporter.lock_acquired(lock.path());
            Ok(lock)
        }
        LockOutcome::Running(record) => {
            deps.reporter.daemon_already_running(&record);
            Err(LaunchError::AlreadyRunning {
                address: record.url(),
            })
        }
    }
}

/// A daemon holding the instance lock and serving requests.
pub struct RunningDaemon {
    scheduler: Option<Scheduler<DaemonCore>>,
    rpc: Option<ListenerHandle>,
    watchtower: Option<ListenerHandle>,
    lock: Option<InstanceLock>,
    lock_path: PathBuf,
    registry: Arc<Registry>,
    run_state: RunState,
    credentials: RpcCredentials,
    address: SocketAddr,
    timeout: Duration,
    reporter: Arc<dyn HealthReporter>,
}

impl RunningDaemon {
    fn launch(
        mut config: Config,
        lock: InstanceLock,
        deps: DaemonDeps,
    ) -> Result<Self, LaunchError> {
        let DaemonDeps {
            reporter,
            collaborators,
            probe: _,
        } = deps;
        let credentials = RpcCredentials::ensure(&mut config)
            .map_err(|source| LaunchError::Credentials { source })?;
        let registry = Arc::new(Registry::builtin()?);
        let run_state = RunState::new();
        let timeout = config.request_timeout();
        let settings = RpcSettings {
            host: config.rpc_host().to_owned(),
            port: config.rpc_port(),
            credentials: credentials.clone(),
            timeout,
        };
        let watchtower = config
            .watchtower()
            .map(|(host, port)| (host.to_owned(), port));

        let scheduler = {
            let registry = Arc::clone(&registry);
            let run_state = run_state.clone();
            Scheduler::start(SCHEDULER_THREAD, move |_handle| {
                let core = DaemonCore::new(registry, config, run_state, collaborators.as_ref());
                core.start();
                core
            })?
        };
        let handle = scheduler.handle();

        let rpc = start_listener(&handle, timeout, move |core, handle| async move {
            let listener = start_rpc_server(settings, handle).await?;
            core.set_rpc_address(listener.address());
            Ok(listener)
        })?;
        reporter.listener_ready(rpc.name(), rpc.address());

        let watchtower = match watchtower {
            Some((host, port)) => {
                let listener = start_listener(&handle, timeout, move |_core, handle| async move {
                    start_watchtower(&host, port, handle, timeout).await
                })?;
                reporter.listener_ready(listener.name(), listener.address());
                Some(listener)
            }
            None => None,
        };

        lock.record(rpc.address())?;
        let address = rpc.address();
        Ok(Self {
            scheduler: Some(scheduler),
            rpc: Some(rpc),
            watchtower,
            lock_path: lock.path().to_path_buf(),
            lock: Some(lock),
            registry,
            run_state,
            credentials,
            address,
            timeout,
            reporter,
        })
    }

    /// Address of the JSON-RPC listener.
    #[must_use]
    pub const fn address(&self) -> SocketAddr {
        self.address
    }

    /// Address of the watch-tower listener, when one runs.
    #[must_use]
    pub fn watchtower_address(&self) -> Option<SocketAddr> {
        self.watchtower.as_ref().map(ListenerHandle::address)
    }

    /// Credentials accepted by the JSON-RPC listener.
    #[must_use]
    pub const fn credentials(&self) -> &RpcCredentials {
        &self.credentials
    }

    /// Shared run flag; a stop request ends [`ShutdownSignal::wait`].
    #[must_use]
    pub const fn run_state(&self) -> &RunState {
        &self.run_state
    }

    /// Lock file held by this daemon.
    #[must_use]
    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }

    /// Runner for in-process callers, or `None` once stopped.
    #[must_use]
    pub fn runner(&self) -> Option<CommandRunner> {
        self.scheduler.as_ref().map(|scheduler| {
            CommandRunner::new(
                scheduler.handle(),
                Arc::clone(&self.registry),
                Some(self.timeout),
            )
        })
    }

    /// Runs the shutdown sequence: listeners, wallets and network, the
    /// scheduler, then the lock file.
    ///
    /// # Errors
    ///
    /// Returns [`LaunchError::Scheduler`] when the scheduler thread does not
    /// stop cleanly. The lock file is removed regardless.
    pub fn stop(mut self) -> Result<(), LaunchError> {
        self.teardown()
    }

    fn teardown(&mut self) -> Result<(), LaunchError> {
        let Some(scheduler) = self.scheduler.take() else {
            return Ok(());
        };
        self.reporter.shutdown_started();
        self.run_state.request_stop();
        for listener in [self.rpc.take(), self.watchtower.take()].into_iter().flatten() {
            listener.shutdown(SHUTDOWN_TIMEOUT);
        }
        let closed = scheduler
            .handle()
            .submit_and_wait(|core| async move { core.shutdown() }, Some(SHUTDOWN_TIMEOUT));
        if let Err(error) = closed {
            warn!(target: PROCESS_TARGET, error = %error, "core did not shut down cleanly");
        }
        let stopped = scheduler.stop();
        drop(self.lock.take());
        self.reporter.shutdown_completed();
        info!(target: PROCESS_TARGET, "shutdown sequence completed");
        stopped.map_err(LaunchError::from)
    }
}

impl Drop for RunningDaemon {
    fn drop(&mut self) {
        if let Err(error) = self.teardown() {
            warn!(target: PROCESS_TARGET, error = %error, "daemon did not stop cleanly");
        }
    }
}

/// Starts a listener from a task on the scheduler and waits for it to bind.
fn start_listener<F, Fut>(
    handle: &SchedulerHandle<DaemonCore>,
    timeout: Duration,
    start: F,
) -> Result<ListenerHandle, LaunchError>
where
    F: FnOnce(Rc<DaemonCore>, SchedulerHandle<DaemonCore>) -> Fut + Send + 'static,
    Fut: Future<Output = Result<ListenerHandle, ListenerError>> + 'static,
{
    let listener_handle = handle.clone();
    let listener = handle.submit_and_wait(
        move |core| start(core, listener_handle),
        Some(timeout),
    )??;
    Ok(listener)
}
