//! Daemon state owned by the scheduler thread.
//!
//! [`DaemonCore`] is built on the scheduler thread by the scheduler's `init`
//! closure and never leaves it. It is `!Send`: the session map, the network
//! and the mutable configuration are reachable only from work submitted
//! through a [`crate::scheduler::SchedulerHandle`]. The one piece shared with
//! other threads is the mutex-guarded [`RunState`].

use std::cell::{Cell, Ref, RefCell};
use std::fmt;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{info, warn};
use walletd_config::{Config, ConfigError};

use crate::network::{LocalNetwork, Network};
use crate::registry::Registry;
use crate::sessions::{
    FileStorageProvider, OpenRefusal, SessionManager, StorageProvider, WalletSession,
};
use crate::watchtower::{MemorySweepStore, SweepStore};

pub(crate) const STATE_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::state");

/// Whether the daemon should keep running.
///
/// Shared between the scheduler, the run loop and signal handling. Any of
/// them may request a stop; only the run loop acts on it.
#[derive(Debug, Clone)]
pub struct RunState {
    running: Arc<Mutex<bool>>,
}

impl Default for RunState {
    fn default() -> Self {
        Self::new()
    }
}

impl RunState {
    /// Builds a state that reports running.
    #[must_use]
    pub fn new() -> Self {
        Self {
            running: Arc::new(Mutex::new(true)),
        }
    }

    /// Whether no stop has been requested.
    #[must_use]
    pub fn is_running(&self) -> bool {
        *self.running.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Requests a stop. Idempotent.
    pub fn request_stop(&self) {
        *self.running.lock().unwrap_or_else(PoisonError::into_inner) = false;
    }
}

/// Factory for the collaborators the core talks to.
///
/// Invoked on the scheduler thread, so the products need not be `Send`.
pub trait Collaborators: Send + 'static {
    /// Wallet storage backend.
    fn storage(&self) -> Box<dyn StorageProvider>;

    /// Network; only called when the daemon is not offline.
    fn network(&self) -> Rc<dyn Network>;

    /// Store behind the watch-tower listener.
    fn sweep_store(&self) -> Rc<dyn SweepStore>;
}

/// Collaborators used by the `walletd` binary.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemCollaborators;

impl Collaborators for SystemCollaborators {
    fn storage(&self) -> Box<dyn StorageProvider> {
        Box::new(FileStorageProvider::new())
    }

    fn network(&self) -> Rc<dyn Network> {
        Rc::new(LocalNetwork::new())
    }

    fn sweep_store(&self) -> Rc<dyn SweepStore> {
        Rc::new(MemorySweepStore::new())
    }
}

/// Scheduler-owned daemon state.
pub struct DaemonCore {
    registry: Arc<Registry>,
    config: RefCell<Config>,
    sessions: RefCell<SessionManager>,
    network: Option<Rc<dyn Network>>,
    sweeps: Rc<dyn SweepStore>,
    run_state: RunState,
    rpc_address: Cell<Option<SocketAddr>>,
}

impl DaemonCore {
    /// Builds the core. Must run on the scheduler thread.
    pub fn new(
        registry: Arc<Registry>,
        config: Config,
        run_state: RunState,
        collaborators: &dyn Collaborators,
    ) -> Self {
        let network = (!config.offline()).then(|| collaborators.network());
        let sessions = SessionManager::new(collaborators.storage(), network.clone());
        Self {
            registry,
            config: RefCell::new(config),
            sessions: RefCell::new(sessions),
            network,
            sweeps: collaborators.sweep_store(),
            run_state,
            rpc_address: Cell::new(None),
        }
    }

    /// Starts the network, if there is one.
    pub fn start(&self) {
        match &self.network {
            Some(network) => network.start(),
            None => info!(target: STATE_TARGET, "offline; network not started"),
        }
    }

    /// Closes every wallet and stops the network.
    pub fn shutdown(&self) {
        self.sessions.borrow_mut().close_all();
        if let Some(network) = &self.network {
            network.stop();
        }
        info!(target: STATE_TARGET, "core shut down");
    }

    /// The operation registry.
    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Current configuration.
    ///
    /// The borrow must be released before any `.await`.
    #[must_use]
    pub fn config(&self) -> Ref<'_, Config> {
        self.config.borrow()
    }

    /// Applies `change` to the configuration and persists it.
    ///
    /// Nothing changes in memory when `change` or the save fails.
    ///
    /// # Errors
    ///
    /// Returns the [`ConfigError`] raised by `change` or by the save.
    pub fn update_config<F>(&self, change: F) -> Result<(), ConfigError>
    where
        F: FnOnce(&mut Config) -> Result<(), ConfigError>,
    {
        let mut updated = self.config.borrow().clone();
        change(&mut updated)?;
        updated.save()?;
        *self.config.borrow_mut() = updated;
        Ok(())
    }

    /// The network, or `None` when running offline.
    #[must_use]
    pub fn network(&self) -> Option<Rc<dyn Network>> {
        self.network.clone()
    }

    /// Store behind the watch-tower listener.
    #[must_use]
    pub fn sweeps(&self) -> Rc<dyn SweepStore> {
        Rc::clone(&self.sweeps)
    }

    /// Shared run flag.
    #[must_use]
    pub const fn run_state(&self) -> &RunState {
        &self.run_state
    }

    /// Address the JSON-RPC listener is bound to.
    #[must_use]
    pub fn rpc_address(&self) -> Option<SocketAddr> {
        self.rpc_address.get()
    }

    pub(crate) fn set_rpc_address(&self, address: SocketAddr) {
        self.rpc_address.set(Some(address));
    }

    /// Resolves a caller-supplied wallet path against the configuration.
    #[must_use]
    pub fn resolve_wallet_path(&self, requested: Option<&Path>) -> PathBuf {
        self.config.borrow().resolve_wallet_path(requested)
    }

    /// Opens the wallet at `requested` (or the default wallet).
    ///
    /// # Errors
    ///
    /// Returns the [`OpenRefusal`] explaining why the wallet stays closed.
    pub fn open_wallet(
        &self,
        requested: Option<&Path>,
        password: Option<&str>,
    ) -> Result<Rc<WalletSession>, OpenRefusal> {
        let path = self.resolve_wallet_path(requested);
        self.sessions.borrow_mut().open(&path, password)
    }

    /// Opens a wallet, collapsing every refusal to `false`.
    pub fn load_wallet(&self, requested: Option<&Path>, password: Option<&str>) -> bool {
        let path = self.resolve_wallet_path(requested);
        self.sessions
            .borrow_mut()
            .open_or_none(&path, password)
            .is_some()
    }

    /// Closes the wallet at `requested` (or the default wallet).
    pub fn close_wallet(&self, requested: Option<&Path>) -> bool {
        let path = self.resolve_wallet_path(requested);
        self.sessions.borrow_mut().close(&path)
    }

    /// Looks up the session open at `path`.
    #[must_use]
    pub fn session(&self, path: &Path) -> Option<Rc<WalletSession>> {
        self.sessions.borrow().get(path)
    }

    /// The most recently loaded session.
    #[must_use]
    pub fn current_session(&self) -> Option<Rc<WalletSession>> {
        self.sessions.borrow().current()
    }

    /// Binds a call to a session: the one at `selector`, else the current one.
    #[must_use]
    pub fn bind_session(&self, selector: Option<&Path>) -> Option<Rc<WalletSession>> {
        match selector {
            Some(path) => self.session(&self.resolve_wallet_path(Some(path))),
            None => self.current_session(),
        }
    }

    /// Open sessions in load order.
    #[must_use]
    pub fn wallet_sessions(&self) -> Vec<Rc<WalletSession>> {
        self.sessions.borrow().sessions()
    }
}

impl Drop for DaemonCore {
    fn drop(&mut self) {
        let open = self.sessions.get_mut().len();
        if open > 0 {
            warn!(
                target: STATE_TARGET,
                open,
                "core dropped with open wallets; closing them"
            );
            self.sessions.get_mut().close_all();
        }
    }
}

impl fmt::Debug for DaemonCore {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("DaemonCore")
            .field("operations", &self.registry.len())
            .field("sessions", &self.sessions)
            .field("networked", &self.network.is_some())
            .field("rpc_address", &self.rpc_address.get())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stop_requests_are_visible_to_clones() {
        let state = RunState::new();
        let observer = state.clone();
        assert!(observer.is_running());
        state.request_stop();
        assert!(!observer.is_running());
    }
}
