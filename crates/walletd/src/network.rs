//! Network collaborator seen by the daemon core.
//!
//! The peer protocol lives outside this crate. The core only needs to start
//! and stop the network, register open wallets for callbacks and report a
//! status snapshot for `getinfo`.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::info;

pub(crate) const NETWORK_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::network");

/// Token returned when a wallet registers for network callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RegistrationId(u64);

/// Status snapshot reported by `getinfo`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NetworkInfo {
    /// Whether the network has been started and not yet stopped.
    pub running: bool,
    /// Whether a peer connection is established.
    pub connected: bool,
    /// Server the network is attached to, if any.
    pub server: Option<String>,
    /// Chain height reported by the connected server.
    pub height: Option<u64>,
    /// Number of wallets registered for callbacks.
    pub registered_wallets: usize,
}

/// Network operations the daemon core depends on.
///
/// Implementations live on the scheduler thread and need not be `Send`.
pub trait Network {
    /// Starts background network activity.
    fn start(&self);

    /// Stops background network activity.
    fn stop(&self);

    /// Registers `wallet` for network callbacks.
    fn register_wallet(&self, wallet: &Path) -> RegistrationId;

    /// Removes a registration made by [`Network::register_wallet`].
    fn unregister_wallet(&self, id: RegistrationId);

    /// Returns a status snapshot.
    fn info(&self) -> NetworkInfo;
}

/// In-process network used when no external peer stack is attached.
///
/// It tracks registrations and lifecycle but never connects to a peer.
#[derive(Debug, Default)]
pub struct LocalNetwork {
    running: Cell<bool>,
    next_id: Cell<u64>,
    registrations: RefCell<BTreeMap<RegistrationId, PathBuf>>,
}

impl LocalNetwork {
    /// Builds a stopped network with no registrations.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of wallets currently registered.
    #[must_use]
    pub fn registration_count(&self) -> usize {
        self.registrations.borrow().len()
    }
}

impl Network for LocalNetwork {
    fn start(&self) {
        self.running.set(true);
        info!(target: NETWORK_TARGET, "network started");
    }

    fn stop(&self) {
        self.running.set(false);
        self.registrations.borrow_mut().clear();
        info!(target: NETWORK_TARGET, "network stopped");
    }

    fn register_wallet(&self, wallet: &Path) -> RegistrationId {
        let id = RegistrationId(self.next_id.get());
        self.next_id.set(self.next_id.get().wrapping_add(1));
        self.registrations
            .borrow_mut()
            .insert(id, wallet.to_path_buf());
        id
    }

    fn unregister_wallet(&self, id: RegistrationId) {
        self.registrations.borrow_mut().remove(&id);
    }

    fn info(&self) -> NetworkInfo {
        NetworkInfo {
            running: self.running.get(),
            connected: false,
            server: None,
            height: None,
            registered_wallets: self.registration_count(),
        }
    }
}
