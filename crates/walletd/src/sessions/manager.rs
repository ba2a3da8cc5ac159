use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use thiserror::Error;
use tracing::{info, warn};

use crate::network::{Network, RegistrationId};

use super::SESSIONS_TARGET;
use super::paths::normalize_path;
use super::storage::{StorageError, StorageProvider, Wallet};

/// Why a wallet could not be opened.
#[derive(Debug, Error)]
pub enum OpenRefusal {
    /// No wallet file exists at the path.
    #[error("wallet file does not exist")]
    Missing,
    /// The wallet is encrypted and no password was supplied.
    #[error("wallet is encrypted and no password was supplied")]
    PasswordRequired,
    /// The supplied password does not decrypt the wallet.
    #[error("invalid password")]
    InvalidPassword,
    /// The file holds several wallets that must be split first.
    #[error("wallet must be split before it can be opened")]
    RequiresSplit,
    /// The file uses an older format and must be upgraded first.
    #[error("wallet must be upgraded before it can be opened")]
    RequiresUpgrade,
    /// Wallet creation was interrupted and must be completed first.
    #[error("wallet has a pending action: {action}")]
    PendingAction {
        /// Name of the pending step.
        action: String,
    },
    /// The storage backend failed.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// An open wallet keyed by its normalised path.
pub struct WalletSession {
    path: PathBuf,
    wallet: Box<dyn Wallet>,
    registration: Option<Registration>,
}

struct Registration {
    id: RegistrationId,
    network: Rc<dyn Network>,
}

impl WalletSession {
    /// Normalised wallet path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The opened wallet.
    #[must_use]
    pub fn wallet(&self) -> &dyn Wallet {
        self.wallet.as_ref()
    }

    /// Whether the wallet is registered with the network.
    #[must_use]
    pub const fn is_registered(&self) -> bool {
        self.registration.is_some()
    }

    /// Whether wallet-side synchronisation is running.
    #[must_use]
    pub fn is_syncing(&self) -> bool {
        self.wallet.is_syncing()
    }

    /// Whether the wallet has caught up with a connected network.
    ///
    /// Requires a live registration, a running sync, a server that reports a
    /// chain height and a wallet that has processed history up to it.
    #[must_use]
    pub fn is_synchronized(&self) -> bool {
        let Some(registration) = &self.registration else {
            return false;
        };
        if !self.wallet.is_syncing() {
            return false;
        }
        let info = registration.network.info();
        match (info.connected, info.height, self.wallet.synced_height()) {
            (true, Some(tip), Some(processed)) => processed >= tip,
            _ => false,
        }
    }
}

impl fmt::Debug for WalletSession {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("WalletSession")
            .field("path", &self.path)
            .field(
                "registration",
                &self.registration.as_ref().map(|registration| registration.id),
            )
            .finish_non_exhaustive()
    }
}

/// Owns the map of open wallets.
///
/// The manager lives on the scheduler thread. A session is inserted only
/// after decryption, checks and network registration have all succeeded, so
/// a lookup never observes a half-opened wallet.
pub struct SessionManager {
    storage: Box<dyn StorageProvider>,
    network: Option<Rc<dyn Network>>,
    sessions: HashMap<PathBuf, Rc<WalletSession>>,
    load_order: Vec<PathBuf>,
}

impl SessionManager {
    /// Builds an empty manager.
    pub fn new(storage: Box<dyn StorageProvider>, network: Option<Rc<dyn Network>>) -> Self {
        Self {
            storage,
            network,
            sessions: HashMap::new(),
            load_order: Vec::new(),
        }
    }

    /// Opens the wallet at `path`, or returns the session already open there.
    ///
    /// Reopening leaves the session and the current wallet untouched.
    ///
    /// # Errors
    ///
    /// Returns the [`OpenRefusal`] explaining why the wallet stays closed.
    /// Stores that need an upgrade or split are refused, never migrated.
    pub fn open(
        &mut self,
        path: &Path,
        password: Option<&str>,
    ) -> Result<Rc<WalletSession>, OpenRefusal> {
        let path = normalize_path(path);
        if let Some(existing) = self.sessions.get(&path).cloned() {
            return Ok(existing);
        }

        let mut storage = self.storage.open(&path)?.ok_or(OpenRefusal::Missing)?;
        if storage.is_encrypted() {
            let password = password.ok_or(OpenRefusal::PasswordRequired)?;
            storage.decrypt(password).map_err(|error| match error {
                StorageError::InvalidPassword => OpenRefusal::InvalidPassword,
                other => OpenRefusal::Storage(other),
            })?;
        }
        if storage.requires_split() {
            return Err(OpenRefusal::RequiresSplit);
        }
        if storage.requires_upgrade() {
            return Err(OpenRefusal::RequiresUpgrade);
        }
        if let Some(action) = storage.pending_action() {
            return Err(OpenRefusal::PendingAction { action });
        }

        let wallet = storage.into_wallet()?;
        let registration = self.network.as_ref().map(|network| {
            let id = network.register_wallet(&path);
            wallet.start_network();
            Registration {
                id,
                network: Rc::clone(network),
            }
        });
        let session = Rc::new(WalletSession {
            path: path.clone(),
            wallet,
            registration,
        });
        self.sessions.insert(path.clone(), Rc::clone(&session));
        self.load_order.push(path);
        info!(
            target: SESSIONS_TARGET,
            wallet = %session.path().display(),
            registered = session.is_registered(),
            "wallet opened"
        );
        Ok(session)
    }

    /// Like [`SessionManager::open`], collapsing every refusal to `None`.
    ///
    /// The reason is logged before it is discarded.
    pub fn open_or_none(
        &mut self,
        path: &Path,
        password: Option<&str>,
    ) -> Option<Rc<WalletSession>> {
        match self.open(path, password) {
            Ok(session) => Some(session),
            Err(refusal) => {
                info!(
                    target: SESSIONS_TARGET,
                    wallet = %path.display(),
                    reason = %refusal,
                    "wallet not opened"
                );
                None
            }
        }
    }

    /// Closes the session at `path`; returns whether one was open.
    ///
    /// Background activity stops before the session leaves the map.
    pub fn close(&mut self, path: &Path) -> bool {
        let path = normalize_path(path);
        let Some(session) = self.sessions.get(&path).cloned() else {
            return false;
        };
        Self::stop_session(&session);
        self.sessions.remove(&path);
        self.load_order.retain(|loaded| loaded != &path);
        info!(
            target: SESSIONS_TARGET,
            wallet = %path.display(),
            "wallet closed"
        );
        true
    }

    /// Closes every session, most recent first.
    pub fn close_all(&mut self) {
        while let Some(path) = self.load_order.pop() {
            if let Some(session) = self.sessions.get(&path).cloned() {
                Self::stop_session(&session);
                self.sessions.remove(&path);
            }
        }
        if !self.sessions.is_empty() {
            warn!(
                target: SESSIONS_TARGET,
                remaining = self.sessions.len(),
                "sessions missing from load order; stopping them anyway"
            );
            for (_, session) in self.sessions.drain() {
                Self::stop_session(&session);
            }
        }
    }

    /// Looks up the session at `path` without side effects.
    #[must_use]
    pub fn get(&self, path: &Path) -> Option<Rc<WalletSession>> {
        self.sessions.get(&normalize_path(path)).cloned()
    }

    /// The most recently opened session still open.
    #[must_use]
    pub fn current(&self) -> Option<Rc<WalletSession>> {
        self.load_order
            .last()
            .and_then(|path| self.sessions.get(path))
            .cloned()
    }

    /// Open sessions in load order.
    #[must_use]
    pub fn sessions(&self) -> Vec<Rc<WalletSession>> {
        self.load_order
            .iter()
            .filter_map(|path| self.sessions.get(path))
            .cloned()
            .collect()
    }

    /// Number of open sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether no session is open.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    fn stop_session(session: &WalletSession) {
        session.wallet.stop_threads();
        if let Some(registration) = &session.registration {
            registration.network.unregister_wallet(registration.id);
        }
    }
}

impl fmt::Debug for SessionManager {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("SessionManager")
            .field("sessions", &self.load_order)
            .field("networked", &self.network.is_some())
            .finish_non_exhaustive()
    }
}
