//! Session manager behaviour against in-memory storage.

use std::cell::Cell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use rstest::{fixture, rstest};
use serde_json::Value;

use super::*;
use crate::network::{LocalNetwork, Network, NetworkInfo, RegistrationId};

#[derive(Clone, Default)]
struct StoredWallet {
    password: Option<String>,
    split: bool,
    upgrade: bool,
    action: Option<String>,
    synced: Option<u64>,
}

#[derive(Default)]
struct MemoryProvider {
    wallets: HashMap<PathBuf, StoredWallet>,
}

impl MemoryProvider {
    fn with(mut self, path: &str, wallet: StoredWallet) -> Self {
        self.wallets.insert(PathBuf::from(path), wallet);
        self
    }
}

impl StorageProvider for MemoryProvider {
    fn open(&self, path: &Path) -> Result<Option<Box<dyn WalletStorage>>, StorageError> {
        Ok(self.wallets.get(path).map(|stored| {
            Box::new(MemoryStorage {
                stored: stored.clone(),
                locked: stored.password.is_some(),
            }) as Box<dyn WalletStorage>
        }))
    }
}

struct MemoryStorage {
    stored: StoredWallet,
    locked: bool,
}

impl WalletStorage for MemoryStorage {
    fn is_encrypted(&self) -> bool {
        self.locked
    }

    fn decrypt(&mut self, password: &str) -> Result<(), StorageError> {
        if self.stored.password.as_deref() == Some(password) {
            self.locked = false;
            Ok(())
        } else {
            Err(StorageError::InvalidPassword)
        }
    }

    fn requires_split(&self) -> bool {
        self.stored.split
    }

    fn requires_upgrade(&self) -> bool {
        self.stored.upgrade
    }

    fn pending_action(&self) -> Option<String> {
        self.stored.action.clone()
    }

    fn into_wallet(self: Box<Self>) -> Result<Box<dyn Wallet>, StorageError> {
        Ok(Box::new(MemoryWallet {
            password: self.stored.password,
            synced: self.stored.synced,
            running: Cell::new(false),
        }))
    }
}

struct MemoryWallet {
    password: Option<String>,
    synced: Option<u64>,
    running: Cell<bool>,
}

impl Wallet for MemoryWallet {
    fn has_password(&self) -> bool {
        self.password.is_some()
    }

    fn check_password(&self, password: &str) -> Result<(), StorageError> {
        match &self.password {
            Some(expected) if expected != password => Err(StorageError::InvalidPassword),
            _ => Ok(()),
        }
    }

    fn update_password(&self, _old: Option<&str>, _new: Option<&str>) -> Result<(), StorageError> {
        Ok(())
    }

    fn get(&self, _key: &str) -> Option<Value> {
        None
    }

    fn start_network(&self) {
        self.running.set(true);
    }

    fn stop_threads(&self) {
        self.running.set(false);
    }

    fn is_syncing(&self) -> bool {
        self.running.get()
    }

    fn synced_height(&self) -> Option<u64> {
        self.synced
    }
}

/// Network connected to a server at a fixed chain height.
struct ConnectedNetwork {
    inner: LocalNetwork,
    height: u64,
}

impl ConnectedNetwork {
    fn at_height(height: u64) -> Self {
        Self {
            inner: LocalNetwork::new(),
            height,
        }
    }
}

impl Network for ConnectedNetwork {
    fn start(&self) {
        self.inner.start();
    }

    fn stop(&self) {
        self.inner.stop();
    }

    fn register_wallet(&self, wallet: &Path) -> RegistrationId {
        self.inner.register_wallet(wallet)
    }

    fn unregister_wallet(&self, id: RegistrationId) {
        self.inner.unregister_wallet(id);
    }

    fn info(&self) -> NetworkInfo {
        NetworkInfo {
            connected: true,
            server: Some("peer.example:50002".to_owned()),
            height: Some(self.height),
            ..self.inner.info()
        }
    }
}

struct Fixture {
    network: Rc<LocalNetwork>,
    manager: SessionManager,
}

#[fixture]
fn fixture() -> Fixture {
    let provider = MemoryProvider::default()
        .with("/w/plain", StoredWallet::default())
        .with(
            "/w/locked",
            StoredWallet {
                password: Some("secret".to_owned()),
                ..StoredWallet::default()
            },
        )
        .with(
            "/w/split",
            StoredWallet {
                split: true,
                ..StoredWallet::default()
            },
        )
        .with(
            "/w/old",
            StoredWallet {
                upgrade: true,
                ..StoredWallet::default()
            },
        )
        .with(
            "/w/unfinished",
            StoredWallet {
                action: Some("create_seed".to_owned()),
                ..StoredWallet::default()
            },
        );
    let network = Rc::new(LocalNetwork::new());
    let shared: Rc<dyn Network> = Rc::clone(&network) as Rc<dyn Network>;
    Fixture {
        manager: SessionManager::new(Box::new(provider), Some(shared)),
        network,
    }
}

#[rstest]
fn opening_twice_reuses_the_session(mut fixture: Fixture) {
    let first = fixture
        .manager
        .open(Path::new("/w/plain"), None)
        .expect("first open");
    let second = fixture
        .manager
        .open(Path::new("/w/./plain"), None)
        .expect("second open");

    assert!(Rc::ptr_eq(&first, &second));
    assert_eq!(fixture.manager.len(), 1);
    assert_eq!(fixture.network.registration_count(), 1);
}

#[rstest]
fn reopening_keeps_the_current_wallet(mut fixture: Fixture) {
    fixture
        .manager
        .open(Path::new("/w/plain"), None)
        .expect("open plain");
    fixture
        .manager
        .open(Path::new("/w/locked"), Some("secret"))
        .expect("open locked");

    fixture
        .manager
        .open(Path::new("/w/plain"), None)
        .expect("reopen plain");

    let current = fixture.manager.current().expect("current session");
    assert_eq!(current.path(), Path::new("/w/locked"));
    let order: Vec<PathBuf> = fixture
        .manager
        .sessions()
        .iter()
        .map(|session| session.path().to_path_buf())
        .collect();
    assert_eq!(order, [PathBuf::from("/w/plain"), PathBuf::from("/w/locked")]);
}

#[rstest]
fn registration_alone_is_not_synchronization(mut fixture: Fixture) {
    let session = fixture
        .manager
        .open(Path::new("/w/plain"), None)
        .expect("open");
    assert!(session.is_registered());
    assert!(session.is_syncing());
    assert!(!fixture.network.info().connected);
    assert!(!session.is_synchronized());
}

#[rstest]
#[case(Some(120), 120, true)]
#[case(Some(121), 120, true)]
#[case(Some(90), 120, false)]
#[case(None, 120, false)]
fn synchronization_compares_processed_and_chain_heights(
    #[case] synced: Option<u64>,
    #[case] tip: u64,
    #[case] expected: bool,
) {
    let provider = MemoryProvider::default().with(
        "/w/plain",
        StoredWallet {
            synced,
            ..StoredWallet::default()
        },
    );
    let network: Rc<dyn Network> = Rc::new(ConnectedNetwork::at_height(tip));
    let mut manager = SessionManager::new(Box::new(provider), Some(network));
    let session = manager
        .open(Path::new("/w/plain"), None)
        .expect("open");

    assert_eq!(session.is_synchronized(), expected);
    manager.close(Path::new("/w/plain"));
    assert!(!session.is_syncing());
    assert!(!session.is_synchronized());
}

#[rstest]
#[case("/w/absent", None, "wallet file does not exist")]
#[case("/w/locked", None, "wallet is encrypted and no password was supplied")]
#[case("/w/locked", Some("guess"), "invalid password")]
#[case("/w/split", None, "wallet must be split before it can be opened")]
#[case("/w/old", None, "wallet must be upgraded before it can be opened")]
#[case("/w/unfinished", None, "wallet has a pending action: create_seed")]
fn refusals_leave_no_session(
    mut fixture: Fixture,
    #[case] path: &str,
    #[case] password: Option<&str>,
    #[case] reason: &str,
) {
    let refusal = fixture
        .manager
        .open(Path::new(path), password)
        .expect_err("open must be refused");

    assert_eq!(refusal.to_string(), reason);
    assert!(fixture.manager.is_empty());
    assert_eq!(fixture.network.registration_count(), 0);
}

#[rstest]
fn correct_password_opens_encrypted_wallet(mut fixture: Fixture) {
    let session = fixture
        .manager
        .open_or_none(Path::new("/w/locked"), Some("secret"))
        .expect("wallet opens");
    assert!(session.wallet().has_password());
}

#[rstest]
fn close_reports_whether_a_session_was_open(mut fixture: Fixture) {
    fixture
        .manager
        .open(Path::new("/w/plain"), None)
        .expect("open");

    assert!(fixture.manager.close(Path::new("/w/plain")));
    assert!(!fixture.manager.close(Path::new("/w/plain")));
    assert!(!fixture.manager.close(Path::new("/w/never")));
    assert_eq!(fixture.network.registration_count(), 0);
}

#[rstest]
fn closed_session_stops_its_wallet(mut fixture: Fixture) {
    let session = fixture
        .manager
        .open(Path::new("/w/plain"), None)
        .expect("open");
    fixture.manager.close(Path::new("/w/plain"));
    assert!(!session.is_syncing());
    assert!(fixture.manager.get(Path::new("/w/plain")).is_none());
}

#[rstest]
fn current_follows_the_most_recent_open(mut fixture: Fixture) {
    assert!(fixture.manager.current().is_none());
    fixture
        .manager
        .open(Path::new("/w/plain"), None)
        .expect("open plain");
    fixture
        .manager
        .open(Path::new("/w/locked"), Some("secret"))
        .expect("open locked");

    let current = fixture.manager.current().expect("current session");
    assert_eq!(current.path(), Path::new("/w/locked"));

    fixture.manager.close(Path::new("/w/locked"));
    let current = fixture.manager.current().expect("falls back");
    assert_eq!(current.path(), Path::new("/w/plain"));
}

#[rstest]
fn close_all_empties_the_map(mut fixture: Fixture) {
    fixture
        .manager
        .open(Path::new("/w/plain"), None)
        .expect("open plain");
    fixture
        .manager
        .open(Path::new("/w/locked"), Some("secret"))
        .expect("open locked");

    fixture.manager.close_all();

    assert!(fixture.manager.is_empty());
    assert!(fixture.manager.sessions().is_empty());
    assert_eq!(fixture.network.registration_count(), 0);
}

#[rstest]
fn offline_manager_opens_without_registering() {
    let provider = MemoryProvider::default().with("/w/plain", StoredWallet::default());
    let mut manager = SessionManager::new(Box::new(provider), None);
    let session = manager
        .open(Path::new("/w/plain"), None)
        .expect("open offline");
    assert!(!session.is_registered());
    assert!(!session.is_syncing());
    assert!(!session.is_synchronized());
}
