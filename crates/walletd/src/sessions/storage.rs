//! Collaborator traits for wallet storage and opened wallets.

use std::io;
use std::path::{Path, PathBuf};

use serde_json::Value;
use thiserror::Error;

/// Errors raised by wallet storage backends.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The wallet file could not be read.
    #[error("failed to read wallet '{path}': {source}")]
    Read {
        /// Wallet file path.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The wallet file could not be written.
    #[error("failed to write wallet '{path}': {source}")]
    Write {
        /// Wallet file path.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The wallet file is not a wallet this daemon understands.
    #[error("wallet '{path}' is corrupt: {message}")]
    Corrupt {
        /// Wallet file path.
        path: PathBuf,
        /// Human-readable reason.
        message: String,
    },
    /// The supplied password does not unlock the wallet.
    #[error("invalid password")]
    InvalidPassword,
    /// The wallet must be decrypted before it can be used.
    #[error("wallet '{path}' is still encrypted")]
    StillEncrypted {
        /// Wallet file path.
        path: PathBuf,
    },
    /// Key derivation or encryption failed.
    #[error("wallet encryption failed: {message}")]
    Crypto {
        /// Human-readable reason.
        message: String,
    },
}

/// Opens wallet storage by path.
pub trait StorageProvider {
    /// Opens the storage at `path`, or returns `None` when no file exists.
    fn open(&self, path: &Path) -> Result<Option<Box<dyn WalletStorage>>, StorageError>;
}

/// Storage that has been located but not yet turned into a wallet.
pub trait WalletStorage {
    /// Whether the storage must be decrypted before use.
    fn is_encrypted(&self) -> bool;

    /// Decrypts the storage in memory.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidPassword`] when `password` is wrong.
    fn decrypt(&mut self, password: &str) -> Result<(), StorageError>;

    /// Whether the storage holds several wallets that must be split apart.
    fn requires_split(&self) -> bool;

    /// Whether the storage format is older than this daemon supports.
    fn requires_upgrade(&self) -> bool;

    /// An interrupted creation step that must be finished interactively.
    fn pending_action(&self) -> Option<String>;

    /// Builds the wallet.
    fn into_wallet(self: Box<Self>) -> Result<Box<dyn Wallet>, StorageError>;
}

/// An opened wallet, as far as the daemon core is concerned.
///
/// Wallets are shared between in-flight operations on the scheduler thread,
/// so mutation goes through `&self`.
pub trait Wallet {
    /// Whether the wallet is protected by a password.
    fn has_password(&self) -> bool;

    /// Verifies `password`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidPassword`] on mismatch.
    fn check_password(&self, password: &str) -> Result<(), StorageError>;

    /// Changes the password; `None` as `new` removes protection.
    fn update_password(&self, old: Option<&str>, new: Option<&str>) -> Result<(), StorageError>;

    /// Reads a stored item.
    fn get(&self, key: &str) -> Option<Value>;

    /// Starts wallet-side synchronisation once registered with the network.
    fn start_network(&self);

    /// Stops every background activity of the wallet.
    fn stop_threads(&self);

    /// Whether wallet-side synchronisation is running.
    fn is_syncing(&self) -> bool;

    /// Chain height up to which the wallet has processed its history.
    fn synced_height(&self) -> Option<u64>;
}
