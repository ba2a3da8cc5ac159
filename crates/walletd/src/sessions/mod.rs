//! Open wallet sessions and the storage they are read from.

mod file_storage;
mod manager;
mod paths;
mod storage;

pub(crate) const SESSIONS_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::sessions");

pub use file_storage::{CURRENT_SEED_VERSION, FileStorageProvider, FileWallet, WalletDocument};
pub use manager::{OpenRefusal, SessionManager, WalletSession};
pub use storage::{StorageError, StorageProvider, Wallet, WalletStorage};

#[cfg(test)]
mod tests;
