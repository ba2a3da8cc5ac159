//! JSON wallet files with optional password encryption.
//!
//! A plain wallet file is a [`WalletDocument`]. An encrypted file wraps the
//! serialised document in an envelope: AES-256-GCM under a key stretched from
//! the password with Argon2id over a per-file random salt.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, Key, KeyInit, Nonce};
use argon2::{Algorithm, Argon2, Params, Version};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use rand::RngCore;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use subtle::ConstantTimeEq;
use tracing::debug;

use walletd_config::atomic_write;

use super::SESSIONS_TARGET;
use super::storage::{StorageError, StorageProvider, Wallet, WalletStorage};

/// Oldest document version opened without an upgrade.
pub const CURRENT_SEED_VERSION: u32 = 18;

const MULTI_ACCOUNT_TYPE: &str = "multi_account";

const ENVELOPE_VERSION: u8 = 1;
const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 12;
const KEY_LEN: usize = 32;
const KDF_MEMORY_KIB: u32 = 8 * 1024;
const KDF_ITERATIONS: u32 = 2;

/// Decrypted contents of a wallet file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalletDocument {
    /// Storage format version.
    pub seed_version: u32,
    /// Wallet kind, for example `standard`.
    #[serde(default = "default_wallet_type")]
    pub wallet_type: String,
    /// Legacy per-account data. A `multi_account` wallet holding more than
    /// one entry must be split.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub accounts: Vec<Value>,
    /// Interrupted creation step, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    /// Chain height up to which history has been processed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub synced_height: Option<u64>,
    /// Stored items readable through `get`.
    #[serde(default)]
    pub items: BTreeMap<String, Value>,
}

impl Default for WalletDocument {
    fn default() -> Self {
        Self {
            seed_version: CURRENT_SEED_VERSION,
            wallet_type: default_wallet_type(),
            accounts: Vec::new(),
            action: None,
            synced_height: None,
            items: BTreeMap::new(),
        }
    }
}

fn default_wallet_type() -> String {
    "standard".to_owned()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SealedEnvelope {
    version: u8,
    salt: String,
    nonce: String,
    ciphertext: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum StoredFile {
    Sealed { encrypted: SealedEnvelope },
    Plain(WalletDocument),
}

#[derive(Clone)]
struct Sealing {
    salt: [u8; SALT_LEN],
    key: [u8; KEY_LEN],
}

impl Sealing {
    fn derive(password: &str, salt: [u8; SALT_LEN]) -> Result<Self, StorageError> {
        let params = Params::new(KDF_MEMORY_KIB, KDF_ITERATIONS, 1, Some(KEY_LEN))
            .map_err(|error| StorageError::Crypto {
                message: error.to_string(),
            })?;
        let argon = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);
        let mut key = [0u8; KEY_LEN];
        argon
            .hash_password_into(password.as_bytes(), &salt, &mut key)
            .map_err(|error| StorageError::Crypto {
                message: error.to_string(),
            })?;
        Ok(Self { salt, key })
    }

    fn fresh(password: &str) -> Result<Self, StorageError> {
        let mut salt = [0u8; SALT_LEN];
        OsRng.fill_bytes(&mut salt);
        Self::derive(password, salt)
    }

    fn matches(&self, password: &str) -> Result<bool, StorageError> {
        let candidate = Self::derive(password, self.salt)?;
        Ok(bool::from(candidate.key.ct_eq(&self.key)))
    }

    fn cipher(&self) -> Aes256Gcm {
        Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.key))
    }

    fn seal(&self, plaintext: &[u8]) -> Result<SealedEnvelope, StorageError> {
        let mut nonce = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce);
        let ciphertext = self
            .cipher()
            .encrypt(Nonce::from_slice(&nonce), plaintext)
            .map_err(|error| StorageError::Crypto {
                message: error.to_string(),
            })?;
        Ok(SealedEnvelope {
            version: ENVELOPE_VERSION,
            salt: BASE64_STANDARD.encode(self.salt),
            nonce: BASE64_STANDARD.encode(nonce),
            ciphertext: BASE64_STANDARD.encode(ciphertext),
        })
    }
}

/// Storage provider reading wallet files from disk.
#[derive(Debug, Default, Clone, Copy)]
pub struct FileStorageProvider;

impl FileStorageProvider {
    /// Builds the provider.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Writes `document` to `path`, encrypted when `password` is given.
    pub fn create(
        path: &Path,
        document: &WalletDocument,
        password: Option<&str>,
    ) -> Result<(), StorageError> {
        let sealing = password.map(Sealing::fresh).transpose()?;
        write_document(path, document, sealing.as_ref())
    }
}

impl StorageProvider for FileStorageProvider {
    fn open(&self, path: &Path) -> Result<Option<Box<dyn WalletStorage>>, StorageError> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(StorageError::Read {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        let stored: StoredFile =
            serde_json::from_str(&text).map_err(|error| StorageError::Corrupt {
                path: path.to_path_buf(),
                message: error.to_string(),
            })?;
        let state = match stored {
            StoredFile::Sealed { encrypted } => StorageState::Sealed(encrypted),
            StoredFile::Plain(document) => StorageState::Open {
                document,
                sealing: None,
            },
        };
        Ok(Some(Box::new(FileStorage {
            path: path.to_path_buf(),
            state,
        })))
    }
}

enum StorageState {
    Sealed(SealedEnvelope),
    Open {
        document: WalletDocument,
        sealing: Option<Sealing>,
    },
}

struct FileStorage {
    path: PathBuf,
    state: StorageState,
}

impl FileStorage {
    fn document(&self) -> Option<&WalletDocument> {
        match &self.state {
            StorageState::Open { document, .. } => Some(document),
            StorageState::Sealed(_) => None,
        }
    }

    fn corrupt(&self, message: impl Into<String>) -> StorageError {
        StorageError::Corrupt {
            path: self.path.clone(),
            message: message.into(),
        }
    }

    fn decode_field<const N: usize>(
        &self,
        field: &str,
        encoded: &str,
    ) -> Result<[u8; N], StorageError> {
        let bytes = BASE64_STANDARD
            .decode(encoded)
            .map_err(|error| self.corrupt(format!("{field}: {error}")))?;
        <[u8; N]>::try_from(bytes.as_slice())
            .map_err(|_| self.corrupt(format!("{field}: expected {N} bytes")))
    }
}

impl WalletStorage for FileStorage {
    fn is_encrypted(&self) -> bool {
        matches!(self.state, StorageState::Sealed(_))
    }

    fn decrypt(&mut self, password: &str) -> Result<(), StorageError> {
        let StorageState::Sealed(envelope) = &self.state else {
            return Ok(());
        };
        if envelope.version != ENVELOPE_VERSION {
            return Err(self.corrupt(format!(
                "unsupported envelope version {}",
                envelope.version
            )));
        }
        let salt = self.decode_field::<SALT_LEN>("salt", &envelope.salt)?;
        let nonce = self.decode_field::<NONCE_LEN>("nonce", &envelope.nonce)?;
        let ciphertext = BASE64_STANDARD
            .decode(&envelope.ciphertext)
            .map_err(|error| self.corrupt(format!("ciphertext: {error}")))?;
        let sealing = Sealing::derive(password, salt)?;
        let plaintext = sealing
            .cipher()
            .decrypt(Nonce::from_slice(&nonce), ciphertext.as_slice())
            .map_err(|_| StorageError::InvalidPassword)?;
        let document: WalletDocument = serde_json::from_slice(&plaintext)
            .map_err(|error| self.corrupt(error.to_string()))?;
        self.state = StorageState::Open {
            document,
            sealing: Some(sealing),
        };
        Ok(())
    }

    fn requires_split(&self) -> bool {
        self.document().is_some_and(|document| {
            document.wallet_type == MULTI_ACCOUNT_TYPE && document.accounts.len() > 1
        })
    }

    fn requires_upgrade(&self) -> bool {
        self.document()
            .is_some_and(|document| document.seed_version < CURRENT_SEED_VERSION)
    }

    fn pending_action(&self) -> Option<String> {
        self.document().and_then(|document| document.action.clone())
    }

    fn into_wallet(self: Box<Self>) -> Result<Box<dyn Wallet>, StorageError> {
        let FileStorage { path, state } = *self;
        match state {
            StorageState::Sealed(_) => Err(StorageError::StillEncrypted { path }),
            StorageState::Open { document, sealing } => Ok(Box::new(FileWallet {
                path,
                document: RefCell::new(document),
                sealing: RefCell::new(sealing),
                syncing: Cell::new(false),
            })),
        }
    }
}

/// Wallet backed by a file written through [`FileStorageProvider`].
pub struct FileWallet {
    path: PathBuf,
    document: RefCell<WalletDocument>,
    sealing: RefCell<Option<Sealing>>,
    syncing: Cell<bool>,
}

impl Wallet for FileWallet {
    fn has_password(&self) -> bool {
        self.sealing.borrow().is_some()
    }

    fn check_password(&self, password: &str) -> Result<(), StorageError> {
        match self.sealing.borrow().as_ref() {
            Some(sealing) if sealing.matches(password)? => Ok(()),
            Some(_) => Err(StorageError::InvalidPassword),
            None => Ok(()),
        }
    }

    fn update_password(&self, old: Option<&str>, new: Option<&str>) -> Result<(), StorageError> {
        if self.has_password() {
            self.check_password(old.ok_or(StorageError::InvalidPassword)?)?;
        }
        let sealing = new
            .filter(|password| !password.is_empty())
            .map(Sealing::fresh)
            .transpose()?;
        write_document(&self.path, &self.document.borrow(), sealing.as_ref())?;
        *self.sealing.borrow_mut() = sealing;
        debug!(
            target: SESSIONS_TARGET,
            wallet = %self.path.display(),
            encrypted = self.has_password(),
            "wallet password updated"
        );
        Ok(())
    }

    fn get(&self, key: &str) -> Option<Value> {
        let document = self.document.borrow();
        match key {
            "seed_version" => Some(Value::from(document.seed_version)),
            "wallet_type" => Some(Value::from(document.wallet_type.clone())),
            other => document.items.get(other).cloned(),
        }
    }

    fn start_network(&self) {
        self.syncing.set(true);
    }

    fn stop_threads(&self) {
        self.syncing.set(false);
    }

    fn is_syncing(&self) -> bool {
        self.syncing.get()
    }

    fn synced_height(&self) -> Option<u64> {
        self.document.borrow().synced_height
    }
}

fn write_document(
    path: &Path,
    document: &WalletDocument,
    sealing: Option<&Sealing>,
) -> Result<(), StorageError> {
    let write_error = |source: io::Error| StorageError::Write {
        path: path.to_path_buf(),
        source,
    };
    let plain = serde_json::to_vec(document).map_err(|error| StorageError::Corrupt {
        path: path.to_path_buf(),
        message: error.to_string(),
    })?;
    let contents = match sealing {
        Some(sealing) => {
            let envelope = sealing.seal(&plain)?;
            serde_json::to_vec(&StoredFile::Sealed {
                encrypted: envelope,
            })
            .map_err(|error| StorageError::Corrupt {
                path: path.to_path_buf(),
                message: error.to_string(),
            })?
        }
        None => plain,
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(write_error)?;
    }
    atomic_write(path, &contents).map_err(write_error)
}
