//! The instance lock that elects one daemon per data directory.
//!
//! Creating the lock file with `create_new` is the only arbiter: whoever
//! creates it is the daemon. Everyone else reads the address recorded in it,
//! probes that address and either defers to the running daemon or, when the
//! probe fails and the lock is older than the grace period, removes the lock
//! and tries again.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde_json::{Value, json};
use tracing::{debug, info, warn};

use super::PROCESS_TARGET;
use super::errors::LockError;

/// The content of a lock file: the daemon's address and creation time.
///
/// Encoded as `[[host, port], created]` with `created` in fractional Unix
/// seconds.
#[derive(Debug, Clone, PartialEq)]
pub struct LockRecord {
    /// Listener host.
    pub host: String,
    /// Listener port.
    pub port: u16,
    /// Creation time in Unix seconds.
    pub created: f64,
}

impl LockRecord {
    /// Builds a record for `address`, created now.
    #[must_use]
    pub fn new(address: SocketAddr) -> Self {
        Self {
            host: address.ip().to_string(),
            port: address.port(),
            created: unix_now(),
        }
    }

    /// Parses lock file content. Corrupt or partial content yields `None`.
    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        let value: Value = serde_json::from_str(text).ok()?;
        let [address, created] = value.as_array()?.as_slice() else {
            return None;
        };
        let [host, port] = address.as_array()?.as_slice() else {
            return None;
        };
        Some(Self {
            host: host.as_str()?.to_owned(),
            port: u16::try_from(port.as_u64()?).ok()?,
            created: created.as_f64()?,
        })
    }

    /// Encodes the record as lock file content.
    #[must_use]
    pub fn encode(&self) -> String {
        json!([[self.host, self.port], self.created]).to_string()
    }

    /// Base URL of the recorded listener.
    #[must_use]
    pub fn url(&self) -> String {
        if self.host.contains(':') {
            format!("http://[{}]:{}/", self.host, self.port)
        } else {
            format!("http://{}:{}/", self.host, self.port)
        }
    }

    /// How long ago the record was written.
    #[must_use]
    pub fn age(&self) -> Duration {
        Duration::try_from_secs_f64(unix_now() - self.created).unwrap_or_default()
    }
}

/// What a lock file looked like at one moment.
#[derive(Debug, Clone, PartialEq)]
pub struct LockSnapshot {
    content: String,
    modified: SystemTime,
}

impl LockSnapshot {
    /// Reads the lock at `path`; `Ok(None)` when there is none.
    ///
    /// # Errors
    ///
    /// Returns the IO error when the file exists but cannot be read.
    pub fn read(path: &Path) -> io::Result<Option<Self>> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(error) => return Err(error),
        };
        let modified = match fs::metadata(path) {
            Ok(metadata) => metadata.modified()?,
            Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(error) => return Err(error),
        };
        Ok(Some(Self { content, modified }))
    }

    /// The recorded daemon, unless the content is corrupt or partial.
    #[must_use]
    pub fn record(&self) -> Option<LockRecord> {
        LockRecord::parse(&self.content)
    }

    /// Age of the lock: from its record when readable, else from the file's
    /// modification time.
    #[must_use]
    pub fn age(&self) -> Duration {
        match self.record() {
            Some(record) => record.age(),
            None => self.modified.elapsed().unwrap_or_default(),
        }
    }
}

/// Decides whether the daemon recorded in a lock still answers.
#[cfg_attr(test, mockall::automock)]
pub trait LivenessProbe: Send + Sync {
    /// Whether a daemon answers at `record`'s address.
    fn is_alive(&self, record: &LockRecord) -> bool;
}

/// Retry behaviour for [`InstanceLock::acquire`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockPolicy {
    /// Minimum age before an unreachable lock is evicted.
    pub grace: Duration,
    /// Pause between attempts while a young lock cannot be probed.
    pub retry_interval: Duration,
    /// Attempts before giving up.
    pub max_attempts: u32,
}

impl LockPolicy {
    /// Policy with the given grace period and default retry pacing.
    #[must_use]
    pub const fn with_grace(grace: Duration) -> Self {
        Self {
            grace,
            retry_interval: Duration::from_millis(200),
            max_attempts: 50,
        }
    }
}

/// Result of trying to become the daemon.
#[derive(Debug)]
pub enum LockOutcome {
    /// This process holds the lock and is the daemon.
    Acquired(InstanceLock),
    /// Another daemon answers at the recorded address.
    Running(LockRecord),
}

/// Ownership of the lock file. Dropping it removes the file.
#[derive(Debug)]
pub struct InstanceLock {
    path: PathBuf,
    _file: File,
}

impl InstanceLock {
    /// Tries to become the daemon for the lock at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`LockError`] when the lock cannot be created, inspected or
    /// evicted, or when attempts run out while another process holds a
    /// young lock.
    pub fn acquire(
        path: &Path,
        policy: LockPolicy,
        probe: &dyn LivenessProbe,
    ) -> Result<LockOutcome, LockError> {
        for attempt in 1..=policy.max_attempts {
            match create_exclusive(path) {
                Ok(file) => {
                    info!(
                        target: PROCESS_TARGET,
                        file = %path.display(),
                        attempt,
                        "acquired instance lock"
                    );
                    return Ok(LockOutcome::Acquired(Self {
                        path: path.to_path_buf(),
                        _file: file,
                    }));
                }
                Err(error) if error.kind() == io::ErrorKind::AlreadyExists => {}
                Err(source) => {
                    return Err(LockError::Create {
                        path: path.to_path_buf(),
                        source,
                    });
                }
            }

            let Some(snapshot) = LockSnapshot::read(path).map_err(|source| LockError::Inspect {
                path: path.to_path_buf(),
                source,
            })?
            else {
                continue;
            };
            if let Some(record) = snapshot.record()
                && probe.is_alive(&record)
            {
                info!(
                    target: PROCESS_TARGET,
                    address = %record.url(),
                    "daemon already running"
                );
                return Ok(LockOutcome::Running(record));
            }
            if snapshot.age() >= policy.grace {
                evict_if_unchanged(path, &snapshot)?;
                continue;
            }
            debug!(
                target: PROCESS_TARGET,
                file = %path.display(),
                attempt,
                "lock held by a starting daemon; waiting"
            );
            thread::sleep(policy.retry_interval);
        }
        Err(LockError::Contended {
            path: path.to_path_buf(),
            attempts: policy.max_attempts,
        })
    }

    /// Writes the daemon's listener address into the lock.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::Write`] when the lock cannot be rewritten.
    pub fn record(&self, address: SocketAddr) -> Result<LockRecord, LockError> {
        let record = LockRecord::new(address);
        let write_error = |source| LockError::Write {
            path: self.path.clone(),
            source,
        };
        let mut file = OpenOptions::new()
            .write(true)
            .truncate(true)
            .open(&self.path)
            .map_err(write_error)?;
        file.write_all(record.encode().as_bytes())
            .map_err(write_error)?;
        file.sync_all().map_err(write_error)?;
        info!(
            target: PROCESS_TARGET,
            file = %self.path.display(),
            address = %address,
            "recorded listener address in lock"
        );
        Ok(record)
    }

    /// Lock file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for InstanceLock {
    fn drop(&mut self) {
        match fs::remove_file(&self.path) {
            Err(error) if error.kind() != io::ErrorKind::NotFound => {
                warn!(
                    target: PROCESS_TARGET,
                    file = %self.path.display(),
                    error = %error,
                    "failed to remove lock file"
                );
            }
            _ => {}
        }
    }
}

fn create_exclusive(path: &Path) -> io::Result<File> {
    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    options.open(path)
}

/// Removes the lock only if it still holds what was probed, so a lock
/// rewritten by a newer daemon in the meantime survives.
fn evict_if_unchanged(path: &Path, probed: &LockSnapshot) -> Result<(), LockError> {
    let current = LockSnapshot::read(path).map_err(|source| LockError::Inspect {
        path: path.to_path_buf(),
        source,
    })?;
    if current.as_ref() != Some(probed) {
        return Ok(());
    }
    warn!(
        target: PROCESS_TARGET,
        file = %path.display(),
        "removing stale instance lock"
    );
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(LockError::Remove {
            path: path.to_path_buf(),
            source,
        }),
    }
}

fn unix_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs_f64())
        .unwrap_or_default()
}
