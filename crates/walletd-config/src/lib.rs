//! Configuration for the wallet daemon.
//!
//! Settings are layered by [`ortho_config`]: built-in defaults, then
//! `config.toml` in the data directory, then `WALLETD_*` environment
//! variables, then command-line overrides. The daemon also writes back to the
//! file: generated RPC credentials and `setconfig` updates are persisted with
//! [`Config::save`].
//!
//! Keys that the schema does not know are preserved verbatim so that
//! `getconfig`/`setconfig` can act as a small key-value store.

mod defaults;
mod errors;
mod files;
mod logging;
mod network;
mod overrides;
mod settings;

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fs::{self, DirBuilder};
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use ortho_config::OrthoConfig;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use defaults::{
    CONFIG_FILE_NAME, DAEMON_NAME, DEFAULT_LOCK_GRACE, DEFAULT_LOG_FILTER, DEFAULT_REQUEST_TIMEOUT,
    DEFAULT_RPC_HOST, DEFAULT_RPC_PORT, DEFAULT_RPC_USER, DEFAULT_WALLET_NAME,
    DEFAULT_WATCHTOWER_PORT, LOCK_FILE_NAME, WALLETS_DIR_NAME, default_data_dir,
    default_log_filter, default_log_format,
};
pub use errors::ConfigError;
pub use files::atomic_write;
pub use logging::{LogFormat, LogFormatParseError};
pub use network::NetworkMode;
pub use overrides::ConfigOverrides;
pub use settings::Settings;

const CONFIG_PATH_FLAG: &str = "--config-path";

/// Resolved daemon configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(skip)]
    data_dir: PathBuf,
    #[serde(flatten)]
    settings: Settings,
    #[serde(flatten)]
    extra: BTreeMap<String, Value>,
}

impl Default for Config {
    fn default() -> Self {
        Self::in_dir(default_data_dir())
    }
}

impl Config {
    /// Builds a default configuration rooted at `data_dir`.
    #[must_use]
    pub fn in_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            settings: Settings::default(),
            extra: BTreeMap::new(),
        }
    }

    /// Loads configuration from the process environment and `overrides`.
    pub fn load(overrides: &ConfigOverrides) -> Result<Self, ConfigError> {
        Self::load_from_iter(overrides.to_args())
    }

    /// Loads configuration from a loader command line such as
    /// `["walletd", "--dir", "/srv/walletd", "--log-filter", "debug"]`.
    ///
    /// The first pass settles the data directory from the command line,
    /// environment and defaults. When that directory holds a configuration
    /// file, a second pass layers it beneath the environment and command line.
    pub fn load_from_iter<I, T>(args: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString>,
    {
        let mut args: Vec<OsString> = args.into_iter().map(Into::into).collect();
        let located = Settings::load_from_iter(args.clone())
            .map_err(|source| ConfigError::Load { source })?;
        let data_dir = located.dir.clone().unwrap_or_else(default_data_dir);
        let path = data_dir.join(CONFIG_FILE_NAME);
        let Some(extra) = read_extra_keys(&path)? else {
            return Ok(Self {
                data_dir,
                settings: located,
                extra: BTreeMap::new(),
            });
        };
        args.push(OsString::from(CONFIG_PATH_FLAG));
        args.push(path.into_os_string());
        let settings =
            Settings::load_from_iter(args).map_err(|source| ConfigError::Load { source })?;
        Ok(Self {
            data_dir,
            settings,
            extra,
        })
    }

    /// Creates the data directory (owner-only on Unix) if it is missing.
    pub fn ensure_data_dir(&self) -> Result<(), ConfigError> {
        let mut builder = DirBuilder::new();
        builder.recursive(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::DirBuilderExt;
            builder.mode(0o700);
        }
        builder
            .create(&self.data_dir)
            .map_err(|source| ConfigError::DataDirectory {
                path: self.data_dir.clone(),
                source,
            })
    }

    /// Writes the configuration file atomically.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.ensure_data_dir()?;
        let text =
            toml::to_string_pretty(self).map_err(|source| ConfigError::Serialise { source })?;
        let path = self.config_path();
        atomic_write(&path, text.as_bytes()).map_err(|source| ConfigError::Write { path, source })
    }

    /// Returns the value stored under `key`, or `None` when it is unset.
    #[must_use]
    pub fn get_key(&self, key: &str) -> Option<Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(mut map)) => map.remove(key).filter(|value| !value.is_null()),
            _ => None,
        }
    }

    /// Stores `value` under `key`; a `null` value unsets the key.
    ///
    /// Known keys are type-checked against the schema. Unknown keys are kept
    /// as free-form entries. The change is in memory only until [`save`].
    ///
    /// [`save`]: Config::save
    pub fn set_key(&mut self, key: &str, value: Value) -> Result<(), ConfigError> {
        let invalid = |message: String| ConfigError::InvalidValue {
            key: key.to_owned(),
            message,
        };
        let mut map = match serde_json::to_value(&*self) {
            Ok(Value::Object(map)) => map,
            Ok(_) => return Err(invalid("configuration is not a table".to_owned())),
            Err(error) => return Err(invalid(error.to_string())),
        };
        if value.is_null() {
            map.remove(key);
        } else {
            map.insert(key.to_owned(), value);
        }
        let mut updated: Self =
            serde_json::from_value(Value::Object(map)).map_err(|error| invalid(error.to_string()))?;
        updated.data_dir = std::mem::take(&mut self.data_dir);
        *self = updated;
        Ok(())
    }

    /// Records RPC credentials so they survive restarts once saved.
    pub fn set_rpc_credentials(&mut self, user: impl Into<String>, password: impl Into<String>) {
        self.settings.rpc_user = Some(user.into());
        self.settings.rpc_password = Some(password.into());
    }

    /// Sets the JSON-RPC listener port.
    #[must_use]
    pub fn with_rpc_port(mut self, port: u16) -> Self {
        self.settings.rpc_port = port;
        self
    }

    /// Sets offline mode.
    #[must_use]
    pub fn with_offline(mut self, offline: bool) -> Self {
        self.settings.network = if offline {
            NetworkMode::Offline
        } else {
            NetworkMode::Online
        };
        self
    }

    /// Enables the watch-tower listener on `host:port`.
    #[must_use]
    pub fn with_watchtower(mut self, host: impl Into<String>, port: u16) -> Self {
        self.settings.watchtower_host = Some(host.into());
        self.settings.watchtower_port = port;
        self
    }

    /// Sets the stale-lock grace period.
    #[must_use]
    pub fn with_lock_grace(mut self, grace: Duration) -> Self {
        self.settings.lock_grace_millis = duration_millis(grace);
        self
    }

    /// Directory holding the configuration, lock file and wallets.
    #[must_use]
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Path of the configuration file.
    #[must_use]
    pub fn config_path(&self) -> PathBuf {
        self.data_dir.join(CONFIG_FILE_NAME)
    }

    /// Path of the instance lock file.
    #[must_use]
    pub fn lock_path(&self) -> PathBuf {
        self.data_dir.join(LOCK_FILE_NAME)
    }

    /// Directory that relative wallet paths are resolved against.
    #[must_use]
    pub fn wallets_dir(&self) -> PathBuf {
        self.data_dir.join(WALLETS_DIR_NAME)
    }

    /// Resolves a wallet path given by a caller.
    ///
    /// `None` selects the configured default wallet. Relative paths are taken
    /// relative to [`Config::wallets_dir`], because the daemon's working
    /// directory is unrelated to the caller's.
    #[must_use]
    pub fn resolve_wallet_path(&self, requested: Option<&Path>) -> PathBuf {
        let candidate = requested
            .or(self.settings.wallet_path.as_deref())
            .map_or_else(|| PathBuf::from(DEFAULT_WALLET_NAME), Path::to_path_buf);
        if candidate.is_absolute() || candidate.starts_with("~") {
            candidate
        } else {
            self.wallets_dir().join(candidate)
        }
    }

    /// Host the JSON-RPC listener binds.
    #[must_use]
    pub fn rpc_host(&self) -> &str {
        &self.settings.rpc_host
    }

    /// Port the JSON-RPC listener binds.
    #[must_use]
    pub const fn rpc_port(&self) -> u16 {
        self.settings.rpc_port
    }

    /// Configured RPC username, if any.
    #[must_use]
    pub fn rpc_user(&self) -> Option<&str> {
        self.settings.rpc_user.as_deref()
    }

    /// Configured RPC password, if any. An empty string disables auth.
    #[must_use]
    pub fn rpc_password(&self) -> Option<&str> {
        self.settings.rpc_password.as_deref()
    }

    /// Whether the daemon runs without a network.
    #[must_use]
    pub const fn offline(&self) -> bool {
        matches!(self.settings.network, NetworkMode::Offline)
    }

    /// Whether the daemon connects to the network.
    #[must_use]
    pub const fn network_mode(&self) -> NetworkMode {
        self.settings.network
    }

    /// Watch-tower listener address, when enabled.
    #[must_use]
    pub fn watchtower(&self) -> Option<(&str, u16)> {
        self.settings.watchtower_host
            .as_deref()
            .map(|host| (host, self.settings.watchtower_port))
    }

    /// Tracing filter expression.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        &self.settings.log_filter
    }

    /// Log output format.
    #[must_use]
    pub const fn log_format(&self) -> LogFormat {
        self.settings.log_format
    }

    /// How long bridged callers wait for an operation.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.settings.request_timeout_secs)
    }

    /// Age after which an unreachable lock file may be removed.
    #[must_use]
    pub const fn lock_grace(&self) -> Duration {
        Duration::from_millis(self.settings.lock_grace_millis)
    }
}

/// Reads the free-form keys of the file at `path`, or `None` when absent.
///
/// The whole file is checked against the schema so malformed values fail
/// with the file's path.
fn read_extra_keys(path: &Path) -> Result<Option<BTreeMap<String, Value>>, ConfigError> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(ConfigError::Read {
                path: path.to_path_buf(),
                source,
            });
        }
    };
    let parsed: Config = toml::from_str(&text).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(Some(parsed.extra))
}

fn duration_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use rstest::{fixture, rstest};
    use serde_json::json;
    use tempfile::TempDir;

    use super::*;

    #[fixture]
    fn data_dir() -> TempDir {
        tempfile::tempdir().expect("temp dir")
    }

    #[rstest]
    fn missing_file_yields_defaults(data_dir: TempDir) {
        let overrides = ConfigOverrides {
            data_dir: Some(data_dir.path().to_path_buf()),
            ..ConfigOverrides::default()
        };
        let config = Config::load(&overrides).expect("load");
        assert_eq!(config.data_dir(), data_dir.path());
        assert_eq!(config.rpc_host(), DEFAULT_RPC_HOST);
        assert_eq!(config.rpc_port(), DEFAULT_RPC_PORT);
        assert_eq!(config.rpc_user(), None);
        assert_eq!(config.request_timeout(), DEFAULT_REQUEST_TIMEOUT);
        assert_eq!(config.lock_grace(), DEFAULT_LOCK_GRACE);
        assert!(config.watchtower().is_none());
    }

    #[rstest]
    fn save_then_load_keeps_credentials_and_extra_keys(data_dir: TempDir) {
        let mut config = Config::in_dir(data_dir.path());
        config.set_rpc_credentials("user", "s3cret");
        config
            .set_key("fee_per_kb", json!(2000))
            .expect("free-form key");
        config.save().expect("save");

        let overrides = ConfigOverrides {
            data_dir: Some(data_dir.path().to_path_buf()),
            ..ConfigOverrides::default()
        };
        let loaded = Config::load(&overrides).expect("reload");
        assert_eq!(loaded.rpc_user(), Some("user"));
        assert_eq!(loaded.rpc_password(), Some("s3cret"));
        assert_eq!(loaded.get_key("fee_per_kb"), Some(json!(2000)));
    }

    #[test]
    fn set_key_rejects_mistyped_known_keys() {
        let mut config = Config::default();
        let error = config
            .set_key("rpc_port", json!("not a port"))
            .expect_err("string is not a port");
        assert!(matches!(error, ConfigError::InvalidValue { ref key, .. } if key == "rpc_port"));
        assert_eq!(config.rpc_port(), DEFAULT_RPC_PORT);
    }

    #[test]
    fn set_key_null_unsets() {
        let mut config = Config::default();
        config.set_key("color", json!("blue")).expect("set");
        config.set_key("color", Value::Null).expect("unset");
        assert_eq!(config.get_key("color"), None);
    }

    #[test]
    fn set_key_keeps_data_dir() {
        let mut config = Config::in_dir("/srv/walletd");
        config.set_key("rpc_port", json!(7777)).expect("set port");
        assert_eq!(config.rpc_port(), 7777);
        assert_eq!(config.data_dir(), Path::new("/srv/walletd"));
    }

    #[rstest]
    #[case(None, "/data/wallets/default_wallet")]
    #[case(Some("mine"), "/data/wallets/mine")]
    #[case(Some("/elsewhere/w1"), "/elsewhere/w1")]
    fn resolves_wallet_paths(#[case] requested: Option<&str>, #[case] expected: &str) {
        let config = Config::in_dir("/data");
        assert_eq!(
            config.resolve_wallet_path(requested.map(Path::new)),
            PathBuf::from(expected)
        );
    }

    #[rstest]
    fn command_line_overrides_the_file(data_dir: TempDir) {
        fs::write(
            data_dir.path().join(CONFIG_FILE_NAME),
            "rpc_port = 7000\nlog_filter = \"debug\"\n",
        )
        .expect("write config");
        let overrides = ConfigOverrides {
            data_dir: Some(data_dir.path().to_path_buf()),
            offline: true,
            rpc_port: Some(7001),
            ..ConfigOverrides::default()
        };
        let config = Config::load(&overrides).expect("load");
        assert_eq!(config.rpc_port(), 7001);
        assert_eq!(config.log_filter(), "debug");
        assert!(config.offline());
    }

    #[rstest]
    fn unknown_network_mode_fails_to_load(data_dir: TempDir) {
        let args = [
            OsString::from("walletd"),
            OsString::from("--dir"),
            data_dir.path().as_os_str().to_owned(),
            OsString::from("--network"),
            OsString::from("sometimes"),
        ];
        let error = Config::load_from_iter(args).expect_err("invalid mode");
        assert!(matches!(error, ConfigError::Load { .. }));
    }
}
