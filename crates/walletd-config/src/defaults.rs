use std::env;
use std::path::PathBuf;
use std::time::Duration;

use dirs::data_dir;

use crate::logging::LogFormat;

/// Name of the daemon, used for its data directory and process name.
pub const DAEMON_NAME: &str = "walletd";

/// Loopback address the JSON-RPC listener binds by default.
pub const DEFAULT_RPC_HOST: &str = "127.0.0.1";

/// Port `0` asks the operating system for an ephemeral port.
pub const DEFAULT_RPC_PORT: u16 = 0;

/// Username used when RPC credentials are generated.
pub const DEFAULT_RPC_USER: &str = "user";

/// Port used by the watch-tower listener when only a host is configured.
pub const DEFAULT_WATCHTOWER_PORT: u16 = 12345;

/// Default log filter expression used by the binaries.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Default time a bridged caller waits for an operation to finish.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Default age after which an unreachable lock file is considered stale.
pub const DEFAULT_LOCK_GRACE: Duration = Duration::from_millis(1000);

/// Name of the configuration file inside the data directory.
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Name of the instance lock file inside the data directory.
pub const LOCK_FILE_NAME: &str = "daemon";

/// Directory holding wallet files, relative to the data directory.
pub const WALLETS_DIR_NAME: &str = "wallets";

/// File name of the wallet opened when no path is given.
pub const DEFAULT_WALLET_NAME: &str = "default_wallet";

/// Default log filter expression used by the binaries.
pub fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

/// Default logging format for the binaries.
pub fn default_log_format() -> LogFormat {
    LogFormat::Json
}

/// Computes the directory holding configuration, lock file and wallets.
///
/// Falls back to the temporary directory when the platform reports no data
/// directory (for example, a service account without a home).
pub fn default_data_dir() -> PathBuf {
    data_dir()
        .unwrap_or_else(env::temp_dir)
        .join(DAEMON_NAME)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_dir_is_named_after_the_daemon() {
        let dir = default_data_dir();
        assert_eq!(
            dir.file_name().and_then(|name| name.to_str()),
            Some("walletd")
        );
    }
}
