use std::path::PathBuf;

use ortho_config::OrthoConfig;
use serde::{Deserialize, Serialize};

use crate::defaults::{
    DEFAULT_LOCK_GRACE, DEFAULT_LOG_FILTER, DEFAULT_REQUEST_TIMEOUT, DEFAULT_RPC_HOST,
    DEFAULT_RPC_PORT, DEFAULT_WATCHTOWER_PORT, default_log_format,
};
use crate::logging::LogFormat;
use crate::network::NetworkMode;

/// Schema-checked settings, layered by the derived loader.
///
/// Every field is reachable as `--kebab-case` on the loader's command line,
/// as `WALLETD_SCREAMING_CASE` in the environment and under its own name in
/// the configuration file named by `--config-path`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, OrthoConfig)]
#[serde(default)]
#[ortho_config(prefix = "WALLETD")]
pub struct Settings {
    /// Data directory; only consulted before the file is read.
    #[serde(skip_serializing)]
    pub(crate) dir: Option<PathBuf>,
    pub(crate) rpc_host: String,
    pub(crate) rpc_port: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) rpc_user: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) rpc_password: Option<String>,
    pub(crate) network: NetworkMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) wallet_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) watchtower_host: Option<String>,
    pub(crate) watchtower_port: u16,
    pub(crate) log_filter: String,
    pub(crate) log_format: LogFormat,
    pub(crate) request_timeout_secs: u64,
    pub(crate) lock_grace_millis: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            dir: None,
            rpc_host: DEFAULT_RPC_HOST.to_owned(),
            rpc_port: DEFAULT_RPC_PORT,
            rpc_user: None,
            rpc_password: None,
            network: NetworkMode::default(),
            wallet_path: None,
            watchtower_host: None,
            watchtower_port: DEFAULT_WATCHTOWER_PORT,
            log_filter: DEFAULT_LOG_FILTER.to_owned(),
            log_format: default_log_format(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT.as_secs(),
            lock_grace_millis: u64::try_from(DEFAULT_LOCK_GRACE.as_millis())
                .unwrap_or(u64::MAX),
        }
    }
}
