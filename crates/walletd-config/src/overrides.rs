use std::ffi::OsString;
use std::path::PathBuf;

use clap::Args;

use crate::defaults::DAEMON_NAME;
use crate::logging::LogFormat;
use crate::network::NetworkMode;

/// Command-line settings that take precedence over the file and environment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Args)]
pub struct ConfigOverrides {
    /// Data directory holding the configuration, lock file and wallets.
    #[arg(long = "dir", short = 'D', value_name = "PATH", global = true)]
    pub data_dir: Option<PathBuf>,
    /// Run without a network connection.
    #[arg(long, global = true)]
    pub offline: bool,
    /// Tracing filter expression, for example `info,walletd::rpc=debug`.
    #[arg(long, value_name = "FILTER", global = true)]
    pub log_filter: Option<String>,
    /// Log output format (`json` or `compact`).
    #[arg(long, value_name = "FORMAT", global = true)]
    pub log_format: Option<LogFormat>,
    /// Port for the JSON-RPC listener; `0` picks an ephemeral port.
    #[arg(long, value_name = "PORT", global = true)]
    pub rpc_port: Option<u16>,
}

impl ConfigOverrides {
    /// Renders the overrides as the loader's command line.
    ///
    /// Only flags that were given are emitted, so unset overrides leave the
    /// file and environment in charge.
    #[must_use]
    pub fn to_args(&self) -> Vec<OsString> {
        let mut args = vec![OsString::from(DAEMON_NAME)];
        let mut push = |flag: &str, value: OsString| {
            args.push(OsString::from(flag));
            args.push(value);
        };
        if let Some(dir) = &self.data_dir {
            push("--dir", dir.clone().into_os_string());
        }
        if self.offline {
            push("--network", NetworkMode::Offline.to_string().into());
        }
        if let Some(filter) = &self.log_filter {
            push("--log-filter", filter.into());
        }
        if let Some(format) = self.log_format {
            push("--log-format", format.to_string().into());
        }
        if let Some(port) = self.rpc_port {
            push("--rpc-port", port.to_string().into());
        }
        args
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_overrides_render_only_the_program_name() {
        assert_eq!(ConfigOverrides::default().to_args(), vec![OsString::from("walletd")]);
    }

    #[test]
    fn given_overrides_become_loader_flags() {
        let overrides = ConfigOverrides {
            data_dir: Some(PathBuf::from("/srv/walletd")),
            offline: true,
            log_format: Some(LogFormat::Compact),
            rpc_port: Some(7777),
            ..ConfigOverrides::default()
        };
        let rendered: Vec<String> = overrides
            .to_args()
            .into_iter()
            .map(|arg| arg.to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            rendered,
            [
                "walletd",
                "--dir",
                "/srv/walletd",
                "--network",
                "offline",
                "--log-format",
                "compact",
                "--rpc-port",
                "7777",
            ]
        );
    }
}
