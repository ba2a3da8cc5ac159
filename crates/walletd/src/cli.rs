//! Command-line front end of the `walletd` binary.
//!
//! `walletd daemon` runs the daemon. Every other subcommand forwards to the
//! daemon that owns the data directory: `call` sends a `run_cmdline` request
//! whose options name the command, its parameters and the wallet.

use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use serde_json::{Map, Value};
use thiserror::Error;
use walletd_config::{Config, ConfigError, ConfigOverrides};

use crate::dispatch::Params;
use crate::process::{LaunchError, LaunchMode, run_daemon};
use crate::registry::{Parameter, Registry, RegistryError};
use crate::rpc::{ClientError, RpcClient};

/// Command-line interface of the wallet daemon.
#[derive(Parser, Debug)]
#[command(name = "walletd", version, about, disable_help_subcommand = true)]
pub struct Cli {
    /// Settings overriding the configuration file and environment.
    #[command(flatten)]
    pub overrides: ConfigOverrides,
    /// What to do.
    #[command(subcommand)]
    pub command: CliCommand,
}

/// Subcommands of the `walletd` binary.
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum CliCommand {
    /// Runs the daemon for the data directory.
    Daemon {
        /// Detaches into the background.
        #[arg(long)]
        detach: bool,
    },
    /// Stops the running daemon.
    Stop,
    /// Calls an operation on the running daemon.
    Call {
        /// Operation name, for example `list_wallets`.
        #[arg(value_name = "COMMAND")]
        command: String,
        /// Positional parameters; JSON values are decoded, anything else is
        /// sent as a string.
        #[arg(value_name = "ARG", num_args = 0.., allow_hyphen_values = true)]
        arguments: Vec<String>,
        /// Wallet the command binds to.
        #[arg(long, short = 'w', value_name = "PATH")]
        wallet: Option<PathBuf>,
        /// Wallet password.
        #[arg(long, short = 'P')]
        password: Option<String>,
    },
}

/// Errors reported by the command-line front end.
#[derive(Debug, Error)]
pub enum CliError {
    /// The configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// The operation table is invalid.
    #[error(transparent)]
    Registry(#[from] RegistryError),
    /// The command is not a known operation.
    #[error("unknown command '{name}'; run `walletd call commands` for a list")]
    UnknownCommand {
        /// Requested name.
        name: String,
    },
    /// More positional arguments than the command declares.
    #[error("'{command}' takes at most {expected} arguments, got {actual}")]
    TooManyArguments {
        /// Command name.
        command: String,
        /// Declared parameter count.
        expected: usize,
        /// Supplied argument count.
        actual: usize,
    },
    /// Talking to the daemon failed.
    #[error(transparent)]
    Client(#[from] ClientError),
    /// Running the daemon failed.
    #[error(transparent)]
    Launch(#[from] LaunchError),
    /// Writing the result failed.
    #[error("failed to write output: {0}")]
    Output(#[from] io::Error),
}

impl CliError {
    /// Process exit code for this error.
    #[must_use]
    pub fn exit_code(&self) -> ExitCode {
        match self {
            Self::UnknownCommand { .. } | Self::TooManyArguments { .. } => ExitCode::from(2),
            _ => ExitCode::FAILURE,
        }
    }
}

/// Runs `cli`, writing results to `stdout` and diagnostics to `stderr`.
pub fn run(cli: Cli, stdout: &mut dyn Write, stderr: &mut dyn Write) -> ExitCode {
    match execute(cli, stdout) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            let _ = writeln!(stderr, "walletd: {error}");
            error.exit_code()
        }
    }
}

fn execute(cli: Cli, stdout: &mut dyn Write) -> Result<(), CliError> {
    let Cli { overrides, command } = cli;
    match command {
        CliCommand::Daemon { detach } => {
            run_daemon(overrides, LaunchMode::from_detach(detach))?;
            Ok(())
        }
        CliCommand::Stop => {
            let client = RpcClient::from_config(&Config::load(&overrides)?)?;
            let result = client.call("stop", Params::default())?;
            print_result(stdout, &result)
        }
        CliCommand::Call {
            command,
            arguments,
            wallet,
            password,
        } => {
            let registry = Registry::builtin()?;
            let options = command_options(&registry, &command, &arguments, wallet, password)?;
            let client = RpcClient::from_config(&Config::load(&overrides)?)?;
            let result = client.call(
                "run_cmdline",
                Params::Positional(vec![Value::Object(options)]),
            )?;
            print_result(stdout, &result)
        }
    }
}

/// Builds the `run_cmdline` options for `command`.
///
/// Positional arguments are matched to the declared parameters in order.
/// Arguments for `password` or `wallet_path` never override the flags.
///
/// # Errors
///
/// Returns [`CliError::UnknownCommand`] for names the registry lacks and
/// [`CliError::TooManyArguments`] when more arguments than parameters are
/// given.
pub fn command_options(
    registry: &Registry,
    command: &str,
    arguments: &[String],
    wallet: Option<PathBuf>,
    password: Option<String>,
) -> Result<Map<String, Value>, CliError> {
    let descriptor = registry
        .lookup(command)
        .map_err(|_| CliError::UnknownCommand {
            name: command.to_owned(),
        })?;
    let declared: Vec<&Parameter> = descriptor.parameters().collect();
    if arguments.len() > declared.len() {
        return Err(CliError::TooManyArguments {
            command: command.to_owned(),
            expected: declared.len(),
            actual: arguments.len(),
        });
    }
    let mut options = Map::new();
    for (parameter, raw) in declared.iter().zip(arguments) {
        options.insert(parameter.name().to_owned(), decode_argument(raw));
    }
    options.insert("cmd".to_owned(), Value::String(command.to_owned()));
    if let Some(wallet) = wallet {
        options.insert(
            "wallet_path".to_owned(),
            Value::String(wallet.display().to_string()),
        );
    }
    if let Some(password) = password {
        options.insert("password".to_owned(), Value::String(password));
    }
    Ok(options)
}

fn decode_argument(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_owned()))
}

fn print_result(stdout: &mut dyn Write, result: &Value) -> Result<(), CliError> {
    let rendered = match result {
        Value::String(text) => text.clone(),
        other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
    };
    writeln!(stdout, "{rendered}")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use rstest::{fixture, rstest};
    use serde_json::json;

    use super::*;

    #[fixture]
    fn registry() -> Registry {
        Registry::builtin().expect("builtin registry")
    }

    #[rstest]
    #[case(&["walletd", "daemon"], CliCommand::Daemon { detach: false })]
    #[case(&["walletd", "daemon", "--detach"], CliCommand::Daemon { detach: true })]
    #[case(&["walletd", "stop"], CliCommand::Stop)]
    fn parses_lifecycle_commands(#[case] argv: &[&str], #[case] expected: CliCommand) {
        let cli = Cli::try_parse_from(argv).expect("parses");
        assert_eq!(cli.command, expected);
    }

    #[test]
    fn global_overrides_follow_the_subcommand() {
        let cli = Cli::try_parse_from([
            "walletd", "call", "getinfo", "--offline", "--dir", "/tmp/w",
        ])
        .expect("parses");
        assert!(cli.overrides.offline);
        assert_eq!(cli.overrides.data_dir, Some(PathBuf::from("/tmp/w")));
    }

    #[rstest]
    fn maps_positional_arguments_to_declared_names(registry: Registry) {
        let options = command_options(
            &registry,
            "setconfig",
            &["fee_level".to_owned(), "3".to_owned()],
            None,
            None,
        )
        .expect("options");
        assert_eq!(options.get("key"), Some(&json!("fee_level")));
        assert_eq!(options.get("value"), Some(&json!(3)));
        assert_eq!(options.get("cmd"), Some(&json!("setconfig")));
    }

    #[rstest]
    fn wallet_and_password_flags_become_options(registry: Registry) {
        let options = command_options(
            &registry,
            "get",
            &["seed_version".to_owned()],
            Some(PathBuf::from("/w/default_wallet")),
            Some("hunter2".to_owned()),
        )
        .expect("options");
        assert_eq!(options.get("wallet_path"), Some(&json!("/w/default_wallet")));
        assert_eq!(options.get("password"), Some(&json!("hunter2")));
    }

    #[rstest]
    fn rejects_unknown_commands_and_extra_arguments(registry: Registry) {
        assert!(matches!(
            command_options(&registry, "gui", &[], None, None),
            Err(CliError::UnknownCommand { .. })
        ));
        assert!(matches!(
            command_options(&registry, "ping", &["x".to_owned()], None, None),
            Err(CliError::TooManyArguments { expected: 0, actual: 1, .. })
        ));
    }

    #[test]
    fn strings_print_bare_and_values_print_as_json() {
        let mut out = Vec::new();
        print_result(&mut out, &json!("Daemon stopped")).expect("print");
        print_result(&mut out, &json!(true)).expect("print");
        assert_eq!(String::from_utf8(out).expect("utf8"), "Daemon stopped\ntrue\n");
    }
}
