use std::cell::RefCell;
use std::ffi::OsString;
use std::fs;
use std::sync::{Mutex, MutexGuard, PoisonError};

use once_cell::sync::Lazy;
use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};
use tempfile::TempDir;

use walletd_config::{
    CONFIG_FILE_NAME, Config, ConfigOverrides, DEFAULT_RPC_HOST, DEFAULT_WATCHTOWER_PORT,
    default_log_filter, default_log_format,
};

const LOG_FILTER_ENV: &str = "WALLETD_LOG_FILTER";
const NETWORK_ENV: &str = "WALLETD_NETWORK";

// Scenarios share the process environment.
static ENV_MUTEX: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

struct Harness {
    temp_dir: TempDir,
    overrides: RefCell<ConfigOverrides>,
    env_overrides: RefCell<Vec<(&'static str, Option<OsString>)>>,
    _env_guard: MutexGuard<'static, ()>,
}

impl Harness {
    fn new() -> Self {
        let guard = ENV_MUTEX.lock().unwrap_or_else(PoisonError::into_inner);
        let temp_dir = match TempDir::new() {
            Ok(dir) => dir,
            Err(error) => panic!("failed to create temporary directory: {error}"),
        };
        let overrides = ConfigOverrides {
            data_dir: Some(temp_dir.path().to_path_buf()),
            ..ConfigOverrides::default()
        };
        let harness = Self {
            temp_dir,
            overrides: RefCell::new(overrides),
            env_overrides: RefCell::new(Vec::new()),
            _env_guard: guard,
        };
        harness.remove_env(LOG_FILTER_ENV);
        harness.remove_env(NETWORK_ENV);
        harness
    }

    fn write_config(&self, contents: &str) {
        let path = self.temp_dir.path().join(CONFIG_FILE_NAME);
        if let Err(error) = fs::write(&path, contents) {
            panic!("failed to write configuration: {error}");
        }
    }

    fn set_env(&self, key: &'static str, value: &str) {
        let previous = std::env::var_os(key);
        // Environment mutation is `unsafe` in edition 2024; `Drop` restores it
        // while the mutex is still held.
        unsafe { std::env::set_var(key, value) };
        self.env_overrides.borrow_mut().push((key, previous));
    }

    fn remove_env(&self, key: &'static str) {
        let previous = std::env::var_os(key);
        unsafe { std::env::remove_var(key) };
        self.env_overrides.borrow_mut().push((key, previous));
    }

    fn load(&self) -> Result<Config, String> {
        Config::load(&self.overrides.borrow()).map_err(|error| error.to_string())
    }

    fn load_ok(&self) -> Config {
        match self.load() {
            Ok(config) => config,
            Err(error) => panic!("configuration failed to load: {error}"),
        }
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        let mut overrides = self.env_overrides.borrow_mut();
        while let Some((key, value)) = overrides.pop() {
            match value {
                Some(value) => unsafe { std::env::set_var(key, value) },
                None => unsafe { std::env::remove_var(key) },
            }
        }
    }
}

#[fixture]
fn harness() -> Harness {
    Harness::new()
}

#[given("an empty data directory")]
fn given_empty_directory(harness: &Harness) {
    let _ = harness;
}

#[given("a configuration file setting the log filter to \"{filter}\"")]
fn given_file_filter(harness: &Harness, filter: String) {
    harness.write_config(&format!("log_filter = \"{filter}\"\n"));
}

#[given("a configuration file setting the RPC port to \"{port}\"")]
fn given_file_port(harness: &Harness, port: String) {
    harness.write_config(&format!("rpc_port = \"{port}\"\n"));
}

#[given("the environment sets the log filter to \"{filter}\"")]
fn given_env_filter(harness: &Harness, filter: String) {
    harness.set_env(LOG_FILTER_ENV, &filter);
}

#[given("the environment selects the \"{mode}\" network")]
fn given_env_network(harness: &Harness, mode: String) {
    harness.set_env(NETWORK_ENV, &mode);
}

#[then("loading the configuration runs the daemon offline")]
fn then_offline(harness: &Harness) {
    let config = harness.load_ok();
    assert!(config.offline());
    assert_eq!(config.get_key("network"), Some("offline".into()));
}

#[when("the command line sets the log filter to \"{filter}\"")]
fn when_cli_filter(harness: &Harness, filter: String) {
    harness.overrides.borrow_mut().log_filter = Some(filter);
}

#[then("loading the configuration resolves the log filter to \"{filter}\"")]
fn then_filter(harness: &Harness, filter: String) {
    assert_eq!(harness.load_ok().log_filter(), filter);
}

#[then("loading the configuration applies the built-in defaults")]
fn then_defaults(harness: &Harness) {
    let config = harness.load_ok();
    assert_eq!(config.log_filter(), default_log_filter());
    assert_eq!(config.log_format(), default_log_format());
    assert_eq!(config.rpc_host(), DEFAULT_RPC_HOST);
    assert_eq!(config.rpc_port(), 0);
    assert!(!config.offline());
    assert_eq!(config.get_key("watchtower_port"), Some(DEFAULT_WATCHTOWER_PORT.into()));
}

#[then("loading the configuration fails mentioning \"{fragment}\"")]
fn then_fails(harness: &Harness, fragment: String) {
    match harness.load() {
        Ok(config) => panic!("expected a load failure, got {config:?}"),
        Err(message) => assert!(
            message.contains(&fragment),
            "error '{message}' should mention '{fragment}'"
        ),
    }
}

#[scenario(path = "tests/features/configuration_precedence.feature")]
fn configuration_precedence(#[from(harness)] harness: Harness) {
    let _ = harness;
}
