//! Structured telemetry initialisation for the daemon.

use std::io::{self, IsTerminal};

use once_cell::sync::OnceCell;
use tracing::{Subscriber, info, subscriber::SetGlobalDefaultError};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;

use walletd_config::{Config, LogFormat};

const TELEMETRY_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::telemetry");

static INSTALLED_FORMAT: OnceCell<LogFormat> = OnceCell::new();

/// Handle returned when telemetry has been initialised.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TelemetryHandle {
    format: LogFormat,
}

impl TelemetryHandle {
    /// Format of the subscriber that is actually installed.
    #[must_use]
    pub fn format(self) -> LogFormat {
        self.format
    }
}

/// Errors encountered while configuring telemetry.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    /// Failed to parse the configured log filter expression.
    #[error("invalid log filter `{filter}`: {message}")]
    Filter { filter: String, message: String },
    /// Failed to install the tracing subscriber.
    #[error("failed to install telemetry subscriber: {0}")]
    Subscriber(SetGlobalDefaultError),
}

/// Configures the global tracing subscriber when invoked for the first time.
///
/// Later calls return the handle of the first installation without touching
/// the global state, even when the configuration differs.
///
/// # Examples
///
/// ```rust
/// use walletd::telemetry;
/// use walletd_config::Config;
///
/// # fn main() -> Result<(), walletd::telemetry::TelemetryError> {
/// let config = Config::in_dir("/tmp/walletd-doc");
/// let first = telemetry::initialise(&config)?;
/// let second = telemetry::initialise(&config)?;
/// assert_eq!(first.format(), second.format());
/// # Ok(())
/// # }
/// ```
pub fn initialise(config: &Config) -> Result<TelemetryHandle, TelemetryError> {
    INSTALLED_FORMAT
        .get_or_try_init(|| install_subscriber(config))
        .map(|format| TelemetryHandle { format: *format })
}

fn parse_filter(expression: &str) -> Result<EnvFilter, TelemetryError> {
    EnvFilter::try_new(expression).map_err(|error| TelemetryError::Filter {
        filter: expression.to_owned(),
        message: error.to_string(),
    })
}

fn install_subscriber(config: &Config) -> Result<LogFormat, TelemetryError> {
    let filter = parse_filter(config.log_filter())?;

    let builder = |filter: EnvFilter| {
        fmt::Subscriber::builder()
            .with_env_filter(filter)
            .with_target(true)
            .with_level(true)
            .with_thread_names(true)
            .with_writer(io::stderr)
            .with_ansi(io::stderr().is_terminal())
            .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
    };

    let format = config.log_format();
    let subscriber: Box<dyn Subscriber + Send + Sync> = match format {
        LogFormat::Json => Box::new(builder(filter).json().flatten_event(true).finish()),
        LogFormat::Compact => Box::new(builder(filter).compact().finish()),
    };

    tracing::subscriber::set_global_default(subscriber).map_err(TelemetryError::Subscriber)?;
    info!(
        target: TELEMETRY_TARGET,
        data_dir = %config.data_dir().display(),
        offline = config.offline(),
        %format,
        "telemetry initialised"
    );
    Ok(format)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_filter_names_the_expression() {
        let error = parse_filter("walletd=[").expect_err("filter is malformed");
        assert!(matches!(&error, TelemetryError::Filter { filter, .. } if filter == "walletd=["));
        assert!(error.to_string().contains("`walletd=[`"));
    }

    #[test]
    fn later_initialisation_reports_the_installed_format() {
        let dir = tempfile::tempdir().expect("temp dir");
        let first = initialise(&Config::in_dir(dir.path())).expect("telemetry installs");
        let mut other = Config::in_dir(dir.path());
        let flipped = match first.format() {
            LogFormat::Json => "compact",
            LogFormat::Compact => "json",
        };
        other
            .set_key("log_format", serde_json::Value::String(flipped.to_owned()))
            .expect("format is settable");
        let second = initialise(&other).expect("telemetry already installed");
        assert_eq!(second.format(), first.format());
    }
}
