//! Errors raised while loading, editing or persisting configuration.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use ortho_config::OrthoError;
use thiserror::Error;

/// Errors surfaced by [`crate::Config`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file exists but could not be read.
    #[error("failed to read configuration '{path}': {source}")]
    Read {
        /// Configuration file path.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The configuration file is not valid TOML for this schema.
    #[error("failed to parse configuration '{path}': {source}")]
    Parse {
        /// Configuration file path.
        path: PathBuf,
        /// Underlying TOML error.
        #[source]
        source: toml::de::Error,
    },
    /// Rendering the configuration as TOML failed.
    #[error("failed to serialise configuration: {source}")]
    Serialise {
        /// Underlying TOML error.
        #[source]
        source: toml::ser::Error,
    },
    /// Writing the configuration file failed.
    #[error("failed to write configuration '{path}': {source}")]
    Write {
        /// Configuration file path.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The data directory could not be created.
    #[error("failed to create data directory '{path}': {source}")]
    DataDirectory {
        /// Directory that could not be created.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The layered loader rejected the command line, environment or file.
    #[error("failed to load configuration: {source}")]
    Load {
        /// Loader error, possibly aggregating several layers.
        #[source]
        source: Arc<OrthoError>,
    },
    /// A key update produced a configuration that does not fit the schema.
    #[error("invalid value for configuration key '{key}': {message}")]
    InvalidValue {
        /// Key being updated.
        key: String,
        /// Human-readable reason.
        message: String,
    },
}
