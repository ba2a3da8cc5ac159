use thiserror::Error;
use walletd_config::ConfigError;

use crate::sessions::StorageError;

/// Failures raised inside an operation body.
///
/// These travel back to the caller as JSON-RPC error objects; they never
/// tear down the transport.
#[derive(Debug, Error)]
pub enum OperationError {
    /// A supplied password does not match the bound wallet.
    #[error("invalid password")]
    InvalidPassword,
    /// A nested command names no registered operation.
    #[error("unknown command '{name}'")]
    UnknownCommand { name: String },
    /// A value inside the body had the wrong type or shape.
    #[error("invalid value: {message}")]
    InvalidValue { message: String },
    /// Wallet storage failed.
    #[error(transparent)]
    Storage(StorageError),
    /// Reading or persisting configuration failed.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// Internal error (e.g. a missing binding).
    #[error("internal error: {message}")]
    Internal { message: String },
}

impl OperationError {
    /// Creates an invalid value error.
    pub fn invalid_value(message: impl Into<String>) -> Self {
        Self::InvalidValue {
            message: message.into(),
        }
    }

    /// Creates an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

impl From<StorageError> for OperationError {
    fn from(error: StorageError) -> Self {
        match error {
            StorageError::InvalidPassword => Self::InvalidPassword,
            other => Self::Storage(other),
        }
    }
}
