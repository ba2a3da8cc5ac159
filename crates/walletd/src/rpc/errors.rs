//! Error types for the HTTP listeners and the RPC client.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while starting an HTTP listener.
#[derive(Debug, Error)]
pub enum ListenerError {
    /// Binding the listening socket failed.
    #[error("failed to bind {name} listener to {address}: {source}")]
    Bind {
        /// Listener name.
        name: &'static str,
        /// Requested address.
        address: String,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Reading the bound address failed.
    #[error("failed to read {name} listener address: {source}")]
    LocalAddress {
        /// Listener name.
        name: &'static str,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
}

/// Errors raised by [`super::RpcClient`].
#[derive(Debug, Error)]
pub enum ClientError {
    /// No daemon answers for this data directory.
    #[error("daemon not running (lock file '{lock}')")]
    DaemonNotRunning {
        /// Lock file that was inspected.
        lock: PathBuf,
    },
    /// The daemon refused the credentials.
    #[error("the daemon rejected the RPC credentials")]
    Forbidden,
    /// The HTTP exchange failed.
    #[error("RPC transport failed: {source}")]
    Http {
        /// Underlying HTTP error.
        #[source]
        source: reqwest::Error,
    },
    /// The daemon answered with a JSON-RPC error object.
    #[error("{message} (code {code})")]
    Rpc {
        /// JSON-RPC error code.
        code: i64,
        /// Error message.
        message: String,
    },
    /// The daemon's answer was not a JSON-RPC response.
    #[error("unexpected response (HTTP {status}): {message}")]
    Response {
        /// HTTP status code.
        status: u16,
        /// Human-readable reason.
        message: String,
    },
}
