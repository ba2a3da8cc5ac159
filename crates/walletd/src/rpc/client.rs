//! Blocking JSON-RPC client used to reach a running daemon.

use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use reqwest::StatusCode;
use reqwest::blocking::{Client, Response};
use reqwest::header::AUTHORIZATION;
use serde_json::{Value, json};
use tracing::debug;
use walletd_config::Config;

use crate::dispatch::Params;
use crate::process::{LivenessProbe, LockRecord, LockSnapshot};

use super::RPC_TARGET;
use super::auth::RpcCredentials;
use super::errors::ClientError;

/// Lock age after which a refused connection means no daemon.
pub const STALE_LOCK_AGE: Duration = Duration::from_secs(1);

const RETRY_INTERVAL: Duration = Duration::from_secs(1);
const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Client that finds the daemon through its lock file.
#[derive(Debug, Clone)]
pub struct RpcClient {
    lock_path: PathBuf,
    credentials: Option<RpcCredentials>,
    http: Client,
    retry_interval: Duration,
}

impl RpcClient {
    /// Builds a client for the daemon owning `config`'s data directory.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Http`] when the HTTP client cannot be built.
    pub fn from_config(config: &Config) -> Result<Self, ClientError> {
        let credentials = config
            .rpc_user()
            .zip(config.rpc_password())
            .map(|(user, password)| RpcCredentials::new(user, password));
        Self::new(config.lock_path(), credentials, config.request_timeout())
    }

    /// Builds a client reading the lock at `lock_path`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Http`] when the HTTP client cannot be built.
    pub fn new(
        lock_path: PathBuf,
        credentials: Option<RpcCredentials>,
        timeout: Duration,
    ) -> Result<Self, ClientError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|source| ClientError::Http { source })?;
        Ok(Self {
            lock_path,
            credentials,
            http,
            retry_interval: RETRY_INTERVAL,
        })
    }

    /// Lock file consulted before every call.
    #[must_use]
    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }

    /// Calls `method` on the daemon and returns its `result`.
    ///
    /// A refused connection is retried while the lock is younger than
    /// [`STALE_LOCK_AGE`], since the daemon may still be starting.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::DaemonNotRunning`] when the lock is missing,
    /// unreadable or stale, [`ClientError::Forbidden`] on rejected
    /// credentials and [`ClientError::Rpc`] for JSON-RPC error objects.
    pub fn call(&self, method: &str, params: Params) -> Result<Value, ClientError> {
        let body = json!({ "jsonrpc": "2.0", "id": 1, "method": method, "params": params });
        loop {
            let snapshot = match LockSnapshot::read(&self.lock_path) {
                Ok(Some(snapshot)) => snapshot,
                Ok(None) | Err(_) => return Err(self.not_running()),
            };
            let Some(record) = snapshot.record() else {
                return Err(self.not_running());
            };
            match self.post(&record, &body) {
                Ok(response) => return decode(response),
                Err(error) if error.is_connect() => {
                    if snapshot.age() > STALE_LOCK_AGE {
                        return Err(self.not_running());
                    }
                    debug!(
                        target: RPC_TARGET,
                        address = %record.url(),
                        "daemon not answering yet; retrying"
                    );
                    thread::sleep(self.retry_interval);
                }
                Err(source) => return Err(ClientError::Http { source }),
            }
        }
    }

    fn post(&self, record: &LockRecord, body: &Value) -> reqwest::Result<Response> {
        let mut request = self.http.post(record.url()).json(body);
        if let Some(credentials) = &self.credentials {
            request = request.header(AUTHORIZATION, credentials.basic_header());
        }
        request.send()
    }

    fn not_running(&self) -> ClientError {
        ClientError::DaemonNotRunning {
            lock: self.lock_path.clone(),
        }
    }
}

fn decode(response: Response) -> Result<Value, ClientError> {
    let status = response.status();
    if status == StatusCode::FORBIDDEN {
        return Err(ClientError::Forbidden);
    }
    let envelope: Value = response.json().map_err(|error| ClientError::Response {
        status: status.as_u16(),
        message: error.to_string(),
    })?;
    if let Some(error) = envelope.get("error").filter(|error| !error.is_null()) {
        return Err(ClientError::Rpc {
            code: error.get("code").and_then(Value::as_i64).unwrap_or(-32603),
            message: error
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown error")
                .to_owned(),
        });
    }
    match envelope.get("result") {
        Some(result) => Ok(result.clone()),
        None => Err(ClientError::Response {
            status: status.as_u16(),
            message: "response carries neither result nor error".to_owned(),
        }),
    }
}

/// Liveness probe that asks the recorded address for `ping`.
///
/// Any HTTP answer, including a rejected login, proves a daemon is there.
#[derive(Debug, Clone)]
pub struct RpcProbe {
    http: Client,
}

impl RpcProbe {
    /// Builds a probe.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Http`] when the HTTP client cannot be built.
    pub fn new() -> Result<Self, ClientError> {
        let http = Client::builder()
            .timeout(PROBE_TIMEOUT)
            .build()
            .map_err(|source| ClientError::Http { source })?;
        Ok(Self { http })
    }
}

impl LivenessProbe for RpcProbe {
    fn is_alive(&self, record: &LockRecord) -> bool {
        let body = json!({ "jsonrpc": "2.0", "id": 0, "method": "ping", "params": [] });
        match self.http.post(record.url()).json(&body).send() {
            Ok(_) => true,
            Err(error) => {
                debug!(
                    target: RPC_TARGET,
                    address = %record.url(),
                    error = %error,
                    "liveness probe failed"
                );
                false
            }
        }
    }
}
