//! The authenticated JSON-RPC listener.
//!
//! Listeners are started from work submitted to the scheduler: the socket is
//! bound and served on the scheduler thread, next to the operation bodies.
//! Handlers forward each call back through the [`SchedulerHandle`] so the
//! `!Send` core is only ever touched there.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::mpsc::{self as std_mpsc, RecvTimeoutError};
use std::time::Duration;

use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::dispatch::{DispatchError, PendingInvocation, dispatch};
use crate::scheduler::SchedulerHandle;
use crate::state::DaemonCore;

use super::RPC_TARGET;
use super::auth::{Authenticator, RpcCredentials};
use super::errors::ListenerError;
use super::jsonrpc::{RpcRequest, failure, salvage_id, success};

/// Pause applied before answering a request that failed authentication.
pub const AUTH_FAILURE_DELAY: Duration = Duration::from_millis(50);

/// Settings for the JSON-RPC listener.
#[derive(Debug, Clone)]
pub struct RpcSettings {
    /// Interface to bind.
    pub host: String,
    /// Port to bind; `0` picks an ephemeral port.
    pub port: u16,
    /// Accepted credentials.
    pub credentials: RpcCredentials,
    /// Budget for each call on the scheduler.
    pub timeout: Duration,
}

#[derive(Clone)]
struct RpcState {
    handle: SchedulerHandle<DaemonCore>,
    auth: Arc<Authenticator>,
    timeout: Duration,
}

/// A running listener.
///
/// Dropping the handle without calling [`ListenerHandle::shutdown`] leaves
/// the listener serving until the scheduler stops.
#[derive(Debug)]
pub struct ListenerHandle {
    name: &'static str,
    address: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    finished: std_mpsc::Receiver<()>,
}

impl ListenerHandle {
    /// Listener name used in diagnostics.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Bound address.
    #[must_use]
    pub const fn address(&self) -> SocketAddr {
        self.address
    }

    /// Stops accepting connections and waits up to `timeout` for in-flight
    /// requests to finish. Returns whether the listener finished in time.
    pub fn shutdown(mut self, timeout: Duration) -> bool {
        if let Some(trigger) = self.shutdown.take() {
            let _ = trigger.send(());
        }
        match self.finished.recv_timeout(timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => true,
            Err(RecvTimeoutError::Timeout) => {
                warn!(
                    target: RPC_TARGET,
                    listener = self.name,
                    "listener did not finish within the shutdown budget"
                );
                false
            }
        }
    }
}

/// Binds `router` on `host:port` and serves it on the current [`LocalSet`].
///
/// Must be called from a task running on the scheduler.
///
/// [`LocalSet`]: tokio::task::LocalSet
///
/// # Errors
///
/// Returns [`ListenerError`] when the socket cannot be bound.
pub(crate) async fn serve(
    name: &'static str,
    host: &str,
    port: u16,
    router: Router,
) -> Result<ListenerHandle, ListenerError> {
    let listener = TcpListener::bind((host, port))
        .await
        .map_err(|source| ListenerError::Bind {
            name,
            address: format!("{host}:{port}"),
            source,
        })?;
    let address = listener
        .local_addr()
        .map_err(|source| ListenerError::LocalAddress { name, source })?;
    let (shutdown, stop) = oneshot::channel::<()>();
    let (done, finished) = std_mpsc::channel();
    tokio::task::spawn_local(async move {
        let served = axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                let _ = stop.await;
            })
            .await;
        if let Err(error) = served {
            warn!(target: RPC_TARGET, listener = name, error = %error, "listener failed");
        }
        debug!(target: RPC_TARGET, listener = name, "listener finished");
        let _ = done.send(());
    });
    info!(target: RPC_TARGET, listener = name, address = %address, "listening");
    Ok(ListenerHandle {
        name,
        address,
        shutdown: Some(shutdown),
        finished,
    })
}

/// Starts the JSON-RPC listener.
///
/// # Errors
///
/// Returns [`ListenerError`] when the socket cannot be bound.
pub async fn start_rpc_server(
    settings: RpcSettings,
    handle: SchedulerHandle<DaemonCore>,
) -> Result<ListenerHandle, ListenerError> {
    let state = RpcState {
        handle,
        auth: Arc::new(Authenticator::new(settings.credentials)),
        timeout: settings.timeout,
    };
    serve("rpc", &settings.host, settings.port, router(state)).await
}

fn router(state: RpcState) -> Router {
    Router::new().route("/", post(handle_rpc)).with_state(state)
}

async fn handle_rpc(State(state): State<RpcState>, headers: HeaderMap, body: Bytes) -> Response {
    let header = headers.get(AUTHORIZATION).and_then(|value| value.to_str().ok());
    if let Err(error) = state.auth.verify(header) {
        warn!(target: RPC_TARGET, reason = %error, "rejected RPC request");
        tokio::time::sleep(AUTH_FAILURE_DELAY).await;
        return (StatusCode::FORBIDDEN, "Forbidden").into_response();
    }

    let request = match RpcRequest::decode(&body) {
        Ok(request) => request,
        Err(error) => return fault(salvage_id(&body), &error),
    };
    let RpcRequest { method, params, id } = request;
    if method.trim() == "ping" {
        return reply(StatusCode::OK, success(id, Value::Bool(true)));
    }

    let invocation = PendingInvocation::new(method, params);
    let result = state
        .handle
        .call(move |core| dispatch(core, invocation), Some(state.timeout))
        .await;
    match result {
        Ok(Ok(outcome)) => reply(StatusCode::OK, success(id, outcome.into_value())),
        Ok(Err(error)) => fault(id, &error),
        Err(bridge) => fault(id, &DispatchError::from(bridge)),
    }
}

fn fault(id: Value, error: &DispatchError) -> Response {
    let status =
        StatusCode::from_u16(error.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    debug!(target: RPC_TARGET, status = status.as_u16(), error = %error, "RPC fault");
    reply(status, failure(id, error))
}

fn reply(status: StatusCode, body: Value) -> Response {
    (status, axum::Json(body)).into_response()
}
