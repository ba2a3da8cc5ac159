//! Watch-tower sub-server.
//!
//! A second JSON-RPC listener through which a channel peer hands over
//! pre-signed sweep transactions. `get_ctn` tells the peer the highest
//! commitment number already stored for a channel; `add_sweep_tx` stores one
//! more sweep. The store lives on the scheduler thread behind the
//! [`SweepStore`] trait.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::time::Duration;

use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use serde_json::Value;
use tracing::debug;

use crate::dispatch::{ArgumentError, DispatchError, Params};
use crate::rpc::{ListenerError, ListenerHandle, RpcRequest, failure, salvage_id, serve, success};
use crate::scheduler::SchedulerHandle;
use crate::state::DaemonCore;

const WATCHTOWER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::watchtower");

/// Persistence for channels watched on behalf of peers.
pub trait SweepStore {
    /// Highest commitment number stored for `outpoint`, or `-1` when none.
    ///
    /// The first query for an outpoint records `address` as its funding
    /// address.
    fn get_ctn(&self, outpoint: &str, address: &str) -> i64;

    /// Stores a sweep transaction spending `prevout` at commitment `ctn`.
    fn add_sweep_tx(&self, outpoint: &str, ctn: i64, prevout: &str, tx: &str);
}

/// A stored sweep transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepTx {
    /// Commitment number the sweep answers.
    pub ctn: i64,
    /// Output the sweep spends.
    pub prevout: String,
    /// Raw transaction.
    pub tx: String,
}

/// [`SweepStore`] kept in memory for the lifetime of the daemon.
#[derive(Debug, Default)]
pub struct MemorySweepStore {
    channels: RefCell<BTreeMap<String, String>>,
    sweeps: RefCell<BTreeMap<String, Vec<SweepTx>>>,
}

impl MemorySweepStore {
    /// Builds an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Funding address recorded for `outpoint`.
    #[must_use]
    pub fn channel_address(&self, outpoint: &str) -> Option<String> {
        self.channels.borrow().get(outpoint).cloned()
    }

    /// Sweeps stored for `outpoint`, in insertion order.
    #[must_use]
    pub fn sweeps(&self, outpoint: &str) -> Vec<SweepTx> {
        self.sweeps
            .borrow()
            .get(outpoint)
            .cloned()
            .unwrap_or_default()
    }
}

impl SweepStore for MemorySweepStore {
    fn get_ctn(&self, outpoint: &str, address: &str) -> i64 {
        self.channels
            .borrow_mut()
            .entry(outpoint.to_owned())
            .or_insert_with(|| address.to_owned());
        self.sweeps
            .borrow()
            .get(outpoint)
            .and_then(|stored| stored.iter().map(|sweep| sweep.ctn).max())
            .unwrap_or(-1)
    }

    fn add_sweep_tx(&self, outpoint: &str, ctn: i64, prevout: &str, tx: &str) {
        self.sweeps
            .borrow_mut()
            .entry(outpoint.to_owned())
            .or_default()
            .push(SweepTx {
                ctn,
                prevout: prevout.to_owned(),
                tx: tx.to_owned(),
            });
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum WatchtowerCall {
    GetCtn {
        outpoint: String,
        address: String,
    },
    AddSweepTx {
        outpoint: String,
        ctn: i64,
        prevout: String,
        tx: String,
    },
}

impl WatchtowerCall {
    fn parse(method: &str, params: &Params) -> Result<Self, DispatchError> {
        let invalid = |source| DispatchError::invalid_arguments(method, source);
        match method.trim() {
            "get_ctn" => Ok(Self::GetCtn {
                outpoint: text(params, 0, "outpoint").map_err(invalid)?,
                address: text(params, 1, "address").map_err(invalid)?,
            }),
            "add_sweep_tx" => Ok(Self::AddSweepTx {
                outpoint: text(params, 0, "outpoint").map_err(invalid)?,
                ctn: integer(params, 1, "ctn").map_err(invalid)?,
                prevout: text(params, 2, "prevout").map_err(invalid)?,
                tx: text(params, 3, "tx").map_err(invalid)?,
            }),
            other => Err(DispatchError::unknown_operation(other)),
        }
    }

    fn apply(self, store: &dyn SweepStore) -> Value {
        match self {
            Self::GetCtn { outpoint, address } => Value::from(store.get_ctn(&outpoint, &address)),
            Self::AddSweepTx {
                outpoint,
                ctn,
                prevout,
                tx,
            } => {
                store.add_sweep_tx(&outpoint, ctn, &prevout, &tx);
                Value::Null
            }
        }
    }
}

fn argument<'a>(params: &'a Params, index: usize, name: &'static str) -> Option<&'a Value> {
    match params {
        Params::Positional(values) => values.get(index),
        Params::Named(map) => map.get(name),
    }
}

fn text(params: &Params, index: usize, name: &'static str) -> Result<String, ArgumentError> {
    argument(params, index, name)
        .ok_or(ArgumentError::Missing { name })?
        .as_str()
        .map(str::to_owned)
        .ok_or(ArgumentError::WrongType {
            name,
            expected: "string",
        })
}

fn integer(params: &Params, index: usize, name: &'static str) -> Result<i64, ArgumentError> {
    argument(params, index, name)
        .ok_or(ArgumentError::Missing { name })?
        .as_i64()
        .ok_or(ArgumentError::WrongType {
            name,
            expected: "integer",
        })
}

#[derive(Clone)]
struct WatchtowerState {
    handle: SchedulerHandle<DaemonCore>,
    timeout: Duration,
}

/// Starts the watch-tower listener on `host:port`.
///
/// Must be called from a task running on the scheduler.
///
/// # Errors
///
/// Returns [`ListenerError`] when the socket cannot be bound.
pub async fn start_watchtower(
    host: &str,
    port: u16,
    handle: SchedulerHandle<DaemonCore>,
    timeout: Duration,
) -> Result<ListenerHandle, ListenerError> {
    let router = Router::new()
        .route("/", post(handle_watchtower))
        .with_state(WatchtowerState { handle, timeout });
    serve("watchtower", host, port, router).await
}

async fn handle_watchtower(State(state): State<WatchtowerState>, body: Bytes) -> Response {
    let request = match RpcRequest::decode(&body) {
        Ok(request) => request,
        Err(error) => return fault(salvage_id(&body), &error),
    };
    let call = match WatchtowerCall::parse(&request.method, &request.params) {
        Ok(call) => call,
        Err(error) => return fault(request.id, &error),
    };
    debug!(target: WATCHTOWER_TARGET, call = ?call, "watch-tower call");
    let result = state
        .handle
        .call(
            move |core| async move { call.apply(core.sweeps().as_ref()) },
            Some(state.timeout),
        )
        .await;
    match result {
        Ok(value) => (StatusCode::OK, axum::Json(success(request.id, value))).into_response(),
        Err(bridge) => fault(request.id, &DispatchError::from(bridge)),
    }
}

fn fault(id: Value, error: &DispatchError) -> Response {
    let status =
        StatusCode::from_u16(error.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, axum::Json(failure(id, error))).into_response()
}
