//! The JSON-RPC front door and the client that talks to it.
//!
//! Requests arrive as HTTP POSTs carrying a JSON-RPC envelope. The listener
//! authenticates first: a bad `Authorization` header is answered with 403
//! after a short delay and never reaches the JSON-RPC layer. `ping` is
//! answered directly; every other call is resolved and enforced by
//! [`crate::dispatch::dispatch`] on the scheduler thread.

mod auth;
mod client;
mod errors;
mod jsonrpc;
mod server;

pub(crate) const RPC_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::rpc");

pub use auth::{AuthError, Authenticator, RpcCredentials};
pub use client::{RpcClient, RpcProbe, STALE_LOCK_AGE};
pub use errors::{ClientError, ListenerError};
pub use jsonrpc::{RpcRequest, failure, success};
pub(crate) use jsonrpc::salvage_id;
pub(crate) use server::serve;
pub use server::{AUTH_FAILURE_DELAY, ListenerHandle, RpcSettings, start_rpc_server};
