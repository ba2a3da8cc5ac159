//! Call resolution, precondition enforcement and the synchronous runner.
//!
//! Every caller (the JSON-RPC front door, `run_cmdline`, the
//! [`CommandRunner`]) goes through [`dispatch`], which binds the parameters
//! to the operation's declared contract and enforces its requirements before
//! the body runs on the scheduler thread.
//!
//! ## Outcomes
//!
//! A call ends in one of three ways:
//!
//! - the body ran: [`DispatchOutcome::Completed`];
//! - a precondition failed: [`DispatchOutcome::Refused`], rendered to the
//!   caller as `{"error": "..."}` rather than a fault;
//! - a fault: [`DispatchError`], which carries its own HTTP status and
//!   JSON-RPC code.

mod arguments;
mod enforcer;
mod errors;
mod invocation;
mod outcome;
mod runner;

pub(crate) const DISPATCH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::dispatch");

pub use arguments::{ArgumentError, Arguments, Params};
pub use enforcer::dispatch;
pub use errors::DispatchError;
pub use invocation::PendingInvocation;
pub use outcome::{DispatchOutcome, Precondition};
pub use runner::CommandRunner;
