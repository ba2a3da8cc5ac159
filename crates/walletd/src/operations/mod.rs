//! Built-in operations and the declaration table that registers them.
//!
//! Every row of [`CATALOGUE`] pairs a body with its parameter contract and
//! requirement flags (`w` wallet, `n` network, `p` password if set). The
//! table is validated once by [`crate::registry::Registry::builtin`].

mod cmdline;
mod daemon;
mod errors;
mod wallets;

use std::fmt;
use std::rc::Rc;

use futures::FutureExt;
use futures::future::{self, LocalBoxFuture};

pub use errors::OperationError;

use crate::registry::{OperationResult, OperationSpec, ParamKind, ParamSpec};
use crate::sessions::WalletSession;
use crate::state::DaemonCore;

/// What a body sees of the daemon when it runs.
///
/// Built by the dispatcher after preconditions pass. `wallet` is bound for
/// every operation that declares the wallet requirement.
pub struct OperationContext {
    core: Rc<DaemonCore>,
    wallet: Option<Rc<WalletSession>>,
}

impl OperationContext {
    pub(crate) fn new(core: Rc<DaemonCore>, wallet: Option<Rc<WalletSession>>) -> Self {
        Self { core, wallet }
    }

    /// Scheduler-owned daemon state.
    #[must_use]
    pub fn core(&self) -> &Rc<DaemonCore> {
        &self.core
    }

    /// The bound wallet session.
    ///
    /// # Errors
    ///
    /// Fails when the operation runs without a bound wallet, which the
    /// dispatcher prevents for operations that declare the requirement.
    pub fn session(&self) -> Result<&WalletSession, OperationError> {
        self.wallet
            .as_deref()
            .ok_or_else(|| OperationError::internal("no wallet bound to this call"))
    }
}

impl fmt::Debug for OperationContext {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("OperationContext")
            .field("wallet", &self.wallet.as_ref().map(|session| session.path()))
            .finish_non_exhaustive()
    }
}

fn immediate(result: OperationResult) -> LocalBoxFuture<'static, OperationResult> {
    future::ready(result).boxed_local()
}

const NO_PARAMS: &[ParamSpec] = &[];
const HELP_PARAMS: &[ParamSpec] = &[ParamSpec::optional("command", ParamKind::String, "null")];
const WALLET_PARAMS: &[ParamSpec] = &[
    ParamSpec::optional("wallet_path", ParamKind::String, "null"),
    ParamSpec::optional("password", ParamKind::String, "null"),
];
const WALLET_PATH_PARAMS: &[ParamSpec] =
    &[ParamSpec::optional("wallet_path", ParamKind::String, "null")];
const KEY_PARAMS: &[ParamSpec] = &[ParamSpec::required("key", ParamKind::String)];
const SETCONFIG_PARAMS: &[ParamSpec] = &[
    ParamSpec::required("key", ParamKind::String),
    ParamSpec::required("value", ParamKind::Any),
];
const PASSWORD_PARAMS: &[ParamSpec] = &[
    ParamSpec::optional("password", ParamKind::String, "null"),
    ParamSpec::optional("new_password", ParamKind::String, "null"),
];
const CMDLINE_PARAMS: &[ParamSpec] = &[ParamSpec::required("config_options", ParamKind::Object)];

/// Declaration table of the daemon's built-in operations.
pub const CATALOGUE: &[OperationSpec] = &[
    OperationSpec {
        name: "ping",
        params: NO_PARAMS,
        requirements: "",
        description: "Check that the daemon answers. Returns true.",
        body: daemon::ping,
    },
    OperationSpec {
        name: "commands",
        params: NO_PARAMS,
        requirements: "",
        description: "List the names of all operations. Names are sorted.",
        body: daemon::commands,
    },
    OperationSpec {
        name: "help",
        params: HELP_PARAMS,
        requirements: "",
        description: "Describe an operation. Without a command, lists every \
                      operation with its summary.",
        body: daemon::help,
    },
    OperationSpec {
        name: "version",
        params: NO_PARAMS,
        requirements: "",
        description: "Return the daemon version.",
        body: daemon::version,
    },
    OperationSpec {
        name: "getinfo",
        params: NO_PARAMS,
        requirements: "n",
        description: "Report network and daemon information. Includes the \
                      listener address and the number of open wallets.",
        body: daemon::getinfo,
    },
    OperationSpec {
        name: "stop",
        params: NO_PARAMS,
        requirements: "",
        description: "Stop the daemon. Open wallets are closed first.",
        body: daemon::stop,
    },
    OperationSpec {
        name: "getconfig",
        params: KEY_PARAMS,
        requirements: "",
        description: "Return a configuration value. Unset keys read as null.",
        body: daemon::getconfig,
    },
    OperationSpec {
        name: "setconfig",
        params: SETCONFIG_PARAMS,
        requirements: "",
        description: "Set a configuration value and persist it. String values \
                      are decoded as JSON when possible, except for RPC \
                      credentials.",
        body: daemon::setconfig,
    },
    OperationSpec {
        name: "list_wallets",
        params: NO_PARAMS,
        requirements: "",
        description: "List open wallets. Each entry reports its path, \
                      whether it is syncing and whether it has caught up.",
        body: wallets::list_wallets,
    },
    OperationSpec {
        name: "load_wallet",
        params: WALLET_PARAMS,
        requirements: "",
        description: "Open a wallet. Returns true, or null when the wallet \
                      cannot be opened.",
        body: wallets::load_wallet,
    },
    OperationSpec {
        name: "close_wallet",
        params: WALLET_PATH_PARAMS,
        requirements: "",
        description: "Close a wallet. Returns whether it was open.",
        body: wallets::close_wallet,
    },
    OperationSpec {
        name: "get",
        params: KEY_PARAMS,
        requirements: "w",
        description: "Read an item from wallet storage. Missing items read \
                      as null.",
        body: wallets::get,
    },
    OperationSpec {
        name: "is_synchronized",
        params: NO_PARAMS,
        requirements: "w",
        description: "Report whether the wallet has caught up with the network.",
        body: wallets::is_synchronized,
    },
    OperationSpec {
        name: "password",
        params: PASSWORD_PARAMS,
        requirements: "wp",
        description: "Change the wallet password. An empty or missing new \
                      password removes protection.",
        body: wallets::password,
    },
    OperationSpec {
        name: "run_cmdline",
        params: CMDLINE_PARAMS,
        requirements: "",
        description: "Run a command described by command-line options. The \
                      options name the command, the wallet and the command's \
                      parameters.",
        body: cmdline::run_cmdline,
    },
];
