use std::path::{Path, PathBuf};
use std::rc::Rc;

use tracing::debug;

use crate::operations::{OperationContext, OperationError};
use crate::state::DaemonCore;

use super::DISPATCH_TARGET;
use super::arguments::Arguments;
use super::errors::DispatchError;
use super::invocation::PendingInvocation;
use super::outcome::{DispatchOutcome, Precondition};

/// Resolves `invocation` against the registry and runs it on the scheduler.
///
/// Checks run in a fixed order after the arguments bind: wallet presence,
/// network presence, then the password of a protected wallet. A failing
/// check yields [`DispatchOutcome::Refused`] and the body is never entered.
/// A supplied password that does not match the bound wallet is an
/// operation failure. The password reaches the body only when the
/// operation declares a `password` parameter.
///
/// # Errors
///
/// Returns [`DispatchError::UnknownOperation`] for unregistered names,
/// [`DispatchError::InvalidArguments`] when the parameters do not bind and
/// [`DispatchError::Operation`] when the body fails.
pub async fn dispatch(
    core: Rc<DaemonCore>,
    invocation: PendingInvocation,
) -> Result<DispatchOutcome, DispatchError> {
    let (method, params, password, wallet_path) = invocation.into_parts();
    let method = method.trim().to_owned();
    let descriptor = core.registry().lookup(&method)?.clone();

    let mut arguments = Arguments::bind(&descriptor, params)
        .map_err(|source| DispatchError::invalid_arguments(&method, source))?;
    arguments.supply("password", password.as_deref());
    arguments.supply("wallet_path", wallet_path.as_deref().and_then(Path::to_str));
    let password = arguments.str("password").map(str::to_owned).or(password);
    let selector = arguments
        .str("wallet_path")
        .map(PathBuf::from)
        .or(wallet_path);

    let session = if descriptor.needs_wallet() {
        match core.bind_session(selector.as_deref()) {
            Some(session) => Some(session),
            None => return Ok(refuse(&method, Precondition::WalletNotLoaded)),
        }
    } else {
        None
    };
    if descriptor.needs_network() && core.network().is_none() {
        return Ok(refuse(&method, Precondition::NetworkUnavailable));
    }
    if descriptor.needs_password_if_set() {
        if let Some(session) = session.as_ref().filter(|bound| bound.wallet().has_password()) {
            let Some(secret) = password.as_deref() else {
                return Ok(refuse(&method, Precondition::PasswordRequired));
            };
            session
                .wallet()
                .check_password(secret)
                .map_err(|error| DispatchError::operation(&method, OperationError::from(error)))?;
        }
    }

    debug!(
        target: DISPATCH_TARGET,
        operation = %method,
        wallet = ?session.as_ref().map(|bound| bound.path().to_path_buf()),
        "running operation"
    );
    let body = descriptor.body();
    let context = OperationContext::new(core, session);
    match body(context, arguments).await {
        Ok(value) => Ok(DispatchOutcome::Completed(value)),
        Err(source) => {
            debug!(
                target: DISPATCH_TARGET,
                operation = %method,
                error = %source,
                "operation failed"
            );
            Err(DispatchError::operation(method, source))
        }
    }
}

fn refuse(method: &str, precondition: Precondition) -> DispatchOutcome {
    debug!(
        target: DISPATCH_TARGET,
        operation = %method,
        reason = precondition.message(),
        "precondition not met"
    );
    DispatchOutcome::Refused(precondition)
}
