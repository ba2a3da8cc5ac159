//! Bridge from parsed command-line options to a dispatched call.

use std::path::{Path, PathBuf};
use std::rc::Rc;

use futures::FutureExt;
use futures::future::LocalBoxFuture;
use serde_json::{Map, Value, json};
use tracing::debug;

use crate::dispatch::{self, Arguments, DISPATCH_TARGET, DispatchError, PendingInvocation};
use crate::registry::OperationResult;
use crate::state::DaemonCore;

use super::{OperationContext, OperationError};

pub(super) fn run_cmdline(
    context: OperationContext,
    arguments: Arguments,
) -> LocalBoxFuture<'static, OperationResult> {
    let core = Rc::clone(context.core());
    let options = arguments
        .object("config_options")
        .cloned()
        .unwrap_or_default();
    async move { run_options(core, options).await }.boxed_local()
}

async fn run_options(core: Rc<DaemonCore>, options: Map<String, Value>) -> OperationResult {
    let command = options
        .get("cmd")
        .and_then(Value::as_str)
        .ok_or_else(|| OperationError::invalid_value("config_options.cmd must be a string"))?
        .to_owned();
    let descriptor = core
        .registry()
        .lookup(&command)
        .map_err(|error| OperationError::UnknownCommand { name: error.name })?
        .clone();

    let mut wallet_path: Option<PathBuf> = None;
    if descriptor.needs_wallet() {
        let requested = options
            .get("wallet_path")
            .and_then(Value::as_str)
            .map(Path::new);
        let path = core.resolve_wallet_path(requested);
        if core.session(&path).is_none() {
            return Ok(json!({ "error": not_loaded_message(&path) }));
        }
        wallet_path = Some(path);
    }

    let params: Map<String, Value> = descriptor
        .parameters()
        .filter_map(|param| {
            options
                .get(param.name())
                .map(|value| (param.name().to_owned(), value.clone()))
        })
        .collect();
    let password = options
        .get("password")
        .and_then(Value::as_str)
        .map(str::to_owned);
    let invocation = PendingInvocation::named(command.as_str(), params)
        .with_password(password)
        .with_wallet_path(wallet_path);

    debug!(target: DISPATCH_TARGET, command = %command, "running command line");
    match dispatch::dispatch(core, invocation).await {
        Ok(outcome) => Ok(outcome.into_value()),
        Err(DispatchError::Operation { source, .. }) => Err(source),
        Err(DispatchError::InvalidArguments { source, .. }) => {
            Err(OperationError::invalid_value(source.to_string()))
        }
        Err(other) => Err(OperationError::internal(other.to_string())),
    }
}

fn not_loaded_message(path: &Path) -> String {
    let name = path
        .file_name()
        .map_or_else(|| path.display().to_string(), |name| name.to_string_lossy().into_owned());
    format!("Wallet \"{name}\" is not loaded. Use \"load_wallet\"")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_the_wallet_file_in_the_hint() {
        assert_eq!(
            not_loaded_message(Path::new("/data/wallets/savings")),
            "Wallet \"savings\" is not loaded. Use \"load_wallet\""
        );
    }
}
