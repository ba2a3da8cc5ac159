//! Operations about the daemon itself.

use futures::future::LocalBoxFuture;
use serde_json::{Map, Value, json};
use tracing::{info, warn};

use crate::dispatch::{Arguments, DISPATCH_TARGET};
use crate::registry::OperationResult;

use super::{OperationContext, OperationError, immediate};

const CREDENTIAL_KEYS: [&str; 2] = ["rpc_user", "rpc_password"];

pub(super) fn ping(
    _context: OperationContext,
    _arguments: Arguments,
) -> LocalBoxFuture<'static, OperationResult> {
    immediate(Ok(Value::Bool(true)))
}

pub(super) fn commands(
    context: OperationContext,
    _arguments: Arguments,
) -> LocalBoxFuture<'static, OperationResult> {
    immediate(Ok(json!(context.core().registry().list())))
}

pub(super) fn help(
    context: OperationContext,
    arguments: Arguments,
) -> LocalBoxFuture<'static, OperationResult> {
    let registry = context.core().registry();
    let result = match arguments.str("command") {
        None => {
            let summaries: Map<String, Value> = registry
                .descriptors()
                .map(|descriptor| (descriptor.name().to_owned(), json!(descriptor.summary())))
                .collect();
            Ok(Value::Object(summaries))
        }
        Some(name) => registry
            .lookup(name)
            .map(|descriptor| {
                let params: Vec<Value> = descriptor
                    .parameters()
                    .map(|param| {
                        json!({
                            "name": param.name(),
                            "type": param.kind().name(),
                            "required": param.default().is_none(),
                            "default": param.default(),
                        })
                    })
                    .collect();
                let requirements = descriptor.requirements();
                json!({
                    "name": descriptor.name(),
                    "summary": descriptor.summary(),
                    "description": descriptor.description(),
                    "params": params,
                    "requires_wallet": requirements.wallet,
                    "requires_network": requirements.network,
                    "requires_password": requirements.password,
                })
            })
            .map_err(|error| OperationError::UnknownCommand { name: error.name }),
    };
    immediate(result)
}

pub(super) fn version(
    _context: OperationContext,
    _arguments: Arguments,
) -> LocalBoxFuture<'static, OperationResult> {
    immediate(Ok(json!(crate::VERSION)))
}

pub(super) fn getinfo(
    context: OperationContext,
    _arguments: Arguments,
) -> LocalBoxFuture<'static, OperationResult> {
    let core = context.core();
    let network = core
        .network()
        .map(|network| network.info())
        .ok_or_else(|| OperationError::internal("network not available"));
    let result = network.and_then(|network| {
        let network = serde_json::to_value(network)
            .map_err(|error| OperationError::internal(error.to_string()))?;
        let config = core.config();
        Ok(json!({
            "version": crate::VERSION,
            "path": config.data_dir().display().to_string(),
            "pid": std::process::id(),
            "rpc_address": core.rpc_address().map(|address| address.to_string()),
            "offline": config.offline(),
            "network": network,
            "wallets": core.wallet_sessions().len(),
            "current_wallet": core
                .current_session()
                .map(|session| session.path().display().to_string()),
        }))
    });
    immediate(result)
}

pub(super) fn stop(
    context: OperationContext,
    _arguments: Arguments,
) -> LocalBoxFuture<'static, OperationResult> {
    info!(target: DISPATCH_TARGET, "stop requested over RPC");
    context.core().run_state().request_stop();
    immediate(Ok(json!("Daemon stopped")))
}

pub(super) fn getconfig(
    context: OperationContext,
    arguments: Arguments,
) -> LocalBoxFuture<'static, OperationResult> {
    let result = arguments
        .str("key")
        .ok_or_else(|| OperationError::invalid_value("key must be a string"))
        .map(|key| context.core().config().get_key(key).unwrap_or(Value::Null));
    immediate(result)
}

pub(super) fn setconfig(
    context: OperationContext,
    arguments: Arguments,
) -> LocalBoxFuture<'static, OperationResult> {
    immediate(apply_setconfig(&context, &arguments))
}

fn apply_setconfig(context: &OperationContext, arguments: &Arguments) -> OperationResult {
    let key = arguments
        .str("key")
        .ok_or_else(|| OperationError::invalid_value("key must be a string"))?;
    let raw = arguments.value("value").cloned().unwrap_or(Value::Null);
    let value = decode_config_value(key, raw);
    if CREDENTIAL_KEYS.contains(&key) {
        warn!(
            target: DISPATCH_TARGET,
            key,
            "RPC credentials change on the next start"
        );
    }
    context
        .core()
        .update_config(|config| config.set_key(key, value))?;
    Ok(Value::Bool(true))
}

/// Decodes a string value as JSON, falling back to the raw string.
///
/// Credentials are always stored verbatim.
fn decode_config_value(key: &str, value: Value) -> Value {
    match value {
        Value::String(text) if !CREDENTIAL_KEYS.contains(&key) => {
            serde_json::from_str(&text).unwrap_or(Value::String(text))
        }
        other => other,
    }
}
