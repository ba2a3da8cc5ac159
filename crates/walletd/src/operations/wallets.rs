//! Operations on wallet sessions.

use std::path::Path;

use futures::future::LocalBoxFuture;
use serde_json::{Value, json};

use crate::dispatch::Arguments;
use crate::registry::OperationResult;

use super::{OperationContext, immediate};

pub(super) fn list_wallets(
    context: OperationContext,
    _arguments: Arguments,
) -> LocalBoxFuture<'static, OperationResult> {
    let wallets: Vec<Value> = context
        .core()
        .wallet_sessions()
        .iter()
        .map(|session| {
            json!({
                "path": session.path().display().to_string(),
                "syncing": session.is_syncing(),
                "synchronized": session.is_synchronized(),
            })
        })
        .collect();
    immediate(Ok(Value::Array(wallets)))
}

pub(super) fn load_wallet(
    context: OperationContext,
    arguments: Arguments,
) -> LocalBoxFuture<'static, OperationResult> {
    let requested = arguments.str("wallet_path").map(Path::new);
    let opened = context
        .core()
        .load_wallet(requested, arguments.str("password"));
    immediate(Ok(if opened { Value::Bool(true) } else { Value::Null }))
}

pub(super) fn close_wallet(
    context: OperationContext,
    arguments: Arguments,
) -> LocalBoxFuture<'static, OperationResult> {
    let requested = arguments.str("wallet_path").map(Path::new);
    immediate(Ok(Value::Bool(context.core().close_wallet(requested))))
}

pub(super) fn get(
    context: OperationContext,
    arguments: Arguments,
) -> LocalBoxFuture<'static, OperationResult> {
    let result = context.session().map(|session| {
        arguments
            .str("key")
            .and_then(|key| session.wallet().get(key))
            .unwrap_or(Value::Null)
    });
    immediate(result)
}

pub(super) fn is_synchronized(
    context: OperationContext,
    _arguments: Arguments,
) -> LocalBoxFuture<'static, OperationResult> {
    let result = context
        .session()
        .map(|session| Value::Bool(session.is_synchronized()));
    immediate(result)
}

pub(super) fn password(
    context: OperationContext,
    arguments: Arguments,
) -> LocalBoxFuture<'static, OperationResult> {
    let result = context.session().and_then(|session| {
        let wallet = session.wallet();
        wallet.update_password(arguments.str("password"), arguments.str("new_password"))?;
        Ok(json!({ "password": wallet.has_password() }))
    });
    immediate(result)
}
