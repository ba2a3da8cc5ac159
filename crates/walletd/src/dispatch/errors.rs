//! Error types for call dispatch.
//!
//! Every failure that is not a structured precondition result lands here.
//! Each variant maps to an HTTP status and a JSON-RPC error code so the front
//! door can tell malformed calls apart from failures inside an operation.

use thiserror::Error;

use crate::operations::OperationError;
use crate::registry::UnknownOperation;
use crate::scheduler::BridgeError;

use super::arguments::ArgumentError;

/// Errors surfaced while resolving and running a call.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The request body is not valid JSON.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// The request is JSON but not a valid call envelope.
    #[error("invalid request: {message}")]
    InvalidRequest { message: String },

    /// No operation is registered under the requested name.
    #[error(transparent)]
    UnknownOperation(#[from] UnknownOperation),

    /// The parameters do not fit the operation's contract.
    #[error("invalid parameters for '{operation}': {source}")]
    InvalidArguments {
        operation: String,
        #[source]
        source: ArgumentError,
    },

    /// The operation body failed.
    #[error("{operation} failed: {source}")]
    Operation {
        operation: String,
        #[source]
        source: OperationError,
    },

    /// The hand-off to the scheduler failed.
    #[error(transparent)]
    Bridge(#[from] BridgeError),

    /// Internal error (e.g. response serialisation).
    #[error("internal error: {message}")]
    Internal { message: String },
}

impl DispatchError {
    /// HTTP status code the front door answers with.
    #[must_use]
    pub const fn http_status(&self) -> u16 {
        match self {
            Self::Parse { .. } | Self::InvalidRequest { .. } | Self::InvalidArguments { .. } => 400,
            Self::UnknownOperation(_) => 404,
            Self::Operation { .. } => 200,
            Self::Bridge(BridgeError::SchedulerUnavailable) => 503,
            Self::Bridge(BridgeError::Timeout { .. }) => 504,
            Self::Bridge(_) | Self::Internal { .. } => 500,
        }
    }

    /// JSON-RPC error code reported in the error object.
    #[must_use]
    pub const fn rpc_code(&self) -> i64 {
        match self {
            Self::Parse { .. } => -32700,
            Self::InvalidRequest { .. } => -32600,
            Self::UnknownOperation(_) => -32601,
            Self::InvalidArguments { .. } => -32602,
            Self::Operation { .. } => -32000,
            Self::Bridge(BridgeError::SchedulerUnavailable) => -32001,
            Self::Bridge(BridgeError::Timeout { .. }) => -32002,
            Self::Bridge(_) | Self::Internal { .. } => -32603,
        }
    }

    /// Creates a parse error.
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse {
            message: message.into(),
        }
    }

    /// Creates an invalid request error.
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }

    /// Creates an unknown operation error.
    pub fn unknown_operation(name: impl Into<String>) -> Self {
        Self::UnknownOperation(UnknownOperation { name: name.into() })
    }

    /// Creates an invalid arguments error.
    pub fn invalid_arguments(operation: impl Into<String>, source: ArgumentError) -> Self {
        Self::InvalidArguments {
            operation: operation.into(),
            source,
        }
    }

    /// Wraps a failure raised by an operation body.
    pub fn operation(operation: impl Into<String>, source: OperationError) -> Self {
        Self::Operation {
            operation: operation.into(),
            source,
        }
    }

    /// Creates an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(DispatchError::parse("eof"), 400, -32700)]
    #[case(DispatchError::invalid_request("no method"), 400, -32600)]
    #[case(DispatchError::unknown_operation("nope"), 404, -32601)]
    #[case(
        DispatchError::invalid_arguments("get", ArgumentError::Missing { name: "key" }),
        400,
        -32602
    )]
    #[case(DispatchError::operation("password", OperationError::InvalidPassword), 200, -32000)]
    #[case(DispatchError::Bridge(BridgeError::SchedulerUnavailable), 503, -32001)]
    #[case(
        DispatchError::Bridge(BridgeError::Timeout { timeout: Duration::from_secs(1) }),
        504,
        -32002
    )]
    #[case(DispatchError::internal("boom"), 500, -32603)]
    fn maps_to_status_and_code(
        #[case] error: DispatchError,
        #[case] status: u16,
        #[case] code: i64,
    ) {
        assert_eq!(error.http_status(), status);
        assert_eq!(error.rpc_code(), code);
    }

    #[test]
    fn operation_failures_name_the_operation() {
        let error = DispatchError::operation("get", OperationError::invalid_value("expected text"));
        assert_eq!(error.to_string(), "get failed: invalid value: expected text");
    }
}
