//! JSON-RPC request and response envelopes.

use serde::Deserialize;
use serde_json::{Value, json};

use crate::dispatch::{DispatchError, Params};

/// A decoded JSON-RPC request.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RpcRequest {
    /// Operation name.
    pub method: String,
    /// Positional or named parameters; absent means none.
    #[serde(default)]
    pub params: Params,
    /// Caller-chosen correlation id, echoed back.
    #[serde(default)]
    pub id: Value,
}

impl RpcRequest {
    /// Decodes a request body.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Parse`] when the body is not JSON and
    /// [`DispatchError::InvalidRequest`] when it is JSON of the wrong shape.
    pub fn decode(body: &[u8]) -> Result<Self, DispatchError> {
        let value: Value =
            serde_json::from_slice(body).map_err(|error| DispatchError::parse(error.to_string()))?;
        serde_json::from_value(value)
            .map_err(|error| DispatchError::invalid_request(error.to_string()))
    }
}

/// Reads the request id from a body that may not decode as a request.
pub(crate) fn salvage_id(body: &[u8]) -> Value {
    serde_json::from_slice::<Value>(body)
        .ok()
        .and_then(|value| value.get("id").cloned())
        .unwrap_or(Value::Null)
}

/// Success envelope carrying `result`.
#[must_use]
pub fn success(id: Value, result: Value) -> Value {
    json!({ "jsonrpc": "2.0", "result": result, "id": id })
}

/// Failure envelope describing `error`.
#[must_use]
pub fn failure(id: Value, error: &DispatchError) -> Value {
    json!({
        "jsonrpc": "2.0",
        "error": { "code": error.rpc_code(), "message": error.to_string() },
        "id": id,
    })
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use serde_json::json;

    use super::*;

    #[rstest]
    #[case(br#"{"method":"ping","id":1}"#.as_slice(), Params::default())]
    #[case(
        br#"{"method":"help","params":["stop"],"id":1}"#.as_slice(),
        Params::Positional(vec![json!("stop")])
    )]
    fn decodes_requests(#[case] body: &[u8], #[case] params: Params) {
        let request = RpcRequest::decode(body).expect("decodes");
        assert_eq!(request.params, params);
        assert_eq!(request.id, json!(1));
    }

    #[test]
    fn named_params_decode_as_a_map() {
        let body = br#"{"method":"get","params":{"key":"k"},"id":"a"}"#;
        let request = RpcRequest::decode(body).expect("decodes");
        assert_eq!(request.params.named_str("key"), Some("k"));
    }

    #[rstest]
    #[case(b"not json".as_slice(), -32700)]
    #[case(br#"{"params":[]}"#.as_slice(), -32600)]
    #[case(br#"{"method":"ping","params":7}"#.as_slice(), -32600)]
    fn classifies_bad_bodies(#[case] body: &[u8], #[case] code: i64) {
        let error = RpcRequest::decode(body).expect_err("rejected");
        assert_eq!(error.rpc_code(), code);
    }

    #[test]
    fn salvages_ids_from_invalid_requests() {
        assert_eq!(salvage_id(br#"{"id":9,"params":7}"#), json!(9));
        assert_eq!(salvage_id(b"garbage"), Value::Null);
    }

    #[test]
    fn failure_carries_code_and_message() {
        let envelope = failure(json!(3), &DispatchError::unknown_operation("nope"));
        assert_eq!(envelope["error"]["code"], json!(-32601));
        assert_eq!(envelope["id"], json!(3));
        assert!(
            envelope["error"]["message"]
                .as_str()
                .is_some_and(|message| message.contains("nope"))
        );
    }
}
