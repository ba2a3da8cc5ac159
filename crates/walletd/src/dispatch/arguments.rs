//! Binding raw call parameters to a declared operation contract.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::registry::{OperationDescriptor, Parameter};

/// Keys that may accompany any named call without being declared.
///
/// They address the invocation itself (which wallet, which secret) rather
/// than the operation body.
pub(crate) const INVOCATION_KEYS: [&str; 2] = ["password", "wallet_path"];

/// Raw parameters as they arrive on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Params {
    /// Values matched to parameters by position.
    Positional(Vec<Value>),
    /// Values matched to parameters by name.
    Named(Map<String, Value>),
}

impl Default for Params {
    fn default() -> Self {
        Self::Positional(Vec::new())
    }
}

impl Params {
    /// Reads a string value supplied under `key` in a named call.
    #[must_use]
    pub fn named_str(&self, key: &str) -> Option<&str> {
        match self {
            Self::Named(map) => map.get(key).and_then(Value::as_str),
            Self::Positional(_) => None,
        }
    }
}

/// Errors raised when parameters do not fit the declared contract.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArgumentError {
    /// A required parameter was not supplied.
    #[error("missing required parameter '{name}'")]
    Missing {
        /// Parameter name.
        name: &'static str,
    },
    /// A named parameter is not declared by the operation.
    #[error("unexpected parameter '{name}'")]
    Unexpected {
        /// Name supplied by the caller.
        name: String,
    },
    /// More positional values than declared parameters.
    #[error("expected at most {expected} positional parameters, got {actual}")]
    TooMany {
        /// Declared parameter count.
        expected: usize,
        /// Supplied value count.
        actual: usize,
    },
    /// A value has the wrong JSON shape.
    #[error("parameter '{name}' must be {expected}")]
    WrongType {
        /// Parameter name.
        name: &'static str,
        /// Expected shape.
        expected: &'static str,
    },
}

/// Parameters bound to their declared names, defaults filled in.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Arguments {
    values: BTreeMap<&'static str, Value>,
}

impl Arguments {
    /// Arguments for an operation that declares no parameters.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Bound value of `name`; `null` and undeclared names read as `None`.
    #[must_use]
    pub fn value(&self, name: &str) -> Option<&Value> {
        self.values.get(name).filter(|value| !value.is_null())
    }

    /// Bound string value of `name`.
    #[must_use]
    pub fn str(&self, name: &str) -> Option<&str> {
        self.value(name).and_then(Value::as_str)
    }

    /// Bound boolean value of `name`.
    #[must_use]
    pub fn bool(&self, name: &str) -> Option<bool> {
        self.value(name).and_then(Value::as_bool)
    }

    /// Bound integer value of `name`.
    #[must_use]
    pub fn i64(&self, name: &str) -> Option<i64> {
        self.value(name).and_then(Value::as_i64)
    }

    /// Bound object value of `name`.
    #[must_use]
    pub fn object(&self, name: &str) -> Option<&Map<String, Value>> {
        self.value(name).and_then(Value::as_object)
    }

    /// Fills a declared, unset parameter with a value supplied out of band.
    pub(crate) fn supply(&mut self, name: &str, value: Option<&str>) {
        let Some(value) = value else {
            return;
        };
        if let Some(slot) = self.values.get_mut(name) {
            if slot.is_null() {
                *slot = Value::from(value);
            }
        }
    }

    /// Binds `params` to `descriptor`'s parameters.
    ///
    /// Positional values bind in declaration order. Named values bind by
    /// key; undeclared invocation keys (`password`, `wallet_path`) are
    /// dropped. `null` on an optional parameter means "use the default".
    ///
    /// # Errors
    ///
    /// Returns the first [`ArgumentError`] found.
    pub fn bind(descriptor: &OperationDescriptor, params: Params) -> Result<Self, ArgumentError> {
        let mut supplied: BTreeMap<&'static str, Value> = BTreeMap::new();
        match params {
            Params::Positional(values) => {
                let declared: Vec<&Parameter> = descriptor.parameters().collect();
                if values.len() > declared.len() {
                    return Err(ArgumentError::TooMany {
                        expected: declared.len(),
                        actual: values.len(),
                    });
                }
                for (param, value) in declared.into_iter().zip(values) {
                    supplied.insert(param.name(), value);
                }
            }
            Params::Named(map) => {
                for (key, value) in map {
                    match descriptor.parameter(&key) {
                        Some(param) => {
                            supplied.insert(param.name(), value);
                        }
                        None if INVOCATION_KEYS.contains(&key.as_str()) => {}
                        None => return Err(ArgumentError::Unexpected { name: key }),
                    }
                }
            }
        }

        let mut values = BTreeMap::new();
        for param in descriptor.parameters() {
            let value = match supplied.remove(param.name()) {
                Some(value) if !param.accepts(&value) => {
                    return Err(ArgumentError::WrongType {
                        name: param.name(),
                        expected: param.kind().name(),
                    });
                }
                Some(Value::Null) | None => match param.default() {
                    Some(default) => default.clone(),
                    None => return Err(ArgumentError::Missing { name: param.name() }),
                },
                Some(value) => value,
            };
            values.insert(param.name(), value);
        }
        Ok(Self { values })
    }
}

#[cfg(test)]
mod tests {
    use futures::FutureExt;
    use futures::future::LocalBoxFuture;
    use rstest::{fixture, rstest};
    use serde_json::json;

    use super::*;
    use crate::operations::OperationContext;
    use crate::registry::{OperationResult, OperationSpec, ParamKind, ParamSpec, Registry};

    fn noop(
        _context: OperationContext,
        _arguments: Arguments,
    ) -> LocalBoxFuture<'static, OperationResult> {
        async { Ok(Value::Null) }.boxed_local()
    }

    const PARAMS: &[ParamSpec] = &[
        ParamSpec::required("key", ParamKind::String),
        ParamSpec::optional("count", ParamKind::Integer, "3"),
        ParamSpec::optional("label", ParamKind::String, "null"),
    ];

    #[fixture]
    fn registry() -> Registry {
        Registry::from_specs(&[OperationSpec {
            name: "sample",
            params: PARAMS,
            requirements: "",
            description: "Sample operation.",
            body: noop,
        }])
        .expect("valid table")
    }

    fn bind(registry: &Registry, params: Params) -> Result<Arguments, ArgumentError> {
        Arguments::bind(registry.lookup("sample").expect("registered"), params)
    }

    #[rstest]
    fn positional_values_bind_in_order(registry: Registry) {
        let arguments =
            bind(&registry, Params::Positional(vec![json!("k"), json!(7)])).expect("binds");
        assert_eq!(arguments.str("key"), Some("k"));
        assert_eq!(arguments.i64("count"), Some(7));
        assert_eq!(arguments.str("label"), None);
    }

    #[rstest]
    fn named_values_fill_defaults(registry: Registry) {
        let map = json!({"key": "k", "label": "x", "password": "secret"});
        let Value::Object(map) = map else {
            panic!("object literal");
        };
        let arguments = bind(&registry, Params::Named(map)).expect("binds");
        assert_eq!(arguments.i64("count"), Some(3));
        assert_eq!(arguments.str("label"), Some("x"));
        assert_eq!(arguments.value("password"), None);
    }

    #[rstest]
    fn null_selects_the_default(registry: Registry) {
        let arguments = bind(&registry, Params::Positional(vec![json!("k"), Value::Null]))
            .expect("binds");
        assert_eq!(arguments.i64("count"), Some(3));
    }

    #[rstest]
    #[case(Params::Positional(vec![]), ArgumentError::Missing { name: "key" })]
    #[case(
        Params::Positional(vec![json!("k"), json!(1), json!("l"), json!(true)]),
        ArgumentError::TooMany { expected: 3, actual: 4 }
    )]
    #[case(
        Params::Positional(vec![json!(5)]),
        ArgumentError::WrongType { name: "key", expected: "string" }
    )]
    #[case(
        Params::Positional(vec![json!("k"), json!("three")]),
        ArgumentError::WrongType { name: "count", expected: "integer" }
    )]
    fn rejects_ill_fitting_parameters(
        registry: Registry,
        #[case] params: Params,
        #[case] expected: ArgumentError,
    ) {
        assert_eq!(bind(&registry, params), Err(expected));
    }

    #[rstest]
    fn unknown_named_key_is_rejected(registry: Registry) {
        let Value::Object(map) = json!({"key": "k", "colour": "red"}) else {
            panic!("object literal");
        };
        assert_eq!(
            bind(&registry, Params::Named(map)),
            Err(ArgumentError::Unexpected {
                name: "colour".to_owned()
            })
        );
    }

    #[test]
    fn wire_params_deserialise_by_shape() {
        let positional: Params = serde_json::from_value(json!([1, 2])).expect("array");
        assert!(matches!(positional, Params::Positional(ref values) if values.len() == 2));
        let named: Params = serde_json::from_value(json!({"wallet_path": "w"})).expect("object");
        assert_eq!(named.named_str("wallet_path"), Some("w"));
    }
}
