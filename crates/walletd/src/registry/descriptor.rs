//! Declaration and resolved forms of an operation contract.

use std::fmt;

use futures::future::LocalBoxFuture;
use serde_json::Value;

use crate::dispatch::Arguments;
use crate::operations::{OperationContext, OperationError};

use super::errors::RegistryError;

/// Value produced by an operation body.
pub type OperationResult = Result<Value, OperationError>;

/// Entry point of an operation.
///
/// Bodies run on the scheduler thread, so the returned future need not be
/// `Send`.
pub type OperationBody =
    fn(OperationContext, Arguments) -> LocalBoxFuture<'static, OperationResult>;

/// JSON shape accepted by a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    /// Any JSON value.
    Any,
    /// A JSON string.
    String,
    /// A JSON boolean.
    Bool,
    /// A JSON integer.
    Integer,
    /// A JSON object.
    Object,
}

impl ParamKind {
    /// Returns whether `value` has this shape.
    #[must_use]
    pub fn accepts(self, value: &Value) -> bool {
        match self {
            Self::Any => true,
            Self::String => value.is_string(),
            Self::Bool => value.is_boolean(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Object => value.is_object(),
        }
    }

    /// Name used in error messages.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Any => "any",
            Self::String => "string",
            Self::Bool => "boolean",
            Self::Integer => "integer",
            Self::Object => "object",
        }
    }
}

/// Declared parameter. Defaults are JSON literals, checked at start-up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParamSpec {
    /// Parameter name, also its keyword.
    pub name: &'static str,
    /// Accepted JSON shape.
    pub kind: ParamKind,
    /// JSON text of the default; `None` marks the parameter required.
    pub default: Option<&'static str>,
}

impl ParamSpec {
    /// Declares a required parameter.
    #[must_use]
    pub const fn required(name: &'static str, kind: ParamKind) -> Self {
        Self {
            name,
            kind,
            default: None,
        }
    }

    /// Declares an optional parameter with the given JSON default.
    #[must_use]
    pub const fn optional(name: &'static str, kind: ParamKind, default: &'static str) -> Self {
        Self {
            name,
            kind,
            default: Some(default),
        }
    }
}

/// One row of the operation declaration table.
#[derive(Clone, Copy)]
pub struct OperationSpec {
    /// Unique operation name.
    pub name: &'static str,
    /// Parameters in positional order.
    pub params: &'static [ParamSpec],
    /// Requirement flags: `w` wallet, `n` network, `p` password if set.
    pub requirements: &'static str,
    /// Full description; its first sentence is the summary.
    pub description: &'static str,
    /// Operation body.
    pub body: OperationBody,
}

impl fmt::Debug for OperationSpec {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("OperationSpec")
            .field("name", &self.name)
            .field("params", &self.params)
            .field("requirements", &self.requirements)
            .finish_non_exhaustive()
    }
}

/// Preconditions checked before a body runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Requirements {
    /// A wallet session must be bound.
    pub wallet: bool,
    /// The daemon must have a network.
    pub network: bool,
    /// A password must be supplied when the bound wallet has one.
    pub password: bool,
}

impl Requirements {
    fn parse(operation: &'static str, tag: &str) -> Result<Self, RegistryError> {
        let mut requirements = Self::default();
        for flag in tag.chars() {
            match flag {
                'w' => requirements.wallet = true,
                'n' => requirements.network = true,
                'p' => requirements.password = true,
                other => {
                    return Err(RegistryError::UnknownRequirementFlag {
                        operation,
                        flag: other,
                    });
                }
            }
        }
        Ok(requirements)
    }
}

/// Parameter with its default decoded.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    name: &'static str,
    kind: ParamKind,
    default: Option<Value>,
}

impl Parameter {
    /// Parameter name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Accepted JSON shape.
    #[must_use]
    pub const fn kind(&self) -> ParamKind {
        self.kind
    }

    /// Decoded default, `None` for required parameters.
    #[must_use]
    pub const fn default(&self) -> Option<&Value> {
        self.default.as_ref()
    }

    /// Whether `value` may be bound to this parameter.
    ///
    /// `null` is accepted by optional parameters and means "use the default".
    #[must_use]
    pub fn accepts(&self, value: &Value) -> bool {
        (value.is_null() && self.default.is_some()) || self.kind.accepts(value)
    }
}

/// Validated, immutable contract of a registered operation.
#[derive(Clone)]
pub struct OperationDescriptor {
    name: &'static str,
    required: Vec<Parameter>,
    optional: Vec<Parameter>,
    requirements: Requirements,
    summary: &'static str,
    description: &'static str,
    body: OperationBody,
}

impl OperationDescriptor {
    pub(super) fn from_spec(spec: &OperationSpec) -> Result<Self, RegistryError> {
        if spec.name.trim().is_empty() {
            return Err(RegistryError::EmptyName);
        }
        let requirements = Requirements::parse(spec.name, spec.requirements)?;
        let mut required = Vec::new();
        let mut optional: Vec<Parameter> = Vec::new();
        for (index, param) in spec.params.iter().enumerate() {
            if spec
                .params
                .iter()
                .take(index)
                .any(|earlier| earlier.name == param.name)
            {
                return Err(RegistryError::DuplicateParameter {
                    operation: spec.name,
                    parameter: param.name,
                });
            }
            match param.default {
                None if !optional.is_empty() => {
                    return Err(RegistryError::RequiredAfterOptional {
                        operation: spec.name,
                        parameter: param.name,
                    });
                }
                None => required.push(Parameter {
                    name: param.name,
                    kind: param.kind,
                    default: None,
                }),
                Some(text) => optional.push(Parameter {
                    name: param.name,
                    kind: param.kind,
                    default: Some(decode_default(spec.name, param, text)?),
                }),
            }
        }
        Ok(Self {
            name: spec.name,
            required,
            optional,
            requirements,
            summary: first_sentence(spec.description),
            description: spec.description,
            body: spec.body,
        })
    }

    /// Operation name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Required parameters in positional order.
    #[must_use]
    pub fn required(&self) -> &[Parameter] {
        &self.required
    }

    /// Optional parameters in positional order.
    #[must_use]
    pub fn optional(&self) -> &[Parameter] {
        &self.optional
    }

    /// All parameters, required first.
    pub fn parameters(&self) -> impl Iterator<Item = &Parameter> {
        self.required.iter().chain(self.optional.iter())
    }

    /// Looks up a parameter by name.
    #[must_use]
    pub fn parameter(&self, name: &str) -> Option<&Parameter> {
        self.parameters().find(|param| param.name == name)
    }

    /// Whether the operation declares a parameter called `name`.
    #[must_use]
    pub fn declares(&self, name: &str) -> bool {
        self.parameter(name).is_some()
    }

    /// Declared preconditions.
    #[must_use]
    pub const fn requirements(&self) -> Requirements {
        self.requirements
    }

    /// Whether a wallet session must be bound.
    #[must_use]
    pub const fn needs_wallet(&self) -> bool {
        self.requirements.wallet
    }

    /// Whether the daemon must have a network.
    #[must_use]
    pub const fn needs_network(&self) -> bool {
        self.requirements.network
    }

    /// Whether a password is demanded from protected wallets.
    #[must_use]
    pub const fn needs_password_if_set(&self) -> bool {
        self.requirements.password
    }

    /// One-line summary.
    #[must_use]
    pub const fn summary(&self) -> &'static str {
        self.summary
    }

    /// Full description.
    #[must_use]
    pub const fn description(&self) -> &'static str {
        self.description
    }

    pub(crate) const fn body(&self) -> OperationBody {
        self.body
    }
}

impl fmt::Debug for OperationDescriptor {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("OperationDescriptor")
            .field("name", &self.name)
            .field("required", &self.required)
            .field("optional", &self.optional)
            .field("requirements", &self.requirements)
            .field("summary", &self.summary)
            .finish_non_exhaustive()
    }
}

fn decode_default(
    operation: &'static str,
    param: &ParamSpec,
    text: &str,
) -> Result<Value, RegistryError> {
    let malformed = |message: String| RegistryError::MalformedDefault {
        operation,
        parameter: param.name,
        message,
    };
    let value: Value = serde_json::from_str(text).map_err(|error| malformed(error.to_string()))?;
    if value.is_null() || param.kind.accepts(&value) {
        Ok(value)
    } else {
        Err(malformed(format!(
            "{text} is not a valid {}",
            param.kind.name()
        )))
    }
}

fn first_sentence(description: &'static str) -> &'static str {
    let trimmed = description.trim();
    trimmed
        .find(". ")
        .or_else(|| trimmed.find(".\n"))
        .map_or_else(|| trimmed.trim_end_matches('.'), |end| trimmed.get(..end).unwrap_or(trimmed))
}
