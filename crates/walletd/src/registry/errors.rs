use thiserror::Error;

/// Errors raised while validating the operation declaration table.
///
/// These are start-up failures: a table that does not validate never becomes
/// a [`super::Registry`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// An operation was declared with an empty name.
    #[error("operation names must not be empty")]
    EmptyName,
    /// Two operations share a name.
    #[error("operation '{name}' is declared more than once")]
    DuplicateOperation { name: &'static str },
    /// Two parameters of one operation share a name.
    #[error("operation '{operation}' declares parameter '{parameter}' more than once")]
    DuplicateParameter {
        operation: &'static str,
        parameter: &'static str,
    },
    /// A required parameter follows an optional one.
    #[error("operation '{operation}': required parameter '{parameter}' follows an optional one")]
    RequiredAfterOptional {
        operation: &'static str,
        parameter: &'static str,
    },
    /// A default value is not valid JSON or does not fit the parameter kind.
    #[error("operation '{operation}': malformed default for '{parameter}': {message}")]
    MalformedDefault {
        operation: &'static str,
        parameter: &'static str,
        message: String,
    },
    /// The requirement tag holds a flag other than `w`, `n` or `p`.
    #[error("operation '{operation}': unknown requirement flag '{flag}'")]
    UnknownRequirementFlag { operation: &'static str, flag: char },
}

/// Lookup failure for a name that is not in the registry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown operation '{name}'")]
pub struct UnknownOperation {
    /// Name that was looked up.
    pub name: String,
}
