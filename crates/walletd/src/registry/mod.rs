//! Immutable table of the operations the daemon can run.
//!
//! Operations are declared in a static table of [`OperationSpec`] rows and
//! validated once at start-up by [`Registry::from_specs`]. The resulting
//! registry is never mutated; it is shared behind an `Arc` by the RPC front
//! door, the console runner and the scheduler.

mod descriptor;
mod errors;

use std::collections::BTreeMap;

pub use descriptor::{
    OperationBody, OperationDescriptor, OperationResult, OperationSpec, ParamKind, ParamSpec,
    Parameter, Requirements,
};
pub use errors::{RegistryError, UnknownOperation};

/// Validated lookup table from operation name to contract.
#[derive(Debug, Default)]
pub struct Registry {
    operations: BTreeMap<&'static str, OperationDescriptor>,
}

impl Registry {
    /// Validates `specs` and builds the registry.
    ///
    /// # Errors
    ///
    /// Fails on the first duplicate name, malformed default, required
    /// parameter following an optional one, or unknown requirement flag.
    pub fn from_specs(specs: &[OperationSpec]) -> Result<Self, RegistryError> {
        let mut operations = BTreeMap::new();
        for spec in specs {
            let descriptor = OperationDescriptor::from_spec(spec)?;
            if operations.insert(spec.name, descriptor).is_some() {
                return Err(RegistryError::DuplicateOperation { name: spec.name });
            }
        }
        Ok(Self { operations })
    }

    /// Builds the registry of the daemon's built-in operations.
    pub fn builtin() -> Result<Self, RegistryError> {
        Self::from_specs(crate::operations::CATALOGUE)
    }

    /// Looks up an operation by name.
    pub fn lookup(&self, name: &str) -> Result<&OperationDescriptor, UnknownOperation> {
        self.operations.get(name).ok_or_else(|| UnknownOperation {
            name: name.to_owned(),
        })
    }

    /// Operation names in lexicographic order.
    #[must_use]
    pub fn list(&self) -> Vec<&'static str> {
        self.operations.keys().copied().collect()
    }

    /// Descriptors in name order.
    pub fn descriptors(&self) -> impl Iterator<Item = &OperationDescriptor> {
        self.operations.values()
    }

    /// Number of registered operations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    /// Whether no operation is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}
