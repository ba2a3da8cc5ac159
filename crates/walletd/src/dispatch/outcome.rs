use serde_json::{Value, json};

/// Precondition that stopped a call before its body ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precondition {
    /// The operation needs a wallet and none is bound.
    WalletNotLoaded,
    /// The operation needs the network and the daemon is offline.
    NetworkUnavailable,
    /// The bound wallet is protected and no password was supplied.
    PasswordRequired,
}

impl Precondition {
    /// Message reported to the caller.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::WalletNotLoaded => "wallet not loaded",
            Self::NetworkUnavailable => "network not available",
            Self::PasswordRequired => "password required",
        }
    }
}

/// Result of a dispatched call that did not fault.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    /// The body ran and produced a value.
    Completed(Value),
    /// A precondition failed; the body was never entered.
    Refused(Precondition),
}

impl DispatchOutcome {
    /// Renders the outcome as the JSON result seen by callers.
    ///
    /// Refusals become `{"error": "<message>"}` results, not faults.
    #[must_use]
    pub fn into_value(self) -> Value {
        match self {
            Self::Completed(value) => value,
            Self::Refused(precondition) => json!({ "error": precondition.message() }),
        }
    }

    /// The precondition that stopped the call, if any.
    #[must_use]
    pub const fn refusal(&self) -> Option<Precondition> {
        match self {
            Self::Refused(precondition) => Some(*precondition),
            Self::Completed(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refusals_render_as_error_objects() {
        let value = DispatchOutcome::Refused(Precondition::PasswordRequired).into_value();
        assert_eq!(value, json!({"error": "password required"}));
    }

    #[test]
    fn completed_values_pass_through() {
        let value = DispatchOutcome::Completed(json!([1, 2])).into_value();
        assert_eq!(value, json!([1, 2]));
    }
}
