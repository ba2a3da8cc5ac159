use std::path::PathBuf;

use serde_json::{Map, Value};

use super::arguments::Params;

/// A call waiting to be resolved and run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PendingInvocation {
    method: String,
    params: Params,
    password: Option<String>,
    wallet_path: Option<PathBuf>,
}

impl PendingInvocation {
    /// Builds an invocation of `method`.
    ///
    /// A named `password` or `wallet_path` string is lifted out as the
    /// invocation's secret and wallet selector.
    #[must_use]
    pub fn new(method: impl Into<String>, params: Params) -> Self {
        let password = params.named_str("password").map(str::to_owned);
        let wallet_path = params.named_str("wallet_path").map(PathBuf::from);
        Self {
            method: method.into(),
            params,
            password,
            wallet_path,
        }
    }

    /// Builds an invocation with no parameters.
    #[must_use]
    pub fn bare(method: impl Into<String>) -> Self {
        Self::new(method, Params::default())
    }

    /// Builds an invocation from named parameters.
    #[must_use]
    pub fn named(method: impl Into<String>, params: Map<String, Value>) -> Self {
        Self::new(method, Params::Named(params))
    }

    /// Sets the authorisation secret.
    #[must_use]
    pub fn with_password(mut self, password: Option<String>) -> Self {
        if password.is_some() {
            self.password = password;
        }
        self
    }

    /// Selects the wallet the call binds to.
    #[must_use]
    pub fn with_wallet_path(mut self, wallet_path: Option<PathBuf>) -> Self {
        if wallet_path.is_some() {
            self.wallet_path = wallet_path;
        }
        self
    }

    /// Requested operation name, trimmed.
    #[must_use]
    pub fn method(&self) -> &str {
        self.method.trim()
    }

    /// Raw parameters.
    #[must_use]
    pub const fn params(&self) -> &Params {
        &self.params
    }

    /// Authorisation secret, if supplied.
    #[must_use]
    pub fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }

    /// Explicit wallet selector, if supplied.
    #[must_use]
    pub fn wallet_path(&self) -> Option<&PathBuf> {
        self.wallet_path.as_ref()
    }

    pub(crate) fn into_parts(self) -> (String, Params, Option<String>, Option<PathBuf>) {
        (self.method, self.params, self.password, self.wallet_path)
    }
}
