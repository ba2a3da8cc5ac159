//! RPC credentials and HTTP Basic authentication.

use std::fmt;

use base64::Engine as _;
use base64::engine::general_purpose::{STANDARD, URL_SAFE};
use rand::RngCore;
use rand::rngs::OsRng;
use subtle::ConstantTimeEq;
use thiserror::Error;
use tracing::{info, warn};
use walletd_config::{Config, ConfigError, DEFAULT_RPC_USER};

use super::RPC_TARGET;

const PASSWORD_BYTES: usize = 16;

/// Username and password accepted by the JSON-RPC listener.
#[derive(Clone, PartialEq, Eq)]
pub struct RpcCredentials {
    user: String,
    password: String,
}

impl RpcCredentials {
    /// Builds credentials from known values.
    #[must_use]
    pub fn new(user: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            password: password.into(),
        }
    }

    /// Generates a random password for `user`.
    ///
    /// The password is 16 random bytes in URL-safe base64.
    #[must_use]
    pub fn generate(user: impl Into<String>) -> Self {
        let mut bytes = [0u8; PASSWORD_BYTES];
        OsRng.fill_bytes(&mut bytes);
        Self::new(user, URL_SAFE.encode(bytes))
    }

    /// Reads the credentials from `config`, generating and persisting them
    /// when either half is missing.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the generated credentials cannot be saved.
    pub fn ensure(config: &mut Config) -> Result<Self, ConfigError> {
        if let (Some(user), Some(password)) = (config.rpc_user(), config.rpc_password()) {
            return Ok(Self::new(user, password));
        }
        let user = config.rpc_user().unwrap_or(DEFAULT_RPC_USER).to_owned();
        let credentials = Self::generate(user);
        config.set_rpc_credentials(&credentials.user, &credentials.password);
        config.save()?;
        info!(
            target: RPC_TARGET,
            user = %credentials.user,
            config = %config.config_path().display(),
            "generated RPC credentials"
        );
        Ok(credentials)
    }

    /// Username.
    #[must_use]
    pub fn user(&self) -> &str {
        &self.user
    }

    /// Password.
    #[must_use]
    pub fn password(&self) -> &str {
        &self.password
    }

    /// Value of an `Authorization` header carrying these credentials.
    #[must_use]
    pub fn basic_header(&self) -> String {
        format!(
            "Basic {}",
            STANDARD.encode(format!("{}:{}", self.user, self.password))
        )
    }
}

impl fmt::Debug for RpcCredentials {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("RpcCredentials")
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Why a request failed authentication.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AuthError {
    /// No `Authorization` header was sent.
    #[error("missing authorization header")]
    Missing,
    /// The header is not well-formed Basic authentication.
    #[error("malformed authorization header")]
    Malformed,
    /// The username or password does not match.
    #[error("invalid credentials")]
    Mismatch,
}

/// Checks `Authorization` headers against the configured credentials.
#[derive(Debug, Clone)]
pub struct Authenticator {
    credentials: RpcCredentials,
}

impl Authenticator {
    /// Builds an authenticator.
    ///
    /// An empty password disables authentication; a warning is logged.
    #[must_use]
    pub fn new(credentials: RpcCredentials) -> Self {
        if credentials.password.is_empty() {
            warn!(
                target: RPC_TARGET,
                "RPC authentication is disabled because the password is empty"
            );
        }
        Self { credentials }
    }

    /// Whether every request is accepted.
    #[must_use]
    pub fn is_disabled(&self) -> bool {
        self.credentials.password.is_empty()
    }

    /// Verifies the raw `Authorization` header value.
    ///
    /// Username and password are both compared in constant time and the
    /// results combined without short-circuiting.
    ///
    /// # Errors
    ///
    /// Returns the [`AuthError`] describing the failure.
    pub fn verify(&self, header: Option<&str>) -> Result<(), AuthError> {
        if self.is_disabled() {
            return Ok(());
        }
        let header = header.ok_or(AuthError::Missing)?;
        let encoded = header
            .strip_prefix("Basic ")
            .ok_or(AuthError::Malformed)?
            .trim();
        let decoded = STANDARD
            .decode(encoded)
            .map_err(|_| AuthError::Malformed)?;
        let decoded = String::from_utf8(decoded).map_err(|_| AuthError::Malformed)?;
        let (user, password) = decoded.split_once(':').ok_or(AuthError::Malformed)?;
        let user_ok = user.as_bytes().ct_eq(self.credentials.user.as_bytes());
        let password_ok = password
            .as_bytes()
            .ct_eq(self.credentials.password.as_bytes());
        if bool::from(user_ok & password_ok) {
            Ok(())
        } else {
            Err(AuthError::Mismatch)
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::{fixture, rstest};

    use super::*;

    #[fixture]
    fn credentials() -> RpcCredentials {
        RpcCredentials::new("user", "s3cret-Pa55")
    }

    fn header(user: &str, password: &str) -> String {
        RpcCredentials::new(user, password).basic_header()
    }

    #[rstest]
    fn accepts_matching_credentials(credentials: RpcCredentials) {
        let header = credentials.basic_header();
        let authenticator = Authenticator::new(credentials);
        assert_eq!(authenticator.verify(Some(&header)), Ok(()));
    }

    #[rstest]
    fn any_single_character_mutation_fails(credentials: RpcCredentials) {
        let authenticator = Authenticator::new(credentials.clone());
        let secret = format!("{}:{}", credentials.user(), credentials.password());
        for index in 0..secret.len() {
            let mut mutated = secret.clone().into_bytes();
            mutated[index] = if mutated[index] == b'x' { b'y' } else { b'x' };
            let mutated = String::from_utf8(mutated).expect("ascii input");
            let header = format!("Basic {}", STANDARD.encode(&mutated));
            assert!(
                authenticator.verify(Some(&header)).is_err(),
                "mutation at {index} ({mutated}) was accepted"
            );
        }
    }

    #[rstest]
    #[case(None, AuthError::Missing)]
    #[case(Some("Bearer abc"), AuthError::Malformed)]
    #[case(Some("Basic !!!"), AuthError::Malformed)]
    #[case(Some("Basic dXNlcg=="), AuthError::Malformed)]
    fn rejects_unusable_headers(
        credentials: RpcCredentials,
        #[case] raw: Option<&str>,
        #[case] expected: AuthError,
    ) {
        assert_eq!(Authenticator::new(credentials).verify(raw), Err(expected));
    }

    #[rstest]
    fn wrong_user_with_right_password_fails(credentials: RpcCredentials) {
        let header = header("admin", credentials.password());
        assert_eq!(
            Authenticator::new(credentials).verify(Some(&header)),
            Err(AuthError::Mismatch)
        );
    }

    #[test]
    fn empty_password_disables_checks() {
        let authenticator = Authenticator::new(RpcCredentials::new("user", ""));
        assert!(authenticator.is_disabled());
        assert_eq!(authenticator.verify(None), Ok(()));
    }

    #[test]
    fn generated_passwords_are_url_safe() {
        let credentials = RpcCredentials::generate("user");
        assert_eq!(credentials.password().len(), 24);
        assert!(
            credentials
                .password()
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '='))
        );
    }

    #[test]
    fn ensure_persists_generated_credentials() {
        let dir = tempfile::tempdir().expect("temp dir");
        let mut config = Config::in_dir(dir.path());
        let generated = RpcCredentials::ensure(&mut config).expect("generated");

        let mut reloaded = Config::load(&walletd_config::ConfigOverrides {
            data_dir: Some(dir.path().to_path_buf()),
            ..Default::default()
        })
        .expect("reload");
        let reused = RpcCredentials::ensure(&mut reloaded).expect("reused");
        assert_eq!(generated, reused);
        assert_eq!(reused.user(), DEFAULT_RPC_USER);
    }
}
