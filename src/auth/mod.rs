//! Bearer credential providers
//!
//! Token acquisition lives outside this crate. The client asks its provider
//! for a token before every single HTTP request and never caches the answer,
//! so freshness (and any caching) is entirely the provider's business.

use async_trait::async_trait;
use thiserror::Error;

/// Environment variable the CLI reads the bearer token from
pub const TOKEN_ENV_VAR: &str = "SQUARE_API_TOKEN";

#[derive(Error, Debug, Clone)]
pub enum CredentialError {
    #[error("Environment variable not found: {0}")]
    EnvVarNotFound(String),

    #[error("Credential provider failed: {0}")]
    Provider(String),
}

#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn token(&self) -> Result<String, CredentialError>;
}

/// A fixed token, e.g. from `--token`
#[derive(Clone)]
pub struct StaticToken(String);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

impl std::fmt::Debug for StaticToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("StaticToken(***)")
    }
}

#[async_trait]
impl CredentialProvider for StaticToken {
    async fn token(&self) -> Result<String, CredentialError> {
        Ok(self.0.clone())
    }
}

/// Reads the token from an environment variable on every call, so a token
/// rotated by an outer process is picked up without restarting.
#[derive(Debug, Clone)]
pub struct EnvToken {
    variable: String,
}

impl EnvToken {
    pub fn new(variable: impl Into<String>) -> Self {
        Self {
            variable: variable.into(),
        }
    }
}

impl Default for EnvToken {
    fn default() -> Self {
        Self::new(TOKEN_ENV_VAR)
    }
}

#[async_trait]
impl CredentialProvider for EnvToken {
    async fn token(&self) -> Result<String, CredentialError> {
        std::env::var(&self.variable)
            .map_err(|_| CredentialError::EnvVarNotFound(self.variable.clone()))
    }
}

#[async_trait]
impl<F> CredentialProvider for F
where
    F: Fn() -> Result<String, CredentialError> + Send + Sync,
{
    async fn token(&self) -> Result<String, CredentialError> {
        self()
    }
}
