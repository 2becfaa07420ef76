use std::future::Future;

use crate::error::AuthError;

/// Source of bearer tokens for API calls.
///
/// Implementations decide how a token is obtained (stored, refreshed,
/// interactively granted); callers only ever see the token string.
pub trait AccessTokenProvider: Send + Sync {
    fn access_token(&self) -> impl Future<Output = Result<String, AuthError>> + Send;
}

/// Fixed token, for short-lived scripts and tests.
#[derive(Debug, Clone)]
pub struct StaticTokenProvider {
    token: String,
}

impl StaticTokenProvider {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

impl AccessTokenProvider for StaticTokenProvider {
    async fn access_token(&self) -> Result<String, AuthError> {
        Ok(self.token.clone())
    }
}
