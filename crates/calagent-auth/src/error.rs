//! Credential lifecycle errors.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error(
        "Client secrets not found at {0}. Download the OAuth client JSON from the Google Cloud \
         Console (APIs & Services > Credentials) and save it there."
    )]
    MissingClientSecrets(PathBuf),

    #[error("Invalid client secrets: {0}")]
    InvalidClientSecrets(String),

    #[error("Credential storage error: {0}")]
    Storage(String),

    #[error("Token request rejected: {0}")]
    Rejected(String),

    #[error("Token endpoint error: {0}")]
    TokenEndpoint(String),

    #[error("Consent was denied: {0}")]
    ConsentDenied(String),

    #[error("Consent flow failed: {0}")]
    ConsentFailed(String),

    #[error("OAuth state mismatch in redirect")]
    CsrfMismatch,
}

impl AuthError {
    /// Setup problems that no retry can fix; every other variant is a
    /// runtime failure of a single authentication attempt.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            Self::MissingClientSecrets(_) | Self::InvalidClientSecrets(_)
        )
    }
}
