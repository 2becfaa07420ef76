//! OAuth client secrets as downloaded from the Google Cloud Console.

use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::error::AuthError;

const GOOGLE_AUTH_URI: &str = "https://accounts.google.com/o/oauth2/auth";
const GOOGLE_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Identity of the calling application at the authorization server.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientSecrets {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default = "default_auth_uri")]
    pub auth_uri: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_auth_uri() -> String {
    GOOGLE_AUTH_URI.to_string()
}

fn default_token_uri() -> String {
    GOOGLE_TOKEN_URI.to_string()
}

/// Desktop clients nest under `installed`, web clients under `web`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
enum ClientSecretsFile {
    Installed(ClientSecrets),
    Web(ClientSecrets),
}

impl ClientSecrets {
    /// Load and parse a client secrets file.
    ///
    /// A missing file is [`AuthError::MissingClientSecrets`]; anything that
    /// can't be read as a Google OAuth client is [`AuthError::InvalidClientSecrets`].
    pub fn load(path: &Path) -> Result<Self, AuthError> {
        if !path.exists() {
            return Err(AuthError::MissingClientSecrets(path.to_path_buf()));
        }

        let json = fs::read_to_string(path)
            .map_err(|e| AuthError::InvalidClientSecrets(format!("{}: {}", path.display(), e)))?;

        let secrets = Self::from_json(&json)?;
        tracing::debug!("Loaded client secrets from {:?}", path);
        Ok(secrets)
    }

    pub fn from_json(json: &str) -> Result<Self, AuthError> {
        let file: ClientSecretsFile = serde_json::from_str(json)
            .map_err(|e| AuthError::InvalidClientSecrets(e.to_string()))?;

        let secrets = match file {
            ClientSecretsFile::Installed(s) | ClientSecretsFile::Web(s) => s,
        };

        if secrets.client_id.trim().is_empty() {
            return Err(AuthError::InvalidClientSecrets(
                "client_id is empty".to_string(),
            ));
        }

        Ok(secrets)
    }
}
