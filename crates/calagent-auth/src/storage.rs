use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::AuthError;

/// Refresh this long before the stated expiry.
const EXPIRY_SKEW_SECS: i64 = 300;

/// Persisted OAuth credential, in Google's "authorized user" layout so that
/// token files written by other Google client libraries load unchanged.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoredCredential {
    /// Access token for API requests
    #[serde(alias = "access_token")]
    pub token: String,

    /// Optional refresh token for token renewal
    pub refresh_token: Option<String>,

    /// Endpoint used to refresh this credential
    pub token_uri: String,

    pub client_id: String,

    pub client_secret: String,

    /// Scopes granted to this token
    #[serde(default)]
    pub scopes: Vec<String>,

    /// Access token expiry; `None` means unknown
    #[serde(default)]
    pub expiry: Option<DateTime<Utc>>,
}

impl StoredCredential {
    /// Check if the token needs refresh (within 5 minutes of expiry)
    pub fn needs_refresh(&self) -> bool {
        self.needs_refresh_at(Utc::now())
    }

    pub fn needs_refresh_at(&self, now: DateTime<Utc>) -> bool {
        match self.expiry {
            Some(expiry) => now >= expiry - Duration::seconds(EXPIRY_SKEW_SECS),
            None => false,
        }
    }

    /// Usable as-is: has a token and isn't about to expire.
    pub fn is_valid(&self) -> bool {
        !self.token.is_empty() && !self.needs_refresh()
    }

    pub fn can_refresh(&self) -> bool {
        self.refresh_token
            .as_deref()
            .map(|t| !t.is_empty())
            .unwrap_or(false)
    }
}

/// File-backed credential storage at a fixed path.
#[derive(Debug, Clone)]
pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the stored credential.
    ///
    /// Returns `Ok(None)` when there is no file, or when the file can't be
    /// parsed (logged), so that a fresh consent can replace it.
    pub fn load(&self) -> Result<Option<StoredCredential>, AuthError> {
        if !self.path.exists() {
            tracing::debug!("No stored credential at {:?}", self.path);
            return Ok(None);
        }

        let json = fs::read_to_string(&self.path)
            .map_err(|e| AuthError::Storage(format!("Failed to read {:?}: {}", self.path, e)))?;

        match serde_json::from_str::<StoredCredential>(&json) {
            Ok(credential) => {
                tracing::debug!("Loaded stored credential from {:?}", self.path);
                Ok(Some(credential))
            }
            Err(e) => {
                tracing::warn!("Ignoring unreadable credential file {:?}: {}", self.path, e);
                Ok(None)
            }
        }
    }

    /// Write the credential, creating parent directories.
    pub fn save(&self, credential: &StoredCredential) -> Result<(), AuthError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| {
                    AuthError::Storage(format!("Failed to create {:?}: {}", parent, e))
                })?;
            }
        }

        let json = serde_json::to_string_pretty(credential)
            .map_err(|e| AuthError::Storage(format!("Failed to serialize credential: {}", e)))?;

        fs::write(&self.path, json)
            .map_err(|e| AuthError::Storage(format!("Failed to write {:?}: {}", self.path, e)))?;

        restrict_permissions(&self.path)?;

        tracing::info!("Stored credential at {:?}", self.path);
        Ok(())
    }

    /// Delete the stored credential, if any.
    pub fn delete(&self) -> Result<(), AuthError> {
        if self.path.exists() {
            fs::remove_file(&self.path).map_err(|e| {
                AuthError::Storage(format!("Failed to delete {:?}: {}", self.path, e))
            })?;
            tracing::info!("Deleted credential at {:?}", self.path);
        }

        Ok(())
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> Result<(), AuthError> {
    use std::os::unix::fs::PermissionsExt;

    fs::set_permissions(path, fs::Permissions::from_mode(0o600))
        .map_err(|e| AuthError::Storage(format!("Failed to restrict {:?}: {}", path, e)))
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> Result<(), AuthError> {
    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
    use super::*;

    fn credential(expiry: Option<DateTime<Utc>>, refresh_token: Option<&str>) -> StoredCredential {
        StoredCredential {
            token: "access".to_string(),
            refresh_token: refresh_token.map(String::from),
            token_uri: "https://oauth2.googleapis.com/token".to_string(),
            client_id: "client".to_string(),
            client_secret: "secret".to_string(),
            scopes: vec!["https://www.googleapis.com/auth/calendar".to_string()],
            expiry,
        }
    }

    #[test]
    fn test_token_expiry() {
        let now = Utc::now();

        let expired = credential(Some(now - Duration::hours(1)), None);
        assert!(expired.needs_refresh());
        assert!(!expired.is_valid());

        let valid = credential(Some(now + Duration::hours(1)), None);
        assert!(!valid.needs_refresh());
        assert!(valid.is_valid());

        // Needs refresh soon
        let soon = credential(Some(now + Duration::seconds(200)), None);
        assert!(soon.needs_refresh());
        assert!(!soon.is_valid());
    }

    #[test]
    fn test_unknown_expiry_is_valid() {
        assert!(credential(None, None).is_valid());
    }

    #[test]
    fn test_can_refresh() {
        assert!(credential(None, Some("refresh")).can_refresh());
        assert!(!credential(None, Some("")).can_refresh());
        assert!(!credential(None, None).can_refresh());
    }

    #[test]
    fn test_missing_file_loads_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = TokenStore::new(dir.path().join("token.json"));
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn test_save_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let store = TokenStore::new(dir.path().join("a").join("b").join("token.json"));
        let cred = credential(Some(Utc::now() + Duration::hours(1)), Some("refresh"));

        store.save(&cred).unwrap();
        assert_eq!(store.load().unwrap(), Some(cred));
    }

    #[cfg(unix)]
    #[test]
    fn test_saved_file_is_private() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let store = TokenStore::new(dir.path().join("token.json"));
        store.save(&credential(None, None)).unwrap();

        let mode = fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_reads_google_authorized_user_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token.json");
        fs::write(
            &path,
            r#"{"token": "ya29.abc", "refresh_token": "1//xyz",
                "token_uri": "https://oauth2.googleapis.com/token",
                "client_id": "id.apps.googleusercontent.com", "client_secret": "s",
                "scopes": ["https://www.googleapis.com/auth/calendar"],
                "universe_domain": "googleapis.com", "account": "",
                "expiry": "2025-01-15T10:00:00.123456Z"}"#,
        )
        .unwrap();

        let cred = TokenStore::new(&path).load().unwrap().unwrap();
        assert_eq!(cred.token, "ya29.abc");
        assert_eq!(cred.refresh_token.as_deref(), Some("1//xyz"));
        assert!(!cred.is_valid());
    }

    #[test]
    fn test_corrupt_file_loads_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token.json");
        fs::write(&path, "{not json").unwrap();

        assert!(TokenStore::new(&path).load().unwrap().is_none());
    }

    #[test]
    fn test_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = TokenStore::new(dir.path().join("token.json"));
        store.save(&credential(None, None)).unwrap();

        store.delete().unwrap();
        assert!(!store.path().exists());
        // Deleting again is fine
        store.delete().unwrap();
    }
}
