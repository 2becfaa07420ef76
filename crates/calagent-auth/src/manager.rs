//! Credential lifecycle: cached → stored → refreshed → consented.

use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

use crate::consent::{BrowserConsent, ConsentFlow};
use crate::error::AuthError;
use crate::google::{refresh_credential, GoogleOAuth2Provider};
use crate::provider::AccessTokenProvider;
use crate::secrets::ClientSecrets;
use crate::storage::{StoredCredential, TokenStore};

/// Owns the calendar credential for the lifetime of the process.
///
/// Each call to [`obtain_credential`](Self::obtain_credential) returns a
/// usable credential, refreshing or re-consenting as needed and persisting
/// any change. A still-valid in-memory credential short-circuits all of it.
pub struct CredentialManager<C = BrowserConsent> {
    store: TokenStore,
    client_secrets_path: PathBuf,
    scopes: Vec<String>,
    consent: C,
    cached: Mutex<Option<StoredCredential>>,
}

impl CredentialManager<BrowserConsent> {
    pub fn new(
        token_path: impl Into<PathBuf>,
        client_secrets_path: impl Into<PathBuf>,
        scopes: Vec<String>,
    ) -> Self {
        Self::with_consent(
            token_path,
            client_secrets_path,
            scopes,
            BrowserConsent::default(),
        )
    }
}

impl<C: ConsentFlow> CredentialManager<C> {
    pub fn with_consent(
        token_path: impl Into<PathBuf>,
        client_secrets_path: impl Into<PathBuf>,
        scopes: Vec<String>,
        consent: C,
    ) -> Self {
        Self {
            store: TokenStore::new(token_path),
            client_secrets_path: client_secrets_path.into(),
            scopes,
            consent,
            cached: Mutex::new(None),
        }
    }

    pub fn token_path(&self) -> &Path {
        self.store.path()
    }

    /// Return a valid credential, establishing one if necessary.
    ///
    /// Fails with a configuration error only when no usable credential exists
    /// and the client secrets needed for consent are missing or malformed.
    #[tracing::instrument(skip(self), level = "debug")]
    pub async fn obtain_credential(&self) -> Result<StoredCredential, AuthError> {
        // Held across refresh/consent so concurrent callers don't race.
        let mut cached = self.cached.lock().await;

        if let Some(credential) = cached.as_ref() {
            if credential.is_valid() {
                return Ok(credential.clone());
            }
        }

        let stored = self.store.load()?;

        let credential = match stored {
            Some(credential) if credential.is_valid() => {
                tracing::debug!("Using stored credential");
                *cached = Some(credential.clone());
                return Ok(credential);
            }
            Some(credential) if credential.can_refresh() => {
                match refresh_credential(&credential).await {
                    Ok(refreshed) => {
                        tracing::info!("Refreshed expired credential");
                        refreshed
                    }
                    Err(AuthError::Rejected(reason)) => {
                        tracing::warn!("Refresh rejected ({}), requesting new consent", reason);
                        self.run_consent().await?
                    }
                    Err(e) => return Err(e),
                }
            }
            _ => self.run_consent().await?,
        };

        self.store.save(&credential)?;
        *cached = Some(credential.clone());
        Ok(credential)
    }

    async fn run_consent(&self) -> Result<StoredCredential, AuthError> {
        let secrets = ClientSecrets::load(&self.client_secrets_path)?;
        let provider = GoogleOAuth2Provider::new(secrets, self.scopes.clone());

        tracing::info!("No usable credential; starting interactive consent");
        self.consent.authorize(&provider).await
    }

    /// Forget the credential, both cached and on disk.
    pub async fn sign_out(&self) -> Result<(), AuthError> {
        self.cached.lock().await.take();
        self.store.delete()
    }
}

impl<C: ConsentFlow> AccessTokenProvider for CredentialManager<C> {
    async fn access_token(&self) -> Result<String, AuthError> {
        self.obtain_credential().await.map(|c| c.token)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
    use super::*;
    use chrono::{Duration, Utc};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const SCOPE: &str = "https://www.googleapis.com/auth/calendar";

    /// Grants a fixed credential without a browser and counts invocations.
    #[derive(Clone, Default)]
    struct FakeConsent {
        calls: Arc<AtomicUsize>,
    }

    impl ConsentFlow for FakeConsent {
        async fn authorize(
            &self,
            provider: &GoogleOAuth2Provider,
        ) -> Result<StoredCredential, AuthError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            assert_eq!(provider.scopes(), [SCOPE.to_string()]);
            Ok(credential("consented", Some(Utc::now() + Duration::hours(1)), Some("r")))
        }
    }

    fn credential(
        token: &str,
        expiry: Option<chrono::DateTime<Utc>>,
        refresh_token: Option<&str>,
    ) -> StoredCredential {
        StoredCredential {
            token: token.to_string(),
            refresh_token: refresh_token.map(String::from),
            token_uri: "https://oauth2.googleapis.com/token".to_string(),
            client_id: "client".to_string(),
            client_secret: "secret".to_string(),
            scopes: vec![SCOPE.to_string()],
            expiry,
        }
    }

    fn write_client_secrets(dir: &Path) -> PathBuf {
        let path = dir.join("credentials.json");
        std::fs::write(
            &path,
            r#"{"installed": {"client_id": "client", "client_secret": "secret"}}"#,
        )
        .unwrap();
        path
    }

    fn manager(dir: &Path, secrets: PathBuf, consent: FakeConsent) -> CredentialManager<FakeConsent> {
        CredentialManager::with_consent(
            dir.join("token.json"),
            secrets,
            vec![SCOPE.to_string()],
            consent,
        )
    }

    #[tokio::test]
    async fn test_valid_stored_credential_skips_consent() {
        let dir = tempfile::tempdir().unwrap();
        let consent = FakeConsent::default();
        let manager = manager(dir.path(), dir.path().join("missing.json"), consent.clone());

        TokenStore::new(manager.token_path())
            .save(&credential("stored", Some(Utc::now() + Duration::hours(1)), None))
            .unwrap();

        assert_eq!(manager.access_token().await.unwrap(), "stored");
        assert_eq!(consent.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_missing_client_secrets_is_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(
            dir.path(),
            dir.path().join("credentials.json"),
            FakeConsent::default(),
        );

        let err = manager.obtain_credential().await.unwrap_err();
        assert!(matches!(err, AuthError::MissingClientSecrets(_)));
        assert!(err.is_configuration_error());
    }

    #[tokio::test]
    async fn test_consent_runs_once_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let consent = FakeConsent::default();
        let manager = manager(dir.path(), write_client_secrets(dir.path()), consent.clone());

        assert_eq!(manager.access_token().await.unwrap(), "consented");
        assert_eq!(manager.access_token().await.unwrap(), "consented");
        assert_eq!(consent.calls.load(Ordering::SeqCst), 1);

        let persisted = TokenStore::new(manager.token_path()).load().unwrap().unwrap();
        assert_eq!(persisted.token, "consented");
    }

    #[tokio::test]
    async fn test_expired_credential_is_refreshed_and_persisted() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "refreshed",
                "token_type": "Bearer",
                "expires_in": 3599
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let consent = FakeConsent::default();
        let manager = manager(dir.path(), dir.path().join("missing.json"), consent.clone());

        let mut expired = credential("stale", Some(Utc::now() - Duration::hours(1)), Some("r1"));
        expired.token_uri = format!("{}/token", mock_server.uri());
        TokenStore::new(manager.token_path()).save(&expired).unwrap();

        assert_eq!(manager.access_token().await.unwrap(), "refreshed");
        // Served from cache; the mock's expect(1) verifies no second refresh
        assert_eq!(manager.access_token().await.unwrap(), "refreshed");
        assert_eq!(consent.calls.load(Ordering::SeqCst), 0);

        let persisted = TokenStore::new(manager.token_path()).load().unwrap().unwrap();
        assert_eq!(persisted.token, "refreshed");
        assert_eq!(persisted.refresh_token.as_deref(), Some("r1"));
    }

    #[tokio::test]
    async fn test_rejected_refresh_falls_back_to_consent() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": "invalid_grant"
            })))
            .mount(&mock_server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let consent = FakeConsent::default();
        let manager = manager(dir.path(), write_client_secrets(dir.path()), consent.clone());

        let mut revoked = credential("stale", Some(Utc::now() - Duration::hours(1)), Some("r1"));
        revoked.token_uri = format!("{}/token", mock_server.uri());
        TokenStore::new(manager.token_path()).save(&revoked).unwrap();

        assert_eq!(manager.access_token().await.unwrap(), "consented");
        assert_eq!(consent.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_expired_without_refresh_token_needs_secrets() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(
            dir.path(),
            dir.path().join("credentials.json"),
            FakeConsent::default(),
        );

        TokenStore::new(manager.token_path())
            .save(&credential("stale", Some(Utc::now() - Duration::hours(1)), None))
            .unwrap();

        let err = manager.obtain_credential().await.unwrap_err();
        assert!(err.is_configuration_error());
    }

    #[tokio::test]
    async fn test_sign_out_removes_credential() {
        let dir = tempfile::tempdir().unwrap();
        let consent = FakeConsent::default();
        let manager = manager(dir.path(), write_client_secrets(dir.path()), consent.clone());

        manager.access_token().await.unwrap();
        manager.sign_out().await.unwrap();
        assert!(!manager.token_path().exists());

        // Next call has to consent again
        manager.access_token().await.unwrap();
        assert_eq!(consent.calls.load(Ordering::SeqCst), 2);
    }
}
