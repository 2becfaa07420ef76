//! Google OAuth2 provider for Calendar access.

use chrono::{Duration, Utc};
use oauth2::basic::{BasicClient, BasicErrorResponse, BasicTokenResponse};
use oauth2::reqwest::async_http_client;
use oauth2::{
    AuthType, AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, PkceCodeChallenge,
    PkceCodeVerifier, RedirectUrl, RefreshToken, RequestTokenError, Scope, TokenResponse,
    TokenUrl,
};

use crate::error::AuthError;
use crate::secrets::ClientSecrets;
use crate::storage::StoredCredential;

/// Applied when the token endpoint omits `expires_in`.
const DEFAULT_EXPIRES_IN_SECS: i64 = 3600;

/// Longer lifetimes are treated as one day.
const MAX_EXPIRES_IN_SECS: i64 = 86_400;

/// A prepared consent request. `csrf_state` and `pkce_verifier` must be kept
/// until the redirect comes back.
pub struct AuthorizationRequest {
    pub url: String,
    pub csrf_state: CsrfToken,
    pub pkce_verifier: PkceCodeVerifier,
}

pub struct GoogleOAuth2Provider {
    secrets: ClientSecrets,
    scopes: Vec<String>,
}

impl GoogleOAuth2Provider {
    pub fn new(secrets: ClientSecrets, scopes: Vec<String>) -> Self {
        Self { secrets, scopes }
    }

    pub fn scopes(&self) -> &[String] {
        &self.scopes
    }

    fn client(
        client_id: &str,
        client_secret: &str,
        auth_uri: &str,
        token_uri: &str,
        redirect_uri: Option<&str>,
    ) -> Result<BasicClient, AuthError> {
        let auth_url = AuthUrl::new(auth_uri.to_string())
            .map_err(|e| AuthError::InvalidClientSecrets(format!("auth_uri: {}", e)))?;
        let token_url = TokenUrl::new(token_uri.to_string())
            .map_err(|e| AuthError::InvalidClientSecrets(format!("token_uri: {}", e)))?;

        // Google expects the client credentials in the form body.
        let mut client = BasicClient::new(
            ClientId::new(client_id.to_string()),
            Some(ClientSecret::new(client_secret.to_string())),
            auth_url,
            Some(token_url),
        )
        .set_auth_type(AuthType::RequestBody);

        if let Some(redirect) = redirect_uri {
            let redirect_url = RedirectUrl::new(redirect.to_string())
                .map_err(|e| AuthError::ConsentFailed(format!("redirect URI: {}", e)))?;
            client = client.set_redirect_uri(redirect_url);
        }

        Ok(client)
    }

    fn consent_client(&self, redirect_uri: &str) -> Result<BasicClient, AuthError> {
        Self::client(
            &self.secrets.client_id,
            &self.secrets.client_secret,
            &self.secrets.auth_uri,
            &self.secrets.token_uri,
            Some(redirect_uri),
        )
    }

    /// Build the consent URL with PKCE and offline access.
    pub fn authorization_request(
        &self,
        redirect_uri: &str,
    ) -> Result<AuthorizationRequest, AuthError> {
        let client = self.consent_client(redirect_uri)?;
        let (pkce_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();

        let mut auth_request = client.authorize_url(CsrfToken::new_random);
        for scope in &self.scopes {
            auth_request = auth_request.add_scope(Scope::new(scope.clone()));
        }

        // access_type=offline + prompt=consent makes Google return a refresh token
        let (url, csrf_state) = auth_request
            .set_pkce_challenge(pkce_challenge)
            .add_extra_param("access_type", "offline")
            .add_extra_param("prompt", "consent")
            .url();

        Ok(AuthorizationRequest {
            url: url.to_string(),
            csrf_state,
            pkce_verifier,
        })
    }

    /// Exchange authorization code for a credential.
    #[tracing::instrument(skip(self, code, pkce_verifier), level = "info")]
    pub async fn exchange_code(
        &self,
        code: &str,
        pkce_verifier: PkceCodeVerifier,
        redirect_uri: &str,
    ) -> Result<StoredCredential, AuthError> {
        let client = self.consent_client(redirect_uri)?;

        let response = client
            .exchange_code(AuthorizationCode::new(code.to_string()))
            .set_pkce_verifier(pkce_verifier)
            .request_async(async_http_client)
            .await
            .map_err(|e| token_error("code exchange", e))?;

        Ok(credential_from_response(
            &response,
            None,
            &self.secrets.token_uri,
            &self.secrets.client_id,
            &self.secrets.client_secret,
            &self.scopes,
        ))
    }
}

/// Refresh an expired credential against its own token endpoint.
///
/// Uses the client identity stored in the credential, so no client secrets
/// file is needed. The previous refresh token is kept if Google omits one.
#[tracing::instrument(skip(credential), level = "info")]
pub async fn refresh_credential(
    credential: &StoredCredential,
) -> Result<StoredCredential, AuthError> {
    let refresh_token = credential
        .refresh_token
        .as_deref()
        .ok_or_else(|| AuthError::Rejected("credential has no refresh token".to_string()))?;

    let client = GoogleOAuth2Provider::client(
        &credential.client_id,
        &credential.client_secret,
        // Unused for refresh; the token URI is the only endpoint contacted.
        &credential.token_uri,
        &credential.token_uri,
        None,
    )?;

    let response = client
        .exchange_refresh_token(&RefreshToken::new(refresh_token.to_string()))
        .request_async(async_http_client)
        .await
        .map_err(|e| token_error("refresh", e))?;

    Ok(credential_from_response(
        &response,
        Some(refresh_token),
        &credential.token_uri,
        &credential.client_id,
        &credential.client_secret,
        &credential.scopes,
    ))
}

fn credential_from_response(
    response: &BasicTokenResponse,
    previous_refresh_token: Option<&str>,
    token_uri: &str,
    client_id: &str,
    client_secret: &str,
    requested_scopes: &[String],
) -> StoredCredential {
    let expires_in = response
        .expires_in()
        .map(|d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX))
        .unwrap_or(DEFAULT_EXPIRES_IN_SECS)
        .min(MAX_EXPIRES_IN_SECS);

    let scopes = response
        .scopes()
        .map(|granted| granted.iter().map(|s| s.as_str().to_owned()).collect())
        .unwrap_or_else(|| requested_scopes.to_vec());

    StoredCredential {
        token: response.access_token().secret().clone(),
        refresh_token: response
            .refresh_token()
            .map(|t| t.secret().clone())
            .or_else(|| previous_refresh_token.map(String::from)),
        token_uri: token_uri.to_string(),
        client_id: client_id.to_string(),
        client_secret: client_secret.to_string(),
        scopes,
        expiry: Some(Utc::now() + Duration::seconds(expires_in)),
    }
}

/// OAuth error responses (e.g. `invalid_grant`) become [`AuthError::Rejected`];
/// transport and parse problems become [`AuthError::TokenEndpoint`].
fn token_error<RE>(context: &str, err: RequestTokenError<RE, BasicErrorResponse>) -> AuthError
where
    RE: std::error::Error + 'static,
{
    match err {
        RequestTokenError::ServerResponse(response) => {
            AuthError::Rejected(format!("{}: {}", context, response))
        }
        other => AuthError::TokenEndpoint(format!("{}: {}", context, other)),
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
    use super::*;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn secrets(token_uri: &str) -> ClientSecrets {
        ClientSecrets {
            client_id: "test_client_id".to_string(),
            client_secret: "test_client_secret".to_string(),
            auth_uri: "https://accounts.google.com/o/oauth2/auth".to_string(),
            token_uri: token_uri.to_string(),
        }
    }

    fn provider() -> GoogleOAuth2Provider {
        GoogleOAuth2Provider::new(
            secrets("https://oauth2.googleapis.com/token"),
            vec!["https://www.googleapis.com/auth/calendar".to_string()],
        )
    }

    fn expired_credential(token_uri: &str) -> StoredCredential {
        StoredCredential {
            token: "old_token".to_string(),
            refresh_token: Some("refresh_me".to_string()),
            token_uri: token_uri.to_string(),
            client_id: "test_client_id".to_string(),
            client_secret: "test_client_secret".to_string(),
            scopes: vec!["https://www.googleapis.com/auth/calendar".to_string()],
            expiry: Some(Utc::now() - Duration::hours(1)),
        }
    }

    #[test]
    fn test_auth_url_contains_scopes() {
        let request = provider()
            .authorization_request("http://localhost:8080/")
            .unwrap();
        assert!(request.url.contains("scope="));
        assert!(request.url.contains("calendar"));
        assert!(request.url.contains("code_challenge_method=S256"));
    }

    #[test]
    fn test_auth_url_contains_offline_access() {
        let request = provider()
            .authorization_request("http://localhost:8080/")
            .unwrap();
        assert!(request.url.contains("access_type=offline"));
        assert!(request.url.contains("prompt=consent"));
        assert!(request.url.contains("redirect_uri=http%3A%2F%2Flocalhost%3A8080%2F"));
    }

    #[test]
    fn test_state_is_unique() {
        let p = provider();
        let first = p.authorization_request("http://localhost:1/").unwrap();
        let second = p.authorization_request("http://localhost:1/").unwrap();
        assert_ne!(first.csrf_state.secret(), second.csrf_state.secret());
    }

    #[tokio::test]
    async fn test_refresh_keeps_previous_refresh_token() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=refresh_token"))
            .and(body_string_contains("refresh_token=refresh_me"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "new_token",
                "token_type": "Bearer",
                "expires_in": 3599
            })))
            .mount(&mock_server)
            .await;

        let token_uri = format!("{}/token", mock_server.uri());
        let refreshed = refresh_credential(&expired_credential(&token_uri))
            .await
            .unwrap();

        assert_eq!(refreshed.token, "new_token");
        assert_eq!(refreshed.refresh_token.as_deref(), Some("refresh_me"));
        assert!(refreshed.is_valid());
        assert_eq!(refreshed.token_uri, token_uri);
    }

    #[tokio::test]
    async fn test_huge_expires_in_is_capped() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "long_lived",
                "token_type": "Bearer",
                "expires_in": u64::MAX
            })))
            .mount(&mock_server)
            .await;

        let token_uri = format!("{}/token", mock_server.uri());
        let refreshed = refresh_credential(&expired_credential(&token_uri))
            .await
            .unwrap();

        let expiry = refreshed.expiry.unwrap();
        assert!(refreshed.is_valid());
        assert!(expiry <= Utc::now() + Duration::seconds(MAX_EXPIRES_IN_SECS));
    }

    #[tokio::test]
    async fn test_refresh_rejected() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": "invalid_grant",
                "error_description": "Token has been expired or revoked."
            })))
            .mount(&mock_server)
            .await;

        let token_uri = format!("{}/token", mock_server.uri());
        let result = refresh_credential(&expired_credential(&token_uri)).await;

        assert!(matches!(result, Err(AuthError::Rejected(_))));
    }

    #[tokio::test]
    async fn test_refresh_without_refresh_token() {
        let mut credential = expired_credential("https://oauth2.googleapis.com/token");
        credential.refresh_token = None;

        let result = refresh_credential(&credential).await;
        assert!(matches!(result, Err(AuthError::Rejected(_))));
    }
}
