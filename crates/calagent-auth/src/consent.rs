//! Interactive consent: a loopback redirect listener plus the system browser.

use std::collections::HashMap;
use std::future::Future;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use tokio::sync::{oneshot, Mutex};
use warp::Filter;

use crate::error::AuthError;
use crate::google::GoogleOAuth2Provider;
use crate::storage::StoredCredential;

type CallbackSender = Arc<Mutex<Option<oneshot::Sender<HashMap<String, String>>>>>;

const SUCCESS_PAGE: &str = "<html><body><h1>Authorization successful!</h1>\
    <p>You can close this window and return to calagent.</p></body></html>";
const WAITING_PAGE: &str = "<html><body><p>Waiting for Google sign-in.</p></body></html>";

/// Obtains a brand-new credential from a human.
pub trait ConsentFlow: Send + Sync {
    fn authorize(
        &self,
        provider: &GoogleOAuth2Provider,
    ) -> impl Future<Output = Result<StoredCredential, AuthError>> + Send;
}

/// Installed-app flow: listen on localhost, open the consent page, wait for
/// Google to redirect back with the authorization code.
#[derive(Debug, Clone)]
pub struct BrowserConsent {
    /// 0 binds an ephemeral port
    pub port: u16,
    pub open_browser: bool,
}

impl Default for BrowserConsent {
    fn default() -> Self {
        Self {
            port: 0,
            open_browser: true,
        }
    }
}

impl ConsentFlow for BrowserConsent {
    async fn authorize(
        &self,
        provider: &GoogleOAuth2Provider,
    ) -> Result<StoredCredential, AuthError> {
        let (tx, rx) = oneshot::channel();
        let tx: CallbackSender = Arc::new(Mutex::new(Some(tx)));
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let routes = warp::get()
            .and(warp::query::<HashMap<String, String>>())
            .and(warp::any().map(move || tx.clone()))
            .and_then(|params: HashMap<String, String>, tx: CallbackSender| async move {
                // Stray requests (favicon etc.) must not consume the sender
                let is_redirect = params.contains_key("code") || params.contains_key("error");
                if !is_redirect {
                    return Ok(warp::reply::html(WAITING_PAGE));
                }
                if let Some(sender) = tx.lock().await.take() {
                    let _ = sender.send(params);
                }
                Ok::<_, warp::Rejection>(warp::reply::html(SUCCESS_PAGE))
            });

        let bind_addr = SocketAddr::from((Ipv4Addr::LOCALHOST, self.port));
        let (addr, server) = warp::serve(routes)
            .try_bind_with_graceful_shutdown(bind_addr, async {
                let _ = shutdown_rx.await;
            })
            .map_err(|e| {
                AuthError::ConsentFailed(format!("cannot listen on {}: {}", bind_addr, e))
            })?;
        tokio::spawn(server);

        let redirect_uri = format!("http://localhost:{}/", addr.port());
        let request = provider.authorization_request(&redirect_uri)?;

        tracing::info!("Waiting for OAuth consent on {}", addr);
        tracing::info!("Auth URL: {}", request.url);
        eprintln!(
            "Please visit this URL to authorize calagent:\n\n    {}\n",
            request.url
        );

        if self.open_browser {
            if let Err(e) = webbrowser::open(&request.url) {
                tracing::warn!("Failed to open browser: {}", e);
            }
        }

        let received = rx.await;
        let _ = shutdown_tx.send(());
        let params = received.map_err(|_| {
            AuthError::ConsentFailed("callback listener closed before redirect".to_string())
        })?;

        let code = validate_callback(&params, request.csrf_state.secret())?;

        let credential = provider
            .exchange_code(code, request.pkce_verifier, &redirect_uri)
            .await?;

        tracing::info!("OAuth consent completed");
        Ok(credential)
    }
}

/// Pull the authorization code out of the redirect query.
fn validate_callback<'a>(
    params: &'a HashMap<String, String>,
    expected_state: &str,
) -> Result<&'a str, AuthError> {
    if let Some(error) = params.get("error") {
        return Err(AuthError::ConsentDenied(error.clone()));
    }

    if params.get("state").map(String::as_str) != Some(expected_state) {
        return Err(AuthError::CsrfMismatch);
    }

    params
        .get("code")
        .map(String::as_str)
        .filter(|c| !c.is_empty())
        .ok_or_else(|| AuthError::ConsentFailed("redirect carried no code".to_string()))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_callback_with_code() {
        let p = params(&[("code", "4/abc"), ("state", "xyz")]);
        assert_eq!(validate_callback(&p, "xyz").unwrap(), "4/abc");
    }

    #[test]
    fn test_callback_state_mismatch() {
        let p = params(&[("code", "4/abc"), ("state", "other")]);
        assert!(matches!(validate_callback(&p, "xyz"), Err(AuthError::CsrfMismatch)));
    }

    #[test]
    fn test_callback_denied() {
        let p = params(&[("error", "access_denied"), ("state", "xyz")]);
        assert!(matches!(
            validate_callback(&p, "xyz"),
            Err(AuthError::ConsentDenied(e)) if e == "access_denied"
        ));
    }

    #[test]
    fn test_callback_without_code() {
        let p = params(&[("state", "xyz")]);
        assert!(matches!(
            validate_callback(&p, "xyz"),
            Err(AuthError::ConsentFailed(_))
        ));
    }
}
