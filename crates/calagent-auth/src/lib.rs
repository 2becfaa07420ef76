//! Google OAuth credentials for calendar access.
//!
//! [`CredentialManager`] is the entry point: it hands out valid credentials,
//! loading, refreshing or interactively obtaining them as needed.

pub mod consent;
pub mod error;
pub mod google;
pub mod manager;
pub mod provider;
pub mod secrets;
pub mod storage;

pub use consent::{BrowserConsent, ConsentFlow};
pub use error::AuthError;
pub use google::{refresh_credential, GoogleOAuth2Provider};
pub use manager::CredentialManager;
pub use provider::{AccessTokenProvider, StaticTokenProvider};
pub use secrets::ClientSecrets;
pub use storage::{StoredCredential, TokenStore};

/// Read/write access to the user's calendars.
pub const CALENDAR_SCOPE: &str = "https://www.googleapis.com/auth/calendar";
