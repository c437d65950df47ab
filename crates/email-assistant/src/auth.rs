//! OAuth sessions for the Google account systems.
//!
//! Each gateway owns one [`GoogleSession`]. Consent happens once, at
//! startup. The authenticator kept for the running service can refresh
//! tokens but never opens a consent flow; a grant Google no longer honours
//! surfaces as an `Auth` error until the process is restarted.

use crate::config::GoogleAccountConfig;
use crate::error::{with_timeout, GatewayError};
use google_gmail1::hyper_rustls::HttpsConnector;
use google_gmail1::yup_oauth2;
use google_gmail1::yup_oauth2::authenticator_delegate::InstalledFlowDelegate;
use hyper_util::client::legacy::connect::HttpConnector;
use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::time::Duration;
use tokio::sync::Mutex;

pub type GoogleAuthenticator =
    yup_oauth2::authenticator::Authenticator<HttpsConnector<HttpConnector>>;

pub const GMAIL_SCOPES: &[&str] = &[
    "https://www.googleapis.com/auth/gmail.readonly",
    "https://www.googleapis.com/auth/gmail.compose",
    "https://www.googleapis.com/auth/gmail.modify",
];

pub const CALENDAR_SCOPES: &[&str] = &["https://www.googleapis.com/auth/calendar"];

pub struct GoogleSession {
    label: &'static str,
    scopes: &'static [&'static str],
    authenticator: GoogleAuthenticator,
    /// Serializes forced refreshes
    refresh_lock: Mutex<()>,
}

impl GoogleSession {
    /// Load the client secret, restore or obtain a grant, and fetch a token
    /// for `scopes` so any interactive consent happens now rather than in
    /// the middle of a poll cycle.
    pub async fn establish(
        label: &'static str,
        account: &GoogleAccountConfig,
        scopes: &'static [&'static str],
    ) -> Result<Self, GatewayError> {
        let secret = read_secret(label, &account.credentials_path).await?;

        if !account.token_cache_path.exists() {
            tracing::info!(
                session = label,
                token_cache = %account.token_cache_path.display(),
                "interactive_consent_required"
            );
        }

        let consent = build_authenticator(
            label,
            secret.clone(),
            yup_oauth2::InstalledFlowReturnMethod::HTTPRedirect,
            None,
            &account.token_cache_path,
        )
        .await?;
        consent
            .token(scopes)
            .await
            .map_err(|e| GatewayError::Auth(format!("Failed to obtain {} token: {}", label, e)))?;

        let authenticator = build_authenticator(
            label,
            secret,
            yup_oauth2::InstalledFlowReturnMethod::Interactive,
            Some(Box::new(NoConsentAfterStartup { label })),
            &account.token_cache_path,
        )
        .await?;

        tracing::info!(session = label, "session_established");

        Ok(Self {
            label,
            scopes,
            authenticator,
            refresh_lock: Mutex::new(()),
        })
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    /// Current authenticator handle
    pub fn authenticator(&self) -> GoogleAuthenticator {
        self.authenticator.clone()
    }

    /// Fetch a new access token with the stored refresh token, bypassing the
    /// cached access token the API just rejected. Bounded by `limit`.
    pub async fn refresh(&self, limit: Duration) -> Result<(), GatewayError> {
        let _guard = self.refresh_lock.lock().await;
        tracing::warn!(session = self.label, "session_refreshing");

        with_timeout(limit, async {
            self.authenticator
                .force_refreshed_token(self.scopes)
                .await
                .map(|_| ())
                .map_err(|e| {
                    GatewayError::Auth(format!("Failed to refresh {} token: {}", self.label, e))
                })
        })
        .await?;

        tracing::info!(session = self.label, "session_refreshed");
        Ok(())
    }
}

/// Refuses the consent flow so a revoked grant fails fast instead of
/// waiting for a browser that will never come.
struct NoConsentAfterStartup {
    label: &'static str,
}

impl InstalledFlowDelegate for NoConsentAfterStartup {
    fn present_user_url<'a>(
        &'a self,
        _url: &'a str,
        _need_code: bool,
    ) -> Pin<Box<dyn Future<Output = Result<String, String>> + Send + 'a>> {
        Box::pin(async move {
            Err(format!(
                "{} grant is no longer valid; restart the assistant to grant consent again",
                self.label
            ))
        })
    }
}

async fn read_secret(
    label: &str,
    credentials_path: &Path,
) -> Result<yup_oauth2::ApplicationSecret, GatewayError> {
    if !credentials_path.exists() {
        return Err(GatewayError::Auth(format!(
            "{} credentials file not found at {}. Please download it from Google Cloud Console.",
            label,
            credentials_path.display()
        )));
    }

    yup_oauth2::read_application_secret(credentials_path)
        .await
        .map_err(|e| GatewayError::Auth(format!("Failed to read OAuth credentials: {}", e)))
}

async fn build_authenticator(
    label: &str,
    secret: yup_oauth2::ApplicationSecret,
    method: yup_oauth2::InstalledFlowReturnMethod,
    delegate: Option<Box<dyn InstalledFlowDelegate>>,
    token_cache_path: &Path,
) -> Result<GoogleAuthenticator, GatewayError> {
    let mut builder = yup_oauth2::InstalledFlowAuthenticator::builder(secret, method)
        .persist_tokens_to_disk(token_cache_path.to_path_buf());
    if let Some(delegate) = delegate {
        builder = builder.flow_delegate(delegate);
    }

    builder
        .build()
        .await
        .map_err(|e| GatewayError::Auth(format!("Failed to build {} authenticator: {}", label, e)))
}
