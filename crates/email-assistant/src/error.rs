//! Error taxonomy for the external gateways.
//!
//! Gateway failures never cross the capability boundary as errors: the
//! toolset renders them into prose for the decision loop. The variants exist
//! so the gateways can react (re-authenticate on `Auth`) and so the prose
//! says something useful.

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    /// Missing, expired or rejected credentials
    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("rate limited by the API: {0}")]
    RateLimited(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    /// Connection, TLS or decoding failure
    #[error("transport error: {0}")]
    Transport(String),

    #[error("request timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

/// `errors[].reason` values Google sends with 403 when a quota ran out
const RATE_LIMIT_REASONS: &[&str] = &[
    "rateLimitExceeded",
    "userRateLimitExceeded",
    "quotaExceeded",
    "dailyLimitExceeded",
];

impl GatewayError {
    /// Classify an HTTP status returned by a Google API
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        Self::from_response(status, None, message)
    }

    /// Classify by status and the first `errors[].reason`, if the body had
    /// one. Only 401 means the credentials were rejected; a 403 is a quota
    /// or permission problem that a token refresh cannot fix.
    pub fn from_response(status: u16, reason: Option<&str>, message: impl Into<String>) -> Self {
        let message = message.into();
        if reason.is_some_and(|r| RATE_LIMIT_REASONS.contains(&r)) {
            return GatewayError::RateLimited(message);
        }
        match status {
            401 => GatewayError::Auth(message),
            404 | 410 => GatewayError::NotFound(message),
            429 => GatewayError::RateLimited(message),
            _ => GatewayError::Api { status, message },
        }
    }

    pub fn is_auth(&self) -> bool {
        matches!(self, GatewayError::Auth(_))
    }
}

/// Generates a classifier for the `Error` type re-exported by a generated
/// Google API crate.
macro_rules! google_error_classifier {
    ($name:ident, $krate:ident) => {
        pub(crate) fn $name(err: $krate::Error) -> GatewayError {
            match err {
                $krate::Error::Failure(response) => {
                    let status = response.status();
                    GatewayError::from_status(
                        status.as_u16(),
                        status.canonical_reason().unwrap_or("request failed"),
                    )
                }
                $krate::Error::BadRequest(value) => classify_body(&value),
                $krate::Error::MissingToken(e) => GatewayError::Auth(e.to_string()),
                $krate::Error::MissingAPIKey => {
                    GatewayError::Auth("no API key or token available".to_string())
                }
                other => GatewayError::Transport(other.to_string()),
            }
        }
    };
}

/// Classify the JSON error body Google returns with a failed request
fn classify_body(value: &serde_json::Value) -> GatewayError {
    let error = &value["error"];
    let status = error["code"].as_u64().unwrap_or(400) as u16;
    let reason = error["errors"][0]["reason"].as_str();
    let message = error["message"]
        .as_str()
        .map(str::to_string)
        .unwrap_or_else(|| value.to_string());
    GatewayError::from_response(status, reason, message)
}

google_error_classifier!(from_gmail_error, google_gmail1);
google_error_classifier!(from_calendar_error, google_calendar3);

/// Bound an external call by `limit`, mapping expiry to [`GatewayError::Timeout`].
pub async fn with_timeout<T, F>(limit: Duration, call: F) -> Result<T, GatewayError>
where
    F: std::future::Future<Output = Result<T, GatewayError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(GatewayError::Timeout(limit)),
    }
}
