//! Read/write primitives over the external mail and calendar systems.

use crate::error::GatewayError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use google_gmail1::hyper_rustls::HttpsConnector;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use shared_types::{CalendarEvent, DraftEmail, Email, EventPatch, NewCalendarEvent};

pub mod calendar;
pub mod gmail;

pub use calendar::GoogleCalendarGateway;
pub use gmail::GmailGateway;

/// HTTP client shared by every hub one gateway builds
pub(crate) type GoogleClient = google_gmail1::common::Client<HttpsConnector<HttpConnector>>;

/// HTTPS client a gateway builds once in `new` and reuses for every hub
pub(crate) fn https_client() -> Result<GoogleClient, GatewayError> {
    let connector = google_gmail1::hyper_rustls::HttpsConnectorBuilder::new()
        .with_native_roots()
        .map_err(|e| GatewayError::Transport(format!("Failed to load native TLS roots: {}", e)))?
        .https_or_http()
        .enable_http1()
        .build();

    Ok(Client::builder(TokioExecutor::new()).build(connector))
}

#[async_trait]
pub trait MailGateway: Send + Sync {
    /// Inbox messages received after `since`
    async fn list_since(&self, since: DateTime<Utc>) -> Result<Vec<Email>, GatewayError>;
}

#[async_trait]
pub trait DraftGateway: Send + Sync {
    /// Store a draft and return its id
    async fn create_draft(&self, draft: &DraftEmail) -> Result<String, GatewayError>;
}

/// Time-window query over one calendar
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventQuery {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub max_results: u32,
    pub time_zone: String,
}

#[async_trait]
pub trait CalendarGateway: Send + Sync {
    /// Events in the window, ordered by start time
    async fn list_events(&self, query: &EventQuery) -> Result<Vec<CalendarEvent>, GatewayError>;

    async fn get_event(&self, event_id: &str) -> Result<CalendarEvent, GatewayError>;

    async fn create_event(&self, event: &NewCalendarEvent) -> Result<CalendarEvent, GatewayError>;

    /// Overlay `patch` on the stored event and write the whole event back
    async fn update_event(
        &self,
        event_id: &str,
        patch: &EventPatch,
    ) -> Result<CalendarEvent, GatewayError>;

    async fn delete_event(&self, event_id: &str) -> Result<(), GatewayError>;
}
