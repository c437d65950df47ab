//! Gmail API gateway: inbox listing and reply drafts.

use super::{https_client, DraftGateway, GoogleClient, MailGateway};
use crate::auth::{GoogleSession, GMAIL_SCOPES};
use crate::error::{from_gmail_error, with_timeout, GatewayError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use google_gmail1::api::{Draft, Message, MessagePart};
use google_gmail1::hyper_rustls::HttpsConnector;
use google_gmail1::Gmail;
use hyper_util::client::legacy::connect::HttpConnector;
use shared_types::{DraftEmail, Email};
use std::future::Future;
use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

type GmailHub = Gmail<HttpsConnector<HttpConnector>>;

/// Client for the Gmail API acting as the authenticated user
pub struct GmailGateway {
    session: Arc<GoogleSession>,
    client: GoogleClient,
    timeout: Duration,
}

impl GmailGateway {
    pub fn new(session: Arc<GoogleSession>, timeout: Duration) -> Result<Self, GatewayError> {
        Ok(Self {
            session,
            client: https_client()?,
            timeout,
        })
    }

    fn hub(&self) -> GmailHub {
        Gmail::new(self.client.clone(), self.session.authenticator())
    }

    /// Run one API operation under the timeout, refreshing the session
    /// token if the API rejected our credentials.
    async fn call<T, F, Fut>(&self, op: F) -> Result<T, GatewayError>
    where
        F: FnOnce(GmailHub) -> Fut,
        Fut: Future<Output = Result<T, GatewayError>>,
    {
        let hub = self.hub();
        let result = with_timeout(self.timeout, op(hub)).await;

        if let Err(err) = &result {
            if err.is_auth() {
                if let Err(refresh) = self.session.refresh(self.timeout).await {
                    tracing::error!(
                        session = self.session.label(),
                        error = %refresh,
                        "token_refresh_failed"
                    );
                }
            }
        }

        result
    }

    async fn list_message_ids(&self, query: &str) -> Result<Vec<String>, GatewayError> {
        self.call(|hub| async move {
            let mut ids = Vec::new();
            let mut page_token: Option<String> = None;

            loop {
                let mut request = hub
                    .users()
                    .messages_list("me")
                    .add_label_ids("INBOX")
                    .q(query)
                    .add_scopes(GMAIL_SCOPES.iter().copied());
                if let Some(token) = &page_token {
                    request = request.page_token(token);
                }

                let (_, response) = request.doit().await.map_err(from_gmail_error)?;

                ids.extend(
                    response
                        .messages
                        .unwrap_or_default()
                        .into_iter()
                        .filter_map(|m| m.id),
                );

                match response.next_page_token {
                    Some(token) if !token.is_empty() => page_token = Some(token),
                    _ => break,
                }
            }

            Ok(ids)
        })
        .await
    }

    async fn get_message(&self, message_id: &str) -> Result<Message, GatewayError> {
        self.call(|hub| async move {
            let (_, message) = hub
                .users()
                .messages_get("me", message_id)
                .format("full")
                .add_scopes(GMAIL_SCOPES.iter().copied())
                .doit()
                .await
                .map_err(from_gmail_error)?;
            Ok(message)
        })
        .await
    }
}

#[async_trait]
impl MailGateway for GmailGateway {
    async fn list_since(&self, since: DateTime<Utc>) -> Result<Vec<Email>, GatewayError> {
        let query = format!("after:{}", since.timestamp());
        let ids = self.list_message_ids(&query).await?;

        let mut messages = Vec::with_capacity(ids.len());
        for id in ids {
            match self.get_message(&id).await {
                Ok(message) => messages.push(message),
                Err(e) => {
                    tracing::warn!(message_id = %id, error = %e, "message_fetch_failed");
                }
            }
        }

        // Gmail lists newest first; process in arrival order
        messages.sort_by_key(|m| m.internal_date.unwrap_or_default());

        Ok(messages.into_iter().map(parse_message).collect())
    }
}

#[async_trait]
impl DraftGateway for GmailGateway {
    async fn create_draft(&self, draft: &DraftEmail) -> Result<String, GatewayError> {
        let raw = draft.to_rfc822().into_bytes();
        let mime_type: mime::Mime = "message/rfc822"
            .parse()
            .map_err(|e| GatewayError::InvalidInput(format!("bad mime type: {}", e)))?;

        let request = Draft {
            message: Some(Message {
                thread_id: draft.thread_id.clone(),
                ..Default::default()
            }),
            ..Default::default()
        };

        let created = self
            .call(|hub| async move {
                let (_, created) = hub
                    .users()
                    .drafts_create(request, "me")
                    .add_scopes(GMAIL_SCOPES.iter().copied())
                    .upload(Cursor::new(raw), mime_type)
                    .await
                    .map_err(from_gmail_error)?;
                Ok(created)
            })
            .await?;

        let draft_id = created.id.unwrap_or_default();
        tracing::info!(draft_id = %draft_id, to = %draft.to, subject = %draft.subject, "draft_created");
        Ok(draft_id)
    }
}

/// Convert an API message into an [`Email`]
pub fn parse_message(message: Message) -> Email {
    let mut subject = String::new();
    let mut sender = String::new();
    let mut date = String::new();

    if let Some(headers) = message.payload.as_ref().and_then(|p| p.headers.as_ref()) {
        for header in headers {
            let value = header.value.clone().unwrap_or_default();
            match header.name.as_deref() {
                Some(name) if name.eq_ignore_ascii_case("Subject") => subject = value,
                Some(name) if name.eq_ignore_ascii_case("From") => sender = value,
                Some(name) if name.eq_ignore_ascii_case("Date") => date = value,
                _ => {}
            }
        }
    }

    let body = message
        .payload
        .as_ref()
        .map(extract_plain_body)
        .unwrap_or_default();

    Email {
        id: message.id.unwrap_or_default(),
        thread_id: message.thread_id.unwrap_or_default(),
        subject,
        sender,
        date,
        body,
    }
}

/// Body text: the first `text/plain` part if the message has parts,
/// otherwise the top-level body.
fn extract_plain_body(payload: &MessagePart) -> String {
    match &payload.parts {
        Some(parts) if !parts.is_empty() => find_plain_part(parts).unwrap_or_default(),
        _ => part_data(payload).unwrap_or_default(),
    }
}

fn find_plain_part(parts: &[MessagePart]) -> Option<String> {
    for part in parts {
        match part.mime_type.as_deref() {
            Some("text/plain") => {
                if let Some(text) = part_data(part) {
                    return Some(text);
                }
            }
            Some(mime) if mime.starts_with("multipart/") => {
                if let Some(nested) = part.parts.as_deref().and_then(find_plain_part) {
                    return Some(nested);
                }
            }
            _ => {}
        }
    }
    None
}

/// Part payloads arrive base64url-encoded and are decoded during
/// deserialization; only the UTF-8 conversion remains.
fn part_data(part: &MessagePart) -> Option<String> {
    part.body
        .as_ref()
        .and_then(|body| body.data.as_ref())
        .map(|data| String::from_utf8_lossy(data).into_owned())
}
