use super::{https_client, CalendarGateway, EventQuery, GoogleClient};
use crate::auth::{GoogleSession, CALENDAR_SCOPES};
use crate::error::{from_calendar_error, with_timeout, GatewayError};
use async_trait::async_trait;
use google_calendar3::api::{Event, EventAttendee, EventDateTime};
use google_calendar3::hyper_rustls::HttpsConnector;
use google_calendar3::CalendarHub;
use hyper_util::client::legacy::connect::HttpConnector;
use shared_types::{CalendarEvent, EventPatch, EventTime, NewCalendarEvent};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

type Hub = CalendarHub<HttpsConnector<HttpConnector>>;

/// Client for one Google Calendar
pub struct GoogleCalendarGateway {
    session: Arc<GoogleSession>,
    client: GoogleClient,
    calendar_id: String,
    timeout: Duration,
}

impl GoogleCalendarGateway {
    pub fn new(
        session: Arc<GoogleSession>,
        calendar_id: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, GatewayError> {
        Ok(Self {
            session,
            client: https_client()?,
            calendar_id: calendar_id.into(),
            timeout,
        })
    }

    fn hub(&self) -> Hub {
        CalendarHub::new(self.client.clone(), self.session.authenticator())
    }

    async fn call<T, F, Fut>(&self, op: F) -> Result<T, GatewayError>
    where
        F: FnOnce(Hub) -> Fut,
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

    async fn fetch_raw(&self, event_id: &str) -> Result<Event, GatewayError> {
        let calendar_id = self.calendar_id.as_str();
        self.call(|hub| async move {
            let (_, event) = hub
                .events()
                .get(calendar_id, event_id)
                .add_scopes(CALENDAR_SCOPES.iter().copied())
                .doit()
                .await
                .map_err(from_calendar_error)?;
            Ok(event)
        })
        .await
    }
}

#[async_trait]
impl CalendarGateway for GoogleCalendarGateway {
    async fn list_events(&self, query: &EventQuery) -> Result<Vec<CalendarEvent>, GatewayError> {
        let calendar_id = self.calendar_id.as_str();
        let max_results = i32::try_from(query.max_results).unwrap_or(i32::MAX);

        let items = self
            .call(|hub| async move {
                let (_, events) = hub
                    .events()
                    .list(calendar_id)
                    .time_min(query.start)
                    .time_max(query.end)
                    .max_results(max_results)
                    .single_events(true)
                    .order_by("startTime")
                    .time_zone(&query.time_zone)
                    .add_scopes(CALENDAR_SCOPES.iter().copied())
                    .doit()
                    .await
                    .map_err(from_calendar_error)?;
                Ok(events.items.unwrap_or_default())
            })
            .await?;

        let mut events: Vec<CalendarEvent> = items.into_iter().map(to_calendar_event).collect();
        events.sort_by_key(|e| e.start.instant());
        Ok(events)
    }

    async fn get_event(&self, event_id: &str) -> Result<CalendarEvent, GatewayError> {
        self.fetch_raw(event_id).await.map(to_calendar_event)
    }

    async fn create_event(&self, event: &NewCalendarEvent) -> Result<CalendarEvent, GatewayError> {
        let calendar_id = self.calendar_id.as_str();
        let body = to_google_event(event);

        let created = self
            .call(|hub| async move {
                let (_, created) = hub
                    .events()
                    .insert(body, calendar_id)
                    .add_scopes(CALENDAR_SCOPES.iter().copied())
                    .doit()
                    .await
                    .map_err(from_calendar_error)?;
                Ok(created)
            })
            .await?;

        let created = to_calendar_event(created);
        tracing::info!(event_id = %created.id, summary = %created.summary, "calendar_event_created");
        Ok(created)
    }

    async fn update_event(
        &self,
        event_id: &str,
        patch: &EventPatch,
    ) -> Result<CalendarEvent, GatewayError> {
        let mut event = self.fetch_raw(event_id).await?;
        apply_patch(&mut event, patch);

        let calendar_id = self.calendar_id.as_str();
        let updated = self
            .call(|hub| async move {
                let (_, updated) = hub
                    .events()
                    .update(event, calendar_id, event_id)
                    .add_scopes(CALENDAR_SCOPES.iter().copied())
                    .doit()
                    .await
                    .map_err(from_calendar_error)?;
                Ok(updated)
            })
            .await?;

        tracing::info!(event_id = %event_id, "calendar_event_updated");
        Ok(to_calendar_event(updated))
    }

    async fn delete_event(&self, event_id: &str) -> Result<(), GatewayError> {
        let calendar_id = self.calendar_id.as_str();
        self.call(|hub| async move {
            hub.events()
                .delete(calendar_id, event_id)
                .add_scopes(CALENDAR_SCOPES.iter().copied())
                .doit()
                .await
                .map_err(from_calendar_error)?;
            Ok(())
        })
        .await?;

        tracing::info!(event_id = %event_id, "calendar_event_deleted");
        Ok(())
    }
}

fn to_calendar_event(event: Event) -> CalendarEvent {
    CalendarEvent {
        id: event.id.unwrap_or_default(),
        summary: event.summary.unwrap_or_default(),
        start: event.start.map(to_event_time).unwrap_or_default(),
        end: event.end.map(to_event_time).unwrap_or_default(),
        description: event.description,
        location: event.location,
        attendees: event
            .attendees
            .unwrap_or_default()
            .into_iter()
            .filter_map(|a| a.email)
            .collect(),
        recurrence: event.recurrence.unwrap_or_default(),
    }
}

fn to_event_time(time: EventDateTime) -> EventTime {
    EventTime {
        date_time: time.date_time,
        date: time.date,
        time_zone: time.time_zone,
    }
}

fn google_time(instant: chrono::DateTime<chrono::Utc>, time_zone: &str) -> EventDateTime {
    EventDateTime {
        date_time: Some(instant),
        time_zone: Some(time_zone.to_string()),
        ..Default::default()
    }
}

fn google_attendees(emails: &[String]) -> Vec<EventAttendee> {
    emails
        .iter()
        .map(|email| EventAttendee {
            email: Some(email.clone()),
            ..Default::default()
        })
        .collect()
}

fn to_google_event(event: &NewCalendarEvent) -> Event {
    Event {
        summary: Some(event.summary.clone()),
        description: event.description.clone().filter(|d| !d.trim().is_empty()),
        location: event.location.clone().filter(|l| !l.trim().is_empty()),
        start: Some(google_time(event.start, &event.time_zone)),
        end: Some(google_time(event.end, &event.time_zone)),
        attendees: (!event.attendees.is_empty()).then(|| google_attendees(&event.attendees)),
        recurrence: (!event.recurrence.is_empty()).then(|| event.recurrence.clone()),
        ..Default::default()
    }
}

/// Overlay the non-empty fields of `patch` onto the full remote event.
/// Everything else the server returned is written back unchanged.
fn apply_patch(event: &mut Event, patch: &EventPatch) {
    let present = |value: &Option<String>| {
        value
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    if let Some(summary) = present(&patch.summary) {
        event.summary = Some(summary);
    }
    if let Some(description) = present(&patch.description) {
        event.description = Some(description);
    }
    if let Some(location) = present(&patch.location) {
        event.location = Some(location);
    }
    if let Some(attendees) = patch.attendees.as_ref().filter(|a| !a.is_empty()) {
        event.attendees = Some(google_attendees(attendees));
    }
    if let Some(recurrence) = patch.recurrence.as_ref().filter(|r| !r.is_empty()) {
        event.recurrence = Some(recurrence.clone());
    }

    let zone_for = |existing: &Option<EventDateTime>| {
        patch
            .time_zone
            .clone()
            .or_else(|| existing.as_ref().and_then(|t| t.time_zone.clone()))
            .unwrap_or_else(|| "UTC".to_string())
    };
    if let Some(start) = patch.start {
        event.start = Some(google_time(start, &zone_for(&event.start)));
    }
    if let Some(end) = patch.end {
        event.end = Some(google_time(end, &zone_for(&event.end)));
    }
}
