//! Calendar capabilities: query, create, update and delete events.

use super::{
    non_blank, parse_args, Capability, CapabilityResult, Observation, CREATE_CALENDAR_EVENT,
    DELETE_CALENDAR_EVENT, GET_CALENDAR_EVENTS, UPDATE_CALENDAR_EVENT,
};
use crate::gateways::{CalendarGateway, EventQuery};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::Deserialize;
use serde_json::{json, Value};
use shared_types::{parse_timestamp, EventPatch, NewCalendarEvent, TimeWindow};
use std::sync::Arc;

pub const DEFAULT_MAX_RESULTS: u32 = 50;
pub const MAX_RESULTS_LIMIT: u32 = 250;

const TIMESTAMP_HINT: &str =
    "ISO-8601, e.g. 2025-03-05T15:00:00+05:30; without an offset it is read in `timezone`";

/// Resolve the caller's timezone argument, falling back to the configured zone.
fn resolve_zone(requested: Option<String>, default_zone: Tz) -> Result<Tz, String> {
    match non_blank(requested) {
        Some(name) => name
            .parse::<Tz>()
            .map_err(|_| format!("unknown timezone '{}'", name)),
        None => Ok(default_zone),
    }
}

fn timestamp(field: &str, value: &str, zone: Tz) -> Result<DateTime<Utc>, String> {
    parse_timestamp(value, zone).map_err(|e| format!("{}: {}", field, e))
}

fn clamp_max_results(requested: Option<f64>) -> u32 {
    match requested {
        Some(n) if n.is_finite() => (n.round() as i64).clamp(1, MAX_RESULTS_LIMIT as i64) as u32,
        _ => DEFAULT_MAX_RESULTS,
    }
}

fn zone_property() -> Value {
    json!({
        "type": "string",
        "description": "IANA timezone for the times, e.g. Asia/Kolkata. Defaults to the user's timezone."
    })
}

fn string_list(description: &str) -> Value {
    json!({
        "type": "array",
        "items": { "type": "string" },
        "description": description
    })
}

#[derive(Debug, Deserialize)]
struct GetEventsArgs {
    start_time: String,
    end_time: String,
    #[serde(default)]
    max_results: Option<f64>,
    #[serde(default)]
    timezone: Option<String>,
}

/// Lists events in a time window
pub struct GetEventsCapability {
    calendar: Arc<dyn CalendarGateway>,
    default_zone: Tz,
}

impl GetEventsCapability {
    pub fn new(calendar: Arc<dyn CalendarGateway>, default_zone: Tz) -> Self {
        Self {
            calendar,
            default_zone,
        }
    }

    async fn fetch(&self, args: GetEventsArgs) -> Result<CapabilityResult, String> {
        let zone = resolve_zone(args.timezone, self.default_zone)?;
        let start = timestamp("start_time", &args.start_time, zone)?;
        let end = timestamp("end_time", &args.end_time, zone)?;
        if end <= start {
            return Err("end_time must be after start_time".to_string());
        }

        let max_results = clamp_max_results(args.max_results);
        let query = EventQuery {
            start,
            end,
            max_results,
            time_zone: zone.name().to_string(),
        };
        let events = self.calendar.list_events(&query).await.map_err(|e| {
            tracing::error!(error = %e, "calendar_events_fetch_error");
            e.to_string()
        })?;

        let complete = events.len() < max_results as usize;
        tracing::info!(
            count = events.len(),
            start = %start,
            end = %end,
            complete,
            "calendar_events_fetched"
        );

        let output = serde_json::to_string(&events).map_err(|e| e.to_string())?;
        Ok(CapabilityResult::success(
            output,
            Observation::Window {
                window: TimeWindow::new(start, end),
                events,
                max_results,
                complete,
            },
        ))
    }
}

#[async_trait]
impl Capability for GetEventsCapability {
    fn name(&self) -> &str {
        GET_CALENDAR_EVENTS
    }

    fn description(&self) -> &str {
        "List calendar events overlapping a time window, ordered by start time. Returns a \
         JSON array of events (empty when none). Must be called for the relevant window \
         before creating an event. A listing that returns max_results events may be \
         incomplete."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "start_time": {
                    "type": "string",
                    "description": format!("Window start, {}", TIMESTAMP_HINT)
                },
                "end_time": {
                    "type": "string",
                    "description": format!("Window end, {}", TIMESTAMP_HINT)
                },
                "max_results": {
                    "type": "integer",
                    "description": "Maximum number of events to return (1-250, 50 if omitted)"
                },
                "timezone": zone_property()
            },
            "required": ["start_time", "end_time"]
        })
    }

    async fn invoke(&self, args: Value) -> CapabilityResult {
        const ACTION: &str = "fetching calendar events";
        let args = match parse_args::<GetEventsArgs>(args, ACTION) {
            Ok(args) => args,
            Err(failure) => return failure,
        };
        self.fetch(args)
            .await
            .unwrap_or_else(|reason| CapabilityResult::failure(format!("Error {}: {}", ACTION, reason)))
    }
}

#[derive(Debug, Deserialize)]
struct CreateEventArgs {
    summary: String,
    start_time: String,
    end_time: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    location: Option<String>,
    #[serde(default)]
    attendees: Option<Vec<String>>,
    #[serde(default)]
    recurrence: Option<Vec<String>>,
    #[serde(default)]
    timezone: Option<String>,
}

/// Inserts a new event
pub struct CreateEventCapability {
    calendar: Arc<dyn CalendarGateway>,
    default_zone: Tz,
}

impl CreateEventCapability {
    pub fn new(calendar: Arc<dyn CalendarGateway>, default_zone: Tz) -> Self {
        Self {
            calendar,
            default_zone,
        }
    }
}

/// Validate `create_calendar_event` arguments into the event that would be
/// inserted. Naive times are read in the requested zone, else `default_zone`.
pub fn prepare_new_event(args: Value, default_zone: Tz) -> Result<NewCalendarEvent, String> {
    let args: CreateEventArgs =
        serde_json::from_value(args).map_err(|e| format!("invalid arguments: {}", e))?;
    let zone = resolve_zone(args.timezone, default_zone)?;

    let summary = args.summary.trim().to_string();
    if summary.is_empty() {
        return Err("summary is empty".to_string());
    }

    Ok(NewCalendarEvent {
        summary,
        start: timestamp("start_time", &args.start_time, zone)?,
        end: timestamp("end_time", &args.end_time, zone)?,
        time_zone: zone.name().to_string(),
        description: non_blank(args.description),
        location: non_blank(args.location),
        attendees: clean_list(args.attendees),
        recurrence: clean_list(args.recurrence),
    })
}

#[async_trait]
impl Capability for CreateEventCapability {
    fn name(&self) -> &str {
        CREATE_CALENDAR_EVENT
    }

    fn description(&self) -> &str {
        "Create a new calendar event. Only allowed after get_calendar_events has been called \
         for a window covering the event and found no equivalent event."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "summary": { "type": "string", "description": "Title of the event" },
                "start_time": {
                    "type": "string",
                    "description": format!("Start time, {}", TIMESTAMP_HINT)
                },
                "end_time": {
                    "type": "string",
                    "description": format!("End time, {}", TIMESTAMP_HINT)
                },
                "description": { "type": "string", "description": "Description of the event" },
                "location": { "type": "string", "description": "Location of the event" },
                "attendees": string_list("Attendee email addresses"),
                "recurrence": string_list("Recurrence rules, e.g. RRULE:FREQ=WEEKLY;COUNT=4"),
                "timezone": zone_property()
            },
            "required": ["summary", "start_time", "end_time"]
        })
    }

    async fn invoke(&self, args: Value) -> CapabilityResult {
        const ACTION: &str = "creating calendar event";
        let event = match prepare_new_event(args, self.default_zone) {
            Ok(event) => event,
            Err(reason) => return CapabilityResult::failure(format!("Error {}: {}", ACTION, reason)),
        };

        match self.calendar.create_event(&event).await {
            Ok(created) => CapabilityResult::success("event created", Observation::Created(created)),
            Err(e) => {
                tracing::error!(error = %e, summary = %event.summary, "calendar_event_creation_error");
                CapabilityResult::failure(format!("Error {}: {}", ACTION, e))
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct UpdateEventArgs {
    event_id: String,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    start_time: Option<String>,
    #[serde(default)]
    end_time: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    location: Option<String>,
    #[serde(default)]
    attendees: Option<Vec<String>>,
    #[serde(default)]
    recurrence: Option<Vec<String>>,
    #[serde(default)]
    timezone: Option<String>,
}

/// Overlays the given fields on an existing event
pub struct UpdateEventCapability {
    calendar: Arc<dyn CalendarGateway>,
    default_zone: Tz,
}

impl UpdateEventCapability {
    pub fn new(calendar: Arc<dyn CalendarGateway>, default_zone: Tz) -> Self {
        Self {
            calendar,
            default_zone,
        }
    }

    async fn update(&self, args: UpdateEventArgs) -> Result<CapabilityResult, String> {
        let event_id = args.event_id.trim().to_string();
        if event_id.is_empty() {
            return Err("event_id is empty".to_string());
        }
        let zone = resolve_zone(args.timezone, self.default_zone)?;

        let parse = |field: &str, value: Option<String>| {
            non_blank(value)
                .map(|v| timestamp(field, &v, zone))
                .transpose()
        };

        let patch = EventPatch {
            summary: args.summary,
            start: parse("start_time", args.start_time)?,
            end: parse("end_time", args.end_time)?,
            time_zone: Some(zone.name().to_string()),
            description: args.description,
            location: args.location,
            attendees: args.attendees.map(|a| clean_list(Some(a))),
            recurrence: args.recurrence.map(|r| clean_list(Some(r))),
        };
        if patch.is_empty() {
            return Err("no fields to update".to_string());
        }

        let updated = self
            .calendar
            .update_event(&event_id, &patch)
            .await
            .map_err(|e| {
                tracing::error!(event_id = %event_id, error = %e, "calendar_event_update_error");
                e.to_string()
            })?;

        Ok(CapabilityResult::success("event updated", Observation::Updated(updated)))
    }
}

#[async_trait]
impl Capability for UpdateEventCapability {
    fn name(&self) -> &str {
        UPDATE_CALENDAR_EVENT
    }

    fn description(&self) -> &str {
        "Update an existing calendar event. Only the fields provided are changed; \
         everything else is kept."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "event_id": { "type": "string", "description": "Id of the event to update" },
                "summary": { "type": "string", "description": "New title" },
                "start_time": {
                    "type": "string",
                    "description": format!("New start time, {}", TIMESTAMP_HINT)
                },
                "end_time": {
                    "type": "string",
                    "description": format!("New end time, {}", TIMESTAMP_HINT)
                },
                "description": { "type": "string", "description": "New description" },
                "location": { "type": "string", "description": "New location" },
                "attendees": string_list("New list of attendee email addresses"),
                "recurrence": string_list("New recurrence rules"),
                "timezone": zone_property()
            },
            "required": ["event_id"]
        })
    }

    async fn invoke(&self, args: Value) -> CapabilityResult {
        const ACTION: &str = "updating calendar event";
        let args = match parse_args::<UpdateEventArgs>(args, ACTION) {
            Ok(args) => args,
            Err(failure) => return failure,
        };
        self.update(args)
            .await
            .unwrap_or_else(|reason| CapabilityResult::failure(format!("Error {}: {}", ACTION, reason)))
    }
}

#[derive(Debug, Deserialize)]
struct DeleteEventArgs {
    event_id: String,
}

/// Removes an event. Deleting an absent event reports an error.
pub struct DeleteEventCapability {
    calendar: Arc<dyn CalendarGateway>,
}

impl DeleteEventCapability {
    pub fn new(calendar: Arc<dyn CalendarGateway>) -> Self {
        Self { calendar }
    }
}

#[async_trait]
impl Capability for DeleteEventCapability {
    fn name(&self) -> &str {
        DELETE_CALENDAR_EVENT
    }

    fn description(&self) -> &str {
        "Delete a calendar event, e.g. when the email cancels a meeting."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "event_id": { "type": "string", "description": "Id of the event to delete" }
            },
            "required": ["event_id"]
        })
    }

    async fn invoke(&self, args: Value) -> CapabilityResult {
        const ACTION: &str = "deleting calendar event";
        let args = match parse_args::<DeleteEventArgs>(args, ACTION) {
            Ok(args) => args,
            Err(failure) => return failure,
        };
        let event_id = args.event_id.trim();
        if event_id.is_empty() {
            return CapabilityResult::failure(format!("Error {}: event_id is empty", ACTION));
        }

        match self.calendar.delete_event(event_id).await {
            Ok(()) => CapabilityResult::success(
                "event deleted",
                Observation::Deleted(event_id.to_string()),
            ),
            Err(e) => {
                tracing::error!(event_id = %event_id, error = %e, "calendar_event_deletion_error");
                CapabilityResult::failure(format!("Error {}: {}", ACTION, e))
            }
        }
    }
}

fn clean_list(values: Option<Vec<String>>) -> Vec<String> {
    values
        .unwrap_or_default()
        .into_iter()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::test_support::MemoryCalendar;
    use chrono::TimeZone;
    use shared_types::{CalendarEvent, EventTime};

    const IST: Tz = chrono_tz::Asia::Kolkata;

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    fn existing() -> CalendarEvent {
        CalendarEvent {
            id: "evt-sync".to_string(),
            summary: "Project sync".to_string(),
            start: EventTime::at(utc(2025, 3, 5, 9, 30), "Asia/Kolkata"),
            end: EventTime::at(utc(2025, 3, 5, 10, 30), "Asia/Kolkata"),
            location: Some("Room 4".to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_get_events_renders_json_array() {
        let calendar = Arc::new(MemoryCalendar::with_events(vec![existing()]));
        let capability = GetEventsCapability::new(calendar.clone(), IST);

        let result = capability
            .invoke(json!({
                "start_time": "2025-03-05T00:00:00",
                "end_time": "2025-03-05T23:59:59"
            }))
            .await;

        assert!(result.success);
        let parsed: Vec<CalendarEvent> = serde_json::from_str(&result.output).unwrap();
        assert_eq!(parsed, vec![existing()]);

        let queries = calendar.queries.lock().unwrap();
        assert_eq!(queries[0].max_results, DEFAULT_MAX_RESULTS);
        assert_eq!(queries[0].time_zone, "Asia/Kolkata");
        // naive times are local to the default zone
        assert_eq!(queries[0].start, utc(2025, 3, 4, 18, 30));
    }

    #[tokio::test]
    async fn test_get_events_empty_window() {
        let capability = GetEventsCapability::new(Arc::new(MemoryCalendar::default()), IST);
        let result = capability
            .invoke(json!({
                "start_time": "2025-03-06T00:00:00Z",
                "end_time": "2025-03-07T00:00:00Z",
                "max_results": 5000
            }))
            .await;
        assert!(result.success);
        assert_eq!(result.output, "[]");
        match result.observation {
            Some(Observation::Window {
                window,
                events,
                max_results,
                complete,
            }) => {
                assert!(events.is_empty());
                assert_eq!(window.start, utc(2025, 3, 6, 0, 0));
                assert_eq!(max_results, MAX_RESULTS_LIMIT);
                assert!(complete);
            }
            other => panic!("unexpected observation: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_get_events_flags_listing_cut_at_max_results() {
        let calendar = Arc::new(MemoryCalendar::with_events(vec![existing()]));
        let capability = GetEventsCapability::new(calendar, IST);

        let result = capability
            .invoke(json!({
                "start_time": "2025-03-05T00:00:00",
                "end_time": "2025-03-05T23:59:59",
                "max_results": 1
            }))
            .await;

        assert!(result.success);
        assert!(matches!(
            result.observation,
            Some(Observation::Window {
                max_results: 1,
                complete: false,
                ..
            })
        ));
    }

    #[test]
    fn test_max_results_clamped() {
        assert_eq!(clamp_max_results(None), 50);
        assert_eq!(clamp_max_results(Some(0.0)), 1);
        assert_eq!(clamp_max_results(Some(10.0)), 10);
        assert_eq!(clamp_max_results(Some(1e9)), 250);
        assert_eq!(clamp_max_results(Some(f64::NAN)), 50);
    }

    #[tokio::test]
    async fn test_get_events_rejects_inverted_window() {
        let capability = GetEventsCapability::new(Arc::new(MemoryCalendar::default()), IST);
        let result = capability
            .invoke(json!({"start_time": "2025-03-06", "end_time": "2025-03-05"}))
            .await;
        assert!(!result.success);
        assert_eq!(
            result.output,
            "Error fetching calendar events: end_time must be after start_time"
        );
    }

    #[tokio::test]
    async fn test_create_event_uses_default_zone() {
        let calendar = Arc::new(MemoryCalendar::default());
        let capability = CreateEventCapability::new(calendar.clone(), IST);

        let result = capability
            .invoke(json!({
                "summary": "Project sync",
                "start_time": "2025-03-06T15:00:00",
                "end_time": "2025-03-06T16:00:00",
                "location": "",
                "attendees": ["jane@example.com", " "]
            }))
            .await;

        assert!(result.success);
        assert_eq!(result.output, "event created");
        let created = calendar.created.lock().unwrap();
        assert_eq!(created[0].start, utc(2025, 3, 6, 9, 30));
        assert_eq!(created[0].end, utc(2025, 3, 6, 10, 30));
        assert_eq!(created[0].time_zone, "Asia/Kolkata");
        assert!(created[0].location.is_none());
        assert_eq!(created[0].attendees, vec!["jane@example.com".to_string()]);
    }

    #[tokio::test]
    async fn test_create_event_rejects_bad_timezone() {
        let calendar = Arc::new(MemoryCalendar::default());
        let capability = CreateEventCapability::new(calendar.clone(), IST);
        let result = capability
            .invoke(json!({
                "summary": "Standup",
                "start_time": "2025-03-06T15:00:00",
                "end_time": "2025-03-06T16:00:00",
                "timezone": "Mars/Olympus"
            }))
            .await;
        assert_eq!(
            result.output,
            "Error creating calendar event: unknown timezone 'Mars/Olympus'"
        );
        assert!(calendar.created.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_preserves_omitted_fields() {
        let calendar = Arc::new(MemoryCalendar::with_events(vec![existing()]));
        let capability = UpdateEventCapability::new(calendar.clone(), IST);

        let result = capability
            .invoke(json!({
                "event_id": "evt-sync",
                "start_time": "2025-03-05T16:00:00+05:30",
                "end_time": "2025-03-05T17:00:00+05:30"
            }))
            .await;

        assert!(result.success);
        assert_eq!(result.output, "event updated");
        let stored = calendar.get_event("evt-sync").await.unwrap();
        assert_eq!(stored.summary, "Project sync");
        assert_eq!(stored.location.as_deref(), Some("Room 4"));
        assert_eq!(stored.start.date_time, Some(utc(2025, 3, 5, 10, 30)));
    }

    #[tokio::test]
    async fn test_update_without_fields_rejected() {
        let capability =
            UpdateEventCapability::new(Arc::new(MemoryCalendar::with_events(vec![existing()])), IST);
        let result = capability
            .invoke(json!({"event_id": "evt-sync", "summary": ""}))
            .await;
        assert_eq!(result.output, "Error updating calendar event: no fields to update");
    }

    #[tokio::test]
    async fn test_update_unknown_event() {
        let capability = UpdateEventCapability::new(Arc::new(MemoryCalendar::default()), IST);
        let result = capability
            .invoke(json!({"event_id": "missing", "summary": "New"}))
            .await;
        assert!(!result.success);
        assert!(result.output.starts_with("Error updating calendar event: not found"));
    }

    #[tokio::test]
    async fn test_second_delete_is_error_string() {
        let calendar = Arc::new(MemoryCalendar::with_events(vec![existing()]));
        let capability = DeleteEventCapability::new(calendar);

        let first = capability.invoke(json!({"event_id": "evt-sync"})).await;
        assert!(first.success);
        assert_eq!(first.output, "event deleted");
        assert_eq!(first.observation, Some(Observation::Deleted("evt-sync".to_string())));

        let second = capability.invoke(json!({"event_id": "evt-sync"})).await;
        assert!(!second.success);
        assert!(second.output.starts_with("Error deleting calendar event:"));
    }
}
