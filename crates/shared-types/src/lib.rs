use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

mod draft;
mod time;

pub use draft::DraftEmail;
pub use time::{parse_timestamp, TimeWindow};

/// Email fetched from the inbox during one poll cycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Email {
    pub id: String,
    pub thread_id: String,
    pub subject: String,
    pub sender: String,
    pub date: String, // raw Date header
    pub body: String,
}

/// Start or end of a calendar event.
///
/// Timed events carry `date_time`; all-day events carry only `date`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventTime {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_zone: Option<String>,
}

impl EventTime {
    pub fn at(instant: DateTime<Utc>, time_zone: impl Into<String>) -> Self {
        Self {
            date_time: Some(instant),
            date: None,
            time_zone: Some(time_zone.into()),
        }
    }

    /// The instant this time refers to. All-day dates resolve to midnight UTC.
    pub fn instant(&self) -> Option<DateTime<Utc>> {
        self.date_time.or_else(|| {
            self.date
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(|naive| naive.and_utc())
        })
    }
}

/// Calendar event as stored by the calendar backend
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarEvent {
    pub id: String,
    pub summary: String,
    pub start: EventTime,
    pub end: EventTime,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attendees: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub recurrence: Vec<String>,
}

impl CalendarEvent {
    /// UTC interval covered by the event, if both ends are known.
    pub fn interval(&self) -> Option<TimeWindow> {
        let start = self.start.instant()?;
        let end = self.end.instant()?;
        Some(TimeWindow::new(start, end.max(start)))
    }
}

/// Event to be inserted into the calendar
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCalendarEvent {
    pub summary: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub time_zone: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub attendees: Vec<String>,
    pub recurrence: Vec<String>,
}

impl NewCalendarEvent {
    pub fn window(&self) -> TimeWindow {
        TimeWindow::new(self.start, self.end.max(self.start))
    }
}

/// Partial update of an existing event. `None` and empty values leave the
/// stored field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventPatch {
    pub summary: Option<String>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub time_zone: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub attendees: Option<Vec<String>>,
    pub recurrence: Option<Vec<String>>,
}

impl EventPatch {
    pub fn is_empty(&self) -> bool {
        blank(&self.summary)
            && self.start.is_none()
            && self.end.is_none()
            && blank(&self.description)
            && blank(&self.location)
            && self.attendees.as_ref().map_or(true, Vec::is_empty)
            && self.recurrence.as_ref().map_or(true, Vec::is_empty)
    }

    /// Overlay the non-empty fields of this patch onto `event`.
    pub fn apply_to(&self, event: &mut CalendarEvent) {
        if let Some(summary) = non_blank(&self.summary) {
            event.summary = summary.to_string();
        }
        if let Some(description) = non_blank(&self.description) {
            event.description = Some(description.to_string());
        }
        if let Some(location) = non_blank(&self.location) {
            event.location = Some(location.to_string());
        }
        if let Some(attendees) = self.attendees.as_ref().filter(|a| !a.is_empty()) {
            event.attendees = attendees.clone();
        }
        if let Some(recurrence) = self.recurrence.as_ref().filter(|r| !r.is_empty()) {
            event.recurrence = recurrence.clone();
        }
        if let Some(start) = self.start {
            event.start = EventTime::at(start, self.zone_or(&event.start));
        }
        if let Some(end) = self.end {
            event.end = EventTime::at(end, self.zone_or(&event.end));
        }
    }

    fn zone_or(&self, existing: &EventTime) -> String {
        self.time_zone
            .clone()
            .or_else(|| existing.time_zone.clone())
            .unwrap_or_else(|| "UTC".to_string())
    }
}

/// One capability call selected by the decision loop, with its outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionInvocation {
    pub capability: String,
    pub arguments: serde_json::Value,
    pub result: String,
    pub success: bool,
    pub step: u32,
}

fn blank(value: &Option<String>) -> bool {
    non_blank(value).is_none()
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}
