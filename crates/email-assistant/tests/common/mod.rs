#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use email_assistant::agent::{
    ActionCall, Decision, DecisionLoop, DecisionOracle, OracleError, OracleRequest, Part, Turn,
};
use email_assistant::config::AssistantMode;
use email_assistant::error::GatewayError;
use email_assistant::gateways::{CalendarGateway, DraftGateway, EventQuery, MailGateway};
use email_assistant::tools::CapabilityRegistry;
use serde_json::Value;
use shared_types::{CalendarEvent, DraftEmail, Email, EventPatch, EventTime, NewCalendarEvent};
use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex};
use tracing_subscriber::fmt::MakeWriter;

pub const TZ: chrono_tz::Tz = chrono_tz::Asia::Kolkata;

/// 2025-03-05 10:00 in Asia/Kolkata, a Wednesday
pub fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 5, 4, 30, 0).unwrap()
}

pub fn email(id: &str, subject: &str, body: &str) -> Email {
    Email {
        id: id.to_string(),
        thread_id: format!("thread-{}", id),
        subject: subject.to_string(),
        sender: "Jane Doe <jane@example.com>".to_string(),
        date: "Wed, 5 Mar 2025 09:55:00 +0530".to_string(),
        body: body.to_string(),
    }
}

pub fn local_event(id: &str, summary: &str, start: &str, end: &str) -> CalendarEvent {
    let parse = |s: &str| shared_types::parse_timestamp(s, TZ).unwrap();
    CalendarEvent {
        id: id.to_string(),
        summary: summary.to_string(),
        start: EventTime::at(parse(start), "Asia/Kolkata"),
        end: EventTime::at(parse(end), "Asia/Kolkata"),
        ..Default::default()
    }
}

#[derive(Default)]
pub struct MemoryMail {
    pub inbox: Mutex<Vec<Email>>,
    pub queries: Mutex<Vec<DateTime<Utc>>>,
    pub fail: Mutex<bool>,
}

impl MemoryMail {
    pub fn with(emails: Vec<Email>) -> Self {
        let mail = Self::default();
        *mail.inbox.lock().unwrap() = emails;
        mail
    }
}

#[async_trait]
impl MailGateway for MemoryMail {
    async fn list_since(&self, since: DateTime<Utc>) -> Result<Vec<Email>, GatewayError> {
        self.queries.lock().unwrap().push(since);
        if *self.fail.lock().unwrap() {
            return Err(GatewayError::RateLimited("quota exceeded".to_string()));
        }
        Ok(self.inbox.lock().unwrap().clone())
    }
}

#[derive(Default)]
pub struct MemoryCalendar {
    pub events: Mutex<Vec<CalendarEvent>>,
    pub log: Mutex<Vec<String>>,
    next_id: Mutex<u32>,
}

impl MemoryCalendar {
    pub fn with(events: Vec<CalendarEvent>) -> Self {
        let calendar = Self::default();
        *calendar.events.lock().unwrap() = events;
        calendar
    }

    pub fn events(&self) -> Vec<CalendarEvent> {
        self.events.lock().unwrap().clone()
    }

    fn note(&self, entry: String) {
        self.log.lock().unwrap().push(entry);
    }
}

#[async_trait]
impl CalendarGateway for MemoryCalendar {
    async fn list_events(&self, query: &EventQuery) -> Result<Vec<CalendarEvent>, GatewayError> {
        self.note(format!("list {} {}", query.start, query.end));
        let mut found: Vec<CalendarEvent> = self
            .events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| {
                e.interval()
                    .is_some_and(|i| i.start < query.end && query.start < i.end)
            })
            .cloned()
            .collect();
        found.sort_by_key(|e| e.start.instant());
        found.truncate(query.max_results as usize);
        Ok(found)
    }

    async fn get_event(&self, event_id: &str) -> Result<CalendarEvent, GatewayError> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .find(|e| e.id == event_id)
            .cloned()
            .ok_or_else(|| GatewayError::NotFound(format!("event {}", event_id)))
    }

    async fn create_event(&self, event: &NewCalendarEvent) -> Result<CalendarEvent, GatewayError> {
        self.note(format!("create {}", event.summary));
        let id = {
            let mut next = self.next_id.lock().unwrap();
            *next += 1;
            format!("created-{}", *next)
        };
        let stored = CalendarEvent {
            id,
            summary: event.summary.clone(),
            start: EventTime::at(event.start, event.time_zone.clone()),
            end: EventTime::at(event.end, event.time_zone.clone()),
            description: event.description.clone(),
            location: event.location.clone(),
            attendees: event.attendees.clone(),
            recurrence: event.recurrence.clone(),
        };
        self.events.lock().unwrap().push(stored.clone());
        Ok(stored)
    }

    async fn update_event(
        &self,
        event_id: &str,
        patch: &EventPatch,
    ) -> Result<CalendarEvent, GatewayError> {
        self.note(format!("update {}", event_id));
        let mut events = self.events.lock().unwrap();
        let event = events
            .iter_mut()
            .find(|e| e.id == event_id)
            .ok_or_else(|| GatewayError::NotFound(format!("event {}", event_id)))?;
        patch.apply_to(event);
        Ok(event.clone())
    }

    async fn delete_event(&self, event_id: &str) -> Result<(), GatewayError> {
        self.note(format!("delete {}", event_id));
        let mut events = self.events.lock().unwrap();
        let before = events.len();
        events.retain(|e| e.id != event_id);
        if events.len() == before {
            return Err(GatewayError::NotFound(format!("event {}", event_id)));
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryDrafts {
    pub drafts: Mutex<Vec<DraftEmail>>,
    /// Message ids whose drafts fail with a transport error
    pub failing_threads: Mutex<Vec<String>>,
}

#[async_trait]
impl DraftGateway for MemoryDrafts {
    async fn create_draft(&self, draft: &DraftEmail) -> Result<String, GatewayError> {
        let thread = draft.thread_id.clone().unwrap_or_default();
        if self.failing_threads.lock().unwrap().contains(&thread) {
            return Err(GatewayError::Transport("connection reset by peer".to_string()));
        }
        let mut drafts = self.drafts.lock().unwrap();
        drafts.push(draft.clone());
        Ok(format!("draft-{}", drafts.len()))
    }
}

/// Oracle that decides from the conversation so far
pub struct ReactiveOracle<F> {
    decide: F,
    pub calls: Mutex<usize>,
}

impl<F> ReactiveOracle<F>
where
    F: Fn(&[Turn]) -> Decision + Send + Sync,
{
    pub fn new(decide: F) -> Arc<Self> {
        Arc::new(Self {
            decide,
            calls: Mutex::new(0),
        })
    }
}

#[async_trait]
impl<F> DecisionOracle for ReactiveOracle<F>
where
    F: Fn(&[Turn]) -> Decision + Send + Sync,
{
    async fn decide(&self, request: &OracleRequest<'_>) -> Result<Decision, OracleError> {
        *self.calls.lock().unwrap() += 1;
        Ok((self.decide)(request.turns))
    }
}

/// Oracle replaying a fixed script
pub struct ScriptedOracle {
    script: Mutex<VecDeque<Decision>>,
}

impl ScriptedOracle {
    pub fn new(script: Vec<Decision>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
        })
    }
}

#[async_trait]
impl DecisionOracle for ScriptedOracle {
    async fn decide(&self, _request: &OracleRequest<'_>) -> Result<Decision, OracleError> {
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| OracleError::Http("script exhausted".to_string()))
    }
}

pub fn call(name: &str, args: Value) -> ActionCall {
    ActionCall {
        id: format!("{}-call", name),
        name: name.to_string(),
        args,
    }
}

pub fn act(calls: Vec<ActionCall>) -> Decision {
    Decision::Act { note: None, calls }
}

/// The email block the loop opened the conversation with
pub fn opening_text(turns: &[Turn]) -> String {
    match turns.first().and_then(|t| t.parts.first()) {
        Some(Part::Text(text)) => text.clone(),
        _ => String::new(),
    }
}

/// Output of the most recent result for `name`, if any
pub fn last_result<'a>(turns: &'a [Turn], name: &str) -> Option<(&'a str, bool)> {
    turns.iter().rev().flat_map(|t| t.parts.iter().rev()).find_map(|p| match p {
        Part::Result {
            name: n,
            output,
            success,
            ..
        } if n == name => Some((output.as_str(), *success)),
        _ => None,
    })
}

/// A field of the email block, e.g. `message_id`
pub fn email_field(turns: &[Turn], field: &str) -> String {
    let prefix = format!("{}: ", field);
    opening_text(turns)
        .lines()
        .find_map(|line| line.strip_prefix(&prefix).map(str::to_string))
        .unwrap_or_default()
}

pub fn scheduling_loop(
    oracle: Arc<dyn DecisionOracle>,
    calendar: Arc<MemoryCalendar>,
    drafts: Arc<MemoryDrafts>,
) -> DecisionLoop {
    DecisionLoop::new(
        oracle,
        CapabilityRegistry::scheduling(calendar, drafts, TZ),
        AssistantMode::Scheduling,
        TZ,
        15,
    )
}

/// A `create_draft` call answering the email the conversation is about
pub fn reply_call(turns: &[Turn], body: &str) -> ActionCall {
    call(
        "create_draft",
        serde_json::json!({
            "body": body,
            "sender": email_field(turns, "from"),
            "subject": email_field(turns, "subject"),
            "thread_id": email_field(turns, "thread_id"),
            "original_message_id": email_field(turns, "message_id"),
        }),
    )
}

pub fn draft_only_loop(oracle: Arc<dyn DecisionOracle>, drafts: Arc<MemoryDrafts>) -> DecisionLoop {
    DecisionLoop::new(
        oracle,
        CapabilityRegistry::draft_only(drafts),
        AssistantMode::DraftOnly,
        TZ,
        15,
    )
}

/// Shared sink for formatted log lines
#[derive(Clone, Default)]
pub struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl LogBuffer {
    /// Route this thread's tracing output here until the guard drops
    pub fn capture(&self) -> tracing::subscriber::DefaultGuard {
        let subscriber = tracing_subscriber::fmt()
            .with_writer(self.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::DEBUG)
            .finish();
        tracing::subscriber::set_default(subscriber)
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for LogBuffer {
    type Writer = LogBuffer;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}
