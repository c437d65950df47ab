use super::matching::is_same_event;
use crate::tools::Observation;
use shared_types::{CalendarEvent, NewCalendarEvent, TimeWindow};

/// Calendar state seen during one decision loop invocation.
///
/// Creation is allowed only inside a window whose listing was complete, and
/// only when none of the events seen there is the same meeting.
#[derive(Debug, Default)]
pub struct CalendarLedger {
    checked: Vec<TimeWindow>,
    /// Listings cut off at `max_results`, with the limit that applied
    truncated: Vec<(TimeWindow, u32)>,
    known: Vec<CalendarEvent>,
}

impl CalendarLedger {
    pub fn record(&mut self, observation: &Observation) {
        match observation {
            Observation::Window {
                window,
                events,
                max_results,
                complete,
            } => {
                if *complete {
                    self.checked.push(*window);
                } else {
                    self.truncated.push((*window, *max_results));
                }
                for event in events {
                    self.upsert(event.clone());
                }
            }
            Observation::Created(event) | Observation::Updated(event) => self.upsert(event.clone()),
            Observation::Deleted(id) => self.known.retain(|e| &e.id != id),
            Observation::DraftCreated { .. } => {}
        }
    }

    fn upsert(&mut self, event: CalendarEvent) {
        match self.known.iter_mut().find(|e| e.id == event.id) {
            Some(existing) => *existing = event,
            None => self.known.push(event),
        }
    }

    pub fn is_checked(&self, window: &TimeWindow) -> bool {
        self.checked.iter().any(|checked| checked.covers(window))
    }

    pub fn known_events(&self) -> &[CalendarEvent] {
        &self.known
    }

    /// Why `event` must not be created, if it must not.
    pub fn refuse_create(&self, event: &NewCalendarEvent) -> Option<String> {
        let window = event.window();

        if !self.is_checked(&window) {
            if let Some((_, limit)) = self.truncated.iter().find(|(w, _)| w.covers(&window)) {
                return Some(format!(
                    "Error creating calendar event: the listing covering {} to {} stopped at \
                     max_results ({}) so it may be missing an equivalent event; call \
                     get_calendar_events again with a narrower window or a higher max_results",
                    event.start.to_rfc3339(),
                    event.end.to_rfc3339(),
                    limit
                ));
            }
            return Some(format!(
                "Error creating calendar event: call get_calendar_events for a window covering \
                 {} to {} first and check for an equivalent event",
                event.start.to_rfc3339(),
                event.end.to_rfc3339()
            ));
        }

        self.known
            .iter()
            .find(|existing| is_same_event(existing, &event.summary, &window))
            .map(|existing| {
                format!(
                    "Error creating calendar event: '{}' (event_id \"{}\") already covers this \
                     meeting; use update_calendar_event with that event_id instead",
                    existing.summary, existing.id
                )
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};
    use shared_types::EventTime;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 6, hour, 0, 0).unwrap()
    }

    fn proposed(summary: &str, start: u32, end: u32) -> NewCalendarEvent {
        NewCalendarEvent {
            summary: summary.to_string(),
            start: at(start),
            end: at(end),
            time_zone: "UTC".to_string(),
            description: None,
            location: None,
            attendees: vec![],
            recurrence: vec![],
        }
    }

    fn stored(id: &str, summary: &str, start: u32, end: u32) -> CalendarEvent {
        CalendarEvent {
            id: id.to_string(),
            summary: summary.to_string(),
            start: EventTime::at(at(start), "UTC"),
            end: EventTime::at(at(end), "UTC"),
            ..Default::default()
        }
    }

    fn day_window(events: Vec<CalendarEvent>) -> Observation {
        Observation::Window {
            window: TimeWindow::new(at(0), at(23)),
            events,
            max_results: 50,
            complete: true,
        }
    }

    #[test]
    fn test_create_requires_checked_window() {
        let ledger = CalendarLedger::default();
        let refusal = ledger.refuse_create(&proposed("Project sync", 15, 16)).unwrap();
        assert!(refusal.contains("call get_calendar_events"));
    }

    #[test]
    fn test_window_must_cover_whole_event() {
        let mut ledger = CalendarLedger::default();
        ledger.record(&Observation::Window {
            window: TimeWindow::new(at(14), at(15)),
            events: vec![],
            max_results: 50,
            complete: true,
        });
        assert!(ledger.refuse_create(&proposed("Project sync", 14, 16)).is_some());
        assert!(ledger.refuse_create(&proposed("Project sync", 14, 15)).is_none());
    }

    #[test]
    fn test_truncated_listing_does_not_count_as_checked() {
        let mut ledger = CalendarLedger::default();
        ledger.record(&Observation::Window {
            window: TimeWindow::new(at(0), at(23)),
            events: vec![stored("evt1", "Dentist", 9, 10)],
            max_results: 1,
            complete: false,
        });

        assert!(!ledger.is_checked(&TimeWindow::new(at(15), at(16))));
        let refusal = ledger.refuse_create(&proposed("Project sync", 15, 16)).unwrap();
        assert!(refusal.contains("max_results (1)"));
        assert!(refusal.contains("narrower window"));

        // a complete follow-up listing clears the way
        ledger.record(&Observation::Window {
            window: TimeWindow::new(at(14), at(17)),
            events: vec![],
            max_results: 50,
            complete: true,
        });
        assert!(ledger.refuse_create(&proposed("Project sync", 15, 16)).is_none());
    }

    #[test]
    fn test_empty_window_allows_create() {
        let mut ledger = CalendarLedger::default();
        ledger.record(&day_window(vec![]));
        assert!(ledger.refuse_create(&proposed("Project sync", 15, 16)).is_none());
    }

    #[test]
    fn test_duplicate_refused_with_event_id() {
        let mut ledger = CalendarLedger::default();
        ledger.record(&day_window(vec![stored("evt42", "Project sync", 15, 16)]));

        let refusal = ledger.refuse_create(&proposed("Re: Project sync", 15, 16)).unwrap();
        assert!(refusal.contains("evt42"));
        assert!(refusal.contains("update_calendar_event"));

        assert!(ledger.refuse_create(&proposed("Dentist", 15, 16)).is_none());
    }

    #[test]
    fn test_created_event_blocks_second_create() {
        let mut ledger = CalendarLedger::default();
        ledger.record(&day_window(vec![]));
        ledger.record(&Observation::Created(stored("evt1", "Project sync", 15, 16)));
        assert!(ledger.refuse_create(&proposed("Project sync", 15, 16)).is_some());
    }

    #[test]
    fn test_deleted_event_forgotten() {
        let mut ledger = CalendarLedger::default();
        ledger.record(&day_window(vec![stored("evt1", "Project sync", 15, 16)]));
        ledger.record(&Observation::Deleted("evt1".to_string()));
        assert!(ledger.known_events().is_empty());
        assert!(ledger.refuse_create(&proposed("Project sync", 15, 16)).is_none());
    }

    #[test]
    fn test_update_replaces_known_event() {
        let mut ledger = CalendarLedger::default();
        ledger.record(&day_window(vec![stored("evt1", "Project sync", 15, 16)]));
        ledger.record(&Observation::Updated(stored("evt1", "Project sync", 18, 19)));
        assert_eq!(ledger.known_events().len(), 1);
        assert!(ledger.refuse_create(&proposed("Project sync", 15, 16)).is_none());
    }
}
