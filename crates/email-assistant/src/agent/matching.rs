//! Heuristic for "is this the same meeting".
//!
//! Two events match when their intervals overlap by at least half of the
//! shorter one and their titles share most of their significant words.
//! This is best-effort: differently worded titles for one meeting will be
//! missed, and two similarly named meetings in one slot will collide.

use shared_types::{CalendarEvent, TimeWindow};
use std::collections::BTreeSet;

pub const MIN_OVERLAP_RATIO: f64 = 0.5;
pub const MIN_TITLE_SIMILARITY: f64 = 0.5;

/// Words that say nothing about which meeting is meant
const FILLER_WORDS: &[&str] = &[
    "re", "fw", "fwd", "meeting", "meet", "call", "with", "the", "a", "an", "and", "to", "for",
    "of", "on", "at", "in", "invite", "invitation",
];

/// Lower-cased alphanumeric words of `title`, minus filler
pub fn title_tokens(title: &str) -> BTreeSet<String> {
    let tokens: BTreeSet<String> = title
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect();

    let significant: BTreeSet<String> = tokens
        .iter()
        .filter(|w| !FILLER_WORDS.contains(&w.as_str()))
        .cloned()
        .collect();

    // a title made only of filler still has to compare against something
    if significant.is_empty() {
        tokens
    } else {
        significant
    }
}

pub fn title_similarity(a: &str, b: &str) -> f64 {
    let a = title_tokens(a);
    let b = title_tokens(b);
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    if a.is_subset(&b) || b.is_subset(&a) {
        return 1.0;
    }
    let shared = a.intersection(&b).count() as f64;
    let total = a.union(&b).count() as f64;
    shared / total
}

pub fn windows_overlap(a: &TimeWindow, b: &TimeWindow) -> bool {
    let shorter = a.duration().min(b.duration());
    if shorter.num_seconds() <= 0 {
        return a.start == b.start;
    }
    let overlap = a.overlap(b).num_seconds() as f64;
    overlap >= shorter.num_seconds() as f64 * MIN_OVERLAP_RATIO
}

/// Whether `existing` is the same meeting as a new event with `summary` at `window`.
pub fn is_same_event(existing: &CalendarEvent, summary: &str, window: &TimeWindow) -> bool {
    let Some(interval) = existing.interval() else {
        return false;
    };
    windows_overlap(&interval, window)
        && title_similarity(&existing.summary, summary) >= MIN_TITLE_SIMILARITY
}
