//! Calendar event data structure.
//!
//! This module defines the [`Event`] fetched from the event store and shared
//! read-only by the cache, the selector and the scheduler.

use std::fmt;

use chrono::{DateTime, Utc};

/// Represents an upcoming calendar event.
///
/// Events are immutable once fetched. They carry no identity beyond their
/// title and start time, and duplicates are not detected.
///
/// # Examples
///
/// ```
/// # use chrono::{Duration, Utc};
/// # use minder::events::Event;
/// let event = Event {
///     title: "Standup".to_string(),
///     start: Utc::now() + Duration::minutes(5),
/// };
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    /// Human readable title of the event
    pub title: String,
    /// Instant the event starts
    pub start: DateTime<Utc>,
}

impl Event {
    /// Create a new [`Event`].
    pub fn new(title: &str, start: DateTime<Utc>) -> Self {
        Event {
            title: title.to_owned(),
            start,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "title={}, start={}", self.title, self.start.to_rfc3339())
    }
}
