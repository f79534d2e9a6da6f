//! Next event selection.

use chrono::{DateTime, Utc};

use crate::events::Event;

/// Returns the soonest event starting strictly after `now`.
///
/// Events that already started are ignored. When several events share the
/// earliest start, the first one in `events` wins.
pub fn next_event(events: &[Event], now: DateTime<Utc>) -> Option<&Event> {
    events
        .iter()
        .filter(|event| event.start > now)
        .fold(None, |next: Option<&Event>, event| match next {
            Some(current) if current.start <= event.start => Some(current),
            _ => Some(event),
        })
}
