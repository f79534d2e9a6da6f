//! In-memory cache of the most recently fetched events.

use std::sync::Arc;

use tokio::sync::watch;

use crate::events::Event;

/// Snapshot of the cached events, shared without copying.
pub type EventSnapshot = Arc<[Event]>;

/// Holds the last fetched list of events.
///
/// The poller replaces the whole list on every successful refresh and the
/// scheduler reads whatever snapshot is current. Readers only clone an
/// [`Arc`], so a refresh never blocks a scheduler tick for longer than the
/// pointer swap.
///
/// Readers must tolerate an empty snapshot (nothing fetched yet) and a
/// snapshot made only of past events (stale until the next refresh).
#[derive(Clone)]
pub struct EventCache {
    sender: Arc<watch::Sender<EventSnapshot>>,
}

impl EventCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        let (sender, _) = watch::channel(EventSnapshot::from(Vec::new()));
        EventCache {
            sender: Arc::new(sender),
        }
    }

    /// Replaces the cached events wholesale.
    pub fn replace(&self, events: Vec<Event>) {
        self.sender.send_replace(events.into());
    }

    /// Returns the current snapshot.
    pub fn snapshot(&self) -> EventSnapshot {
        Arc::clone(&self.sender.borrow())
    }
}

impl Default for EventCache {
    fn default() -> Self {
        Self::new()
    }
}
