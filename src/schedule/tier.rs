//! Notification tiers and the signals carrying them.

use std::fmt;

use chrono::{DateTime, Duration, Utc};

/// Remaining time under which an event is upcoming.
pub const UPCOMING_THRESHOLD_SECS: i64 = 300;
/// Remaining time under which an event is almost there.
pub const ALMOST_THERE_THRESHOLD_SECS: i64 = 60;
/// Remaining time under which an event is starting.
pub const STARTING_THRESHOLD_SECS: i64 = 10;
/// Time after the start of an event when notifications stop.
pub const STOP_OFFSET_SECS: i64 = 120;
/// Extra lead before the upcoming threshold when tracking kicks in.
pub const TRACKING_LEAD_SECS: i64 = 5;

/// Urgency of the next event, ordered by increasing urgency.
///
/// `Waiting` is the idle state and `Stop` is terminal: it is reached once
/// the start of the event is [`STOP_OFFSET_SECS`] in the past.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum NotificationTier {
    /// No event close enough to notify about
    Waiting,
    /// Event starts within [`UPCOMING_THRESHOLD_SECS`]
    Pending,
    /// Event starts within [`ALMOST_THERE_THRESHOLD_SECS`]
    AlmostThere,
    /// Event starts within [`STARTING_THRESHOLD_SECS`] or already started
    Starting,
    /// Event is over
    Stop,
}

impl NotificationTier {
    /// Classifies the time remaining before an event.
    ///
    /// Never returns [`NotificationTier::Stop`], which depends on the time
    /// elapsed since the start rather than on the time remaining.
    pub fn from_remaining(remaining: Duration) -> Self {
        if remaining <= Duration::seconds(STARTING_THRESHOLD_SECS) {
            NotificationTier::Starting
        } else if remaining <= Duration::seconds(ALMOST_THERE_THRESHOLD_SECS) {
            NotificationTier::AlmostThere
        } else if remaining <= Duration::seconds(UPCOMING_THRESHOLD_SECS) {
            NotificationTier::Pending
        } else {
            NotificationTier::Waiting
        }
    }
}

impl fmt::Display for NotificationTier {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            NotificationTier::Waiting => "waiting",
            NotificationTier::Pending => "pending",
            NotificationTier::AlmostThere => "almost there",
            NotificationTier::Starting => "starting",
            NotificationTier::Stop => "stop",
        };
        write!(f, "{}", name)
    }
}

/// Tier computed for the tracked event, sent to every notifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TierSignal {
    /// Title of the tracked event
    pub title: String,
    /// Start of the tracked event
    pub start: DateTime<Utc>,
    /// Current tier of the tracked event
    pub tier: NotificationTier,
}

impl fmt::Display for TierSignal {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "title={}, start={}, tier={}",
            self.title,
            self.start.to_rfc3339(),
            self.tier
        )
    }
}
