//! Notification scheduling for the next upcoming event.
//!
//! - [`NotificationTier`]: urgency classification of the time left before an event
//! - [`TierSignal`]: the tier of the tracked event, as sent to notifiers
//! - [`TierScheduler`]: the tick loop turning the cached events into signals

mod scheduler;
mod tier;

pub use crate::schedule::scheduler::TierScheduler;
pub use crate::schedule::tier::{NotificationTier, TierSignal};
