//! Tier scheduler driving the notification sequence of the next event.
//!
//! This module provides the [`TierScheduler`] which, on every tick, picks the
//! next event from the [`EventCache`] and classifies the time left before it
//! into a [`NotificationTier`].

use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use log::{debug, info, warn};
use tokio::{
    sync::mpsc,
    time::{self, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;

use crate::events::{Event, EventCache, next_event};
use crate::schedule::tier::{
    NotificationTier, STARTING_THRESHOLD_SECS, STOP_OFFSET_SECS, TRACKING_LEAD_SECS, TierSignal,
    UPCOMING_THRESHOLD_SECS,
};

/// Interval between two scheduler ticks.
pub const TICK_INTERVAL: StdDuration = StdDuration::from_secs(1);

/// Working state of the scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScheduleState {
    /// No event is tracked, the cache is consulted on the next tick
    Idle,
    /// An event is tracked with the last emitted tier
    Tracking {
        event: Event,
        tier: NotificationTier,
    },
}

/// Tick-driven state machine emitting one [`TierSignal`] per qualifying tick.
///
/// # Transitions
///
/// On each tick, against the current instant:
///
/// 1. `Idle` with a future event in the cache becomes `Tracking` at
///    [`NotificationTier::Waiting`]
/// 2. Before `start - (upcoming threshold + lead)` the tracked event is inert
/// 3. Past `start + stop offset`, [`NotificationTier::Stop`] is emitted once
///    and the scheduler goes back to `Idle`
/// 4. Past `start - starting threshold`, [`NotificationTier::Starting`] is emitted
/// 5. Otherwise the remaining time is classified with
///    [`NotificationTier::from_remaining`]
///
/// Signals are emitted on every qualifying tick, not only when the tier
/// changes, so late notifiers converge to the right state. The emitted tier
/// never goes back for a tracked event.
pub struct TierScheduler {
    /// Cache the next event is selected from
    cache: EventCache,
    /// Current state, owned by the tick loop
    state: ScheduleState,
}

impl TierScheduler {
    /// Creates an idle scheduler reading from `cache`.
    pub fn new(cache: EventCache) -> Self {
        TierScheduler {
            cache,
            state: ScheduleState::Idle,
        }
    }

    /// Returns the current state.
    pub fn state(&self) -> &ScheduleState {
        &self.state
    }

    /// Evaluates the state machine at `now`.
    ///
    /// # Returns
    ///
    /// The signal to dispatch, or `None` when idle or when the tracked event
    /// is still too far away.
    pub fn tick(&mut self, now: DateTime<Utc>) -> Option<TierSignal> {
        if self.state == ScheduleState::Idle {
            let snapshot = self.cache.snapshot();
            let event = next_event(&snapshot, now)?;

            info!("tracking next event {}", event);
            self.state = ScheduleState::Tracking {
                event: event.clone(),
                tier: NotificationTier::Waiting,
            };
        }

        let ScheduleState::Tracking { event, tier } = &mut self.state else {
            return None;
        };

        let tracking_start =
            event.start - Duration::seconds(UPCOMING_THRESHOLD_SECS + TRACKING_LEAD_SECS);
        if now < tracking_start {
            return None;
        }

        let computed = if now > event.start - Duration::seconds(STARTING_THRESHOLD_SECS) {
            if now > event.start + Duration::seconds(STOP_OFFSET_SECS) {
                NotificationTier::Stop
            } else {
                NotificationTier::Starting
            }
        } else {
            NotificationTier::from_remaining(event.start - now)
        };

        // Tiers only move forward for a tracked event
        let next = computed.max(*tier);
        if next != *tier {
            info!("event {} moves from {} to {}", event.title, tier, next);
            *tier = next;
        }

        let signal = TierSignal {
            title: event.title.clone(),
            start: event.start,
            tier: next,
        };

        if next == NotificationTier::Stop {
            info!("event {} is over", signal.title);
            self.state = ScheduleState::Idle;
        }

        Some(signal)
    }

    /// Ticks every [`TICK_INTERVAL`] and sends the produced signals to `sender`
    /// until `token` is cancelled or the receiver is dropped.
    pub async fn run(mut self, sender: mpsc::Sender<TierSignal>, token: CancellationToken) {
        info!("scheduling notifications every {:?}", TICK_INTERVAL);
        let mut interval = time::interval(TICK_INTERVAL);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = interval.tick() => {}
            }

            let Some(signal) = self.tick(Utc::now()) else {
                continue;
            };
            debug!("emit {}", signal);

            tokio::select! {
                _ = token.cancelled() => break,
                sent = sender.send(signal) => {
                    if sent.is_err() {
                        warn!("notifier dispatch is gone");
                        break;
                    }
                }
            }
        }

        info!("stopping scheduler");
    }
}
