//! Periodic refresh of the event cache.
//!
//! This module provides the [`EventPoller`] struct that keeps the
//! [`EventCache`] up to date by polling the event store during business hours.

use std::time::Duration;

use chrono::{Local, Timelike};
use log::{debug, info, warn};
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;

use crate::config::Refresh;
use crate::events::{EventCache, EventStore};

/// Interval between two polls of the event store.
pub const POLL_INTERVAL: Duration = Duration::from_secs(2 * 60);

/// Result of a single poll attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// The local hour is outside the business window, the store was not called
    Skipped,
    /// The cache was replaced with this many events
    Refreshed(usize),
    /// The store call failed, the previous cache is retained
    Failed,
}

/// Refreshes the event cache from an [`EventStore`].
///
/// The poller performs one unconditional refresh at startup, then polls
/// every [`POLL_INTERVAL`] but only while the local hour is strictly between
/// the configured start and end hours. That avoids needless remote calls
/// overnight while making sure the window reopens before the first events
/// of the next day.
///
/// # Examples
///
/// ```no_run
/// use minder::events::{EventCache, EventPoller, MongoEventStore};
///
/// # async fn example(config: minder::config::Config) -> anyhow::Result<()> {
/// let cache = EventCache::new();
/// let poller = EventPoller::new(MongoEventStore::new(&config.store), cache, config.refresh);
/// poller.refresh().await?;
/// # Ok(())
/// # }
/// ```
pub struct EventPoller<S: EventStore> {
    /// Event store to fetch events from
    store: S,
    /// Cache replaced on every successful refresh
    cache: EventCache,
    /// Business window in local hours
    window: Refresh,
}

impl<S: EventStore> EventPoller<S> {
    /// Create a new [`EventPoller`].
    pub fn new(store: S, cache: EventCache, window: Refresh) -> Self {
        EventPoller {
            store,
            cache,
            window,
        }
    }

    /// Fetches events and replaces the cache with them.
    ///
    /// On failure the cache is left untouched and the error is returned.
    ///
    /// # Returns
    ///
    /// The number of events now cached.
    pub async fn refresh(&self) -> anyhow::Result<usize> {
        let events = self.store.fetch_events().await?;
        let count = events.len();

        for event in &events {
            debug!("fetched event {}", event);
        }

        self.cache.replace(events);
        info!("refreshed {} events", count);

        Ok(count)
    }

    /// Returns whether `hour` is strictly inside the business window.
    pub fn is_in_window(&self, hour: u32) -> bool {
        hour > self.window.start_hour && hour < self.window.end_hour
    }

    /// Polls the event store if `hour` is inside the business window.
    ///
    /// Failures are logged and reported as [`PollOutcome::Failed`], the next
    /// poll retries.
    pub async fn poll(&self, hour: u32) -> PollOutcome {
        if !self.is_in_window(hour) {
            debug!(
                "skip refresh at hour {}, outside {}-{}",
                hour, self.window.start_hour, self.window.end_hour
            );
            return PollOutcome::Skipped;
        }

        match self.refresh().await {
            Ok(count) => PollOutcome::Refreshed(count),
            Err(e) => {
                warn!("failed to refresh events, keeping previous ones: {:#}", e);
                PollOutcome::Failed
            }
        }
    }

    /// Polls the event store every [`POLL_INTERVAL`] until `token` is cancelled.
    ///
    /// The first poll happens one interval after the call, the startup
    /// refresh being done separately with [`Self::refresh`].
    pub async fn run(self, token: CancellationToken) {
        info!(
            "refreshing events every {} seconds between {}h and {}h",
            POLL_INTERVAL.as_secs(),
            self.window.start_hour,
            self.window.end_hour
        );
        let mut interval = time::interval_at(Instant::now() + POLL_INTERVAL, POLL_INTERVAL);

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = interval.tick() => {}
            }

            tokio::select! {
                _ = token.cancelled() => break,
                outcome = self.poll(Local::now().hour()) => {
                    if let PollOutcome::Refreshed(count) = outcome {
                        debug!(
                            "{} events cached, next refresh in {} seconds",
                            count,
                            POLL_INTERVAL.as_secs()
                        );
                    }
                }
            }
        }

        info!("stopping event refresh");
    }
}
