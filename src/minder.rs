//! Lifecycle of the minder daemon.
//!
//! This module provides the [`Minder`] which wires the event poller, the
//! tier scheduler and the notifier dispatch together, and stops them on
//! shutdown.
//!
//! # Architecture
//!
//! The daemon runs three concurrent tasks:
//!
//! 1. **Poller Task**: refreshes the event cache every two minutes during
//!    business hours
//! 2. **Scheduler Task**: ticks every second, tracks the next event and sends
//!    its tier over a bounded channel
//! 3. **Dispatch Task**: fans every tier signal out to the notifiers
//!
//! ```text
//! Event Store → Poller → Cache → Scheduler → Dispatch → Tray / USB / GPIO / Voice
//! ```
//!
//! Every task, including the background work of notifiers, is spawned on a
//! shared [`TaskTracker`] and stops when the [`CancellationToken`] is
//! cancelled.

use std::{future::Future, time::Duration};

use anyhow::Context;
use log::{error, info};
use tokio::{sync::mpsc, time};
use tokio_util::{sync::CancellationToken, task::TaskTracker};

use crate::{
    config::Config,
    events::{EventCache, EventPoller, MongoEventStore},
    notifiers::{self, Dispatcher, NotifierContext, Registration},
    schedule::TierScheduler,
};

/// Capacity of the scheduler to dispatch channel.
const SIGNAL_CHANNEL_CAPACITY: usize = 5;

/// Maximum time given to the tasks to stop after cancellation.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// The minder daemon.
///
/// # Examples
///
/// ```no_run
/// # use minder::{config::Config, minder::Minder};
/// # async fn run() -> anyhow::Result<()> {
/// let config = Config::load("minder.yaml")?;
/// let minder = Minder::new(config).await?;
/// minder.start().await; // Runs until SIGINT or SIGTERM
/// # Ok(())
/// # }
/// ```
pub struct Minder {
    poller: EventPoller<MongoEventStore>,
    scheduler: TierScheduler,
    dispatcher: Dispatcher,
    token: CancellationToken,
    tracker: TaskTracker,
}

impl Minder {
    /// Creates the daemon with the notifiers listed in `config`.
    ///
    /// # Errors
    ///
    /// Fails if the initial refresh of the events fails.
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let notifiers = notifiers::from_config(&config);
        Self::with_notifiers(config, notifiers).await
    }

    /// Creates the daemon with the given notifiers.
    ///
    /// The event cache is filled before returning so the scheduler has
    /// something to track from its first tick.
    pub async fn with_notifiers(
        config: Config,
        notifiers: Vec<Registration>,
    ) -> anyhow::Result<Self> {
        let cache = EventCache::new();
        let poller = EventPoller::new(
            MongoEventStore::new(&config.store),
            cache.clone(),
            config.refresh.clone(),
        );

        poller
            .refresh()
            .await
            .context("failed to fetch the initial events")?;

        if notifiers.is_empty() {
            info!("no notifier configured, events are only logged");
        }

        let tracker = TaskTracker::new();
        Ok(Minder {
            poller,
            scheduler: TierScheduler::new(cache),
            dispatcher: Dispatcher::new(notifiers, tracker.clone()),
            token: CancellationToken::new(),
            tracker,
        })
    }

    /// Runs the daemon until SIGINT or SIGTERM is received.
    pub async fn start(self) {
        self.run_until(wait_for_shutdown_signal()).await;
    }

    /// Runs the daemon until `shutdown` completes, then cancels every task
    /// and waits for them to stop.
    pub async fn run_until(self, shutdown: impl Future<Output = ()>) {
        let Minder {
            poller,
            scheduler,
            dispatcher,
            token,
            tracker,
        } = self;

        dispatcher
            .initialize(NotifierContext {
                token: token.child_token(),
                tracker: tracker.clone(),
            })
            .await;

        let (sender, receiver) = mpsc::channel(SIGNAL_CHANNEL_CAPACITY);
        tracker.spawn(poller.run(token.clone()));
        tracker.spawn(scheduler.run(sender, token.clone()));
        tracker.spawn(dispatcher.run(receiver, token.clone()));
        info!("minder started");

        shutdown.await;

        info!("shutting down");
        token.cancel();
        tracker.close();
        if time::timeout(SHUTDOWN_GRACE, tracker.wait()).await.is_err() {
            error!(
                "tasks still running after {} seconds, exiting anyway",
                SHUTDOWN_GRACE.as_secs()
            );
        }
        info!("minder stopped");
    }
}

/// Resolves on the first SIGINT or SIGTERM.
#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(terminate) => terminate,
        Err(e) => {
            error!("failed to listen for SIGTERM: {}", e);
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("failed to listen for SIGINT: {}", e);
            }
            return;
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("received SIGINT"),
        _ = terminate.recv() => info!("received SIGTERM"),
    }
}

/// Resolves on the first Ctrl-C.
#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("failed to listen for Ctrl-C: {}", e);
    }
}
