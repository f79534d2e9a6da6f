//! Fan-out of tier signals to the registered notifiers.

use futures::future::join_all;
use log::{debug, info};
use tokio::sync::mpsc;
use tokio_util::{sync::CancellationToken, task::TaskTracker};

use crate::notifiers::{NotifierContext, Registration};
use crate::schedule::TierSignal;

/// Forwards every received [`TierSignal`] to all notifiers.
///
/// Each notification runs in its own task so a slow or failing notifier
/// never delays the others nor the scheduler.
pub struct Dispatcher {
    notifiers: Vec<Registration>,
    tracker: TaskTracker,
}

impl Dispatcher {
    pub fn new(notifiers: Vec<Registration>, tracker: TaskTracker) -> Self {
        Dispatcher { notifiers, tracker }
    }

    /// Initializes every notifier concurrently.
    pub async fn initialize(&self, ctx: NotifierContext) {
        join_all(self.notifiers.iter().map(|registration| {
            info!("initializing notifier {}", registration.name);
            registration.notifier.initialize(ctx.clone())
        }))
        .await;
    }

    /// Spawns one notification task per notifier and returns immediately.
    pub fn broadcast(&self, signal: &TierSignal) {
        for registration in &self.notifiers {
            let notifier = registration.notifier.clone();
            let signal = signal.clone();
            self.tracker.spawn(async move { notifier.notify(signal).await });
        }
    }

    /// Broadcasts signals from `receiver` until `token` is cancelled or the
    /// scheduler is gone.
    pub async fn run(self, mut receiver: mpsc::Receiver<TierSignal>, token: CancellationToken) {
        loop {
            let signal = tokio::select! {
                _ = token.cancelled() => break,
                signal = receiver.recv() => signal,
            };

            let Some(signal) = signal else {
                break;
            };
            debug!("dispatch {} to {} notifiers", signal, self.notifiers.len());
            self.broadcast(&signal);
        }

        info!("stopping notifier dispatch");
    }
}
