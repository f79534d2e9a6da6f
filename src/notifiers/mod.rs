//! Notifiers reacting to the tier signals of the tracked event.
//!
//! # Modules
//!
//! - `dispatch` - Fan-out of every signal to all registered notifiers
//! - `tray` - System tray title and icon
//! - `usb` - Serial USB light with device discovery
//! - `gpio` - RGB LED wired on GPIO pins
//! - `voice` - Spoken announcements through a text-to-speech program

mod dispatch;
mod gpio;
mod tray;
mod usb;
mod voice;

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use async_trait::async_trait;
use log::{info, warn};
use mockall::automock;
use tokio_util::{sync::CancellationToken, task::TaskTracker};

use crate::config::Config;
use crate::schedule::TierSignal;

pub use crate::notifiers::dispatch::Dispatcher;
use crate::notifiers::gpio::{GpioNotifier, SysfsLedPins};
use crate::notifiers::tray::{LogTray, TrayNotifier};
use crate::notifiers::usb::{SystemSerialPorts, UsbNotifier};
use crate::notifiers::voice::{CommandSpeaker, VoiceNotifier};

/// Runtime handles given to notifiers at initialization.
///
/// Background work spawned by a notifier must go through `tracker` and
/// stop once `token` is cancelled.
#[derive(Clone, Default)]
pub struct NotifierContext {
    pub token: CancellationToken,
    pub tracker: TaskTracker,
}

/// A backend turning tier signals into something the user notices.
///
/// `notify` is called concurrently with other notifiers and must not block
/// for long: slow hardware is driven in the background and overlapping
/// calls are dropped.
#[automock]
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Prepares the backend, called once before the first signal.
    async fn initialize(&self, ctx: NotifierContext);

    /// Reacts to the current tier of the tracked event.
    async fn notify(&self, signal: TierSignal);
}

/// A notifier with the name it was configured under.
#[derive(Clone)]
pub struct Registration {
    pub name: String,
    pub notifier: Arc<dyn Notifier>,
}

impl Registration {
    pub fn new(name: &str, notifier: Arc<dyn Notifier>) -> Self {
        Registration {
            name: name.to_owned(),
            notifier,
        }
    }
}

/// Builds the notifiers listed in the configuration.
///
/// Unknown and duplicated names are skipped with a warning.
pub fn from_config(config: &Config) -> Vec<Registration> {
    let mut registrations: Vec<Registration> = vec![];

    for name in &config.notifiers {
        let name = name.trim().to_lowercase();
        if registrations.iter().any(|r| r.name == name) {
            warn!("notifier {} is configured twice, ignoring", name);
            continue;
        }

        let notifier: Arc<dyn Notifier> = match name.as_str() {
            "tray" => Arc::new(TrayNotifier::new(Box::new(LogTray))),
            "usb" => Arc::new(UsbNotifier::new(
                Arc::new(SystemSerialPorts),
                &config.usb_devices,
            )),
            "gpio" => Arc::new(GpioNotifier::new(Arc::new(SysfsLedPins::new(&config.gpio)))),
            "voice" => Arc::new(VoiceNotifier::new(Arc::new(CommandSpeaker::new(
                &config.voice,
            )))),
            _ => {
                warn!("unknown notifier {}, ignoring", name);
                continue;
            }
        };

        info!("notifier {} enabled", name);
        registrations.push(Registration::new(&name, notifier));
    }

    registrations
}

/// Flag marking a notifier as busy driving its hardware.
///
/// Acquiring it returns a guard which releases the flag when dropped.
#[derive(Default)]
pub(crate) struct InFlight {
    busy: AtomicBool,
}

pub(crate) struct InFlightGuard<'a> {
    busy: &'a AtomicBool,
}

impl InFlight {
    /// Marks the notifier busy, or returns `None` if it already is.
    pub(crate) fn try_acquire(&self) -> Option<InFlightGuard<'_>> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| InFlightGuard { busy: &self.busy })
    }

    pub(crate) fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}
