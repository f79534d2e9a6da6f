//! RGB LED notifier driven through GPIO pins.

use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::Context;
use async_trait::async_trait;
use log::{debug, warn};
use mockall::automock;
use tokio::time::sleep;

use crate::config::Gpio;
use crate::notifiers::{InFlight, Notifier, NotifierContext};
use crate::schedule::{NotificationTier, TierSignal};

/// Colors of the RGB LED.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Led {
    Red,
    Green,
    Blue,
}

const ALL_LEDS: [Led; 3] = [Led::Red, Led::Green, Led::Blue];

/// Output pins of the LED.
#[automock]
#[async_trait]
pub trait LedPins: Send + Sync {
    /// Lights or shuts `led`.
    async fn set(&self, led: Led, lit: bool) -> anyhow::Result<()>;
}

/// [`LedPins`] writing the sysfs `value` file of exported pins.
///
/// The LED is wired active-low: a pin is driven low to light its color.
pub struct SysfsLedPins {
    root: PathBuf,
    red: u8,
    green: u8,
    blue: u8,
}

impl SysfsLedPins {
    pub fn new(config: &Gpio) -> Self {
        SysfsLedPins {
            root: config.sysfs_root.clone(),
            red: config.red,
            green: config.green,
            blue: config.blue,
        }
    }

    fn value_path(&self, led: Led) -> PathBuf {
        let pin = match led {
            Led::Red => self.red,
            Led::Green => self.green,
            Led::Blue => self.blue,
        };
        self.root.join(format!("gpio{}", pin)).join("value")
    }
}

#[async_trait]
impl LedPins for SysfsLedPins {
    async fn set(&self, led: Led, lit: bool) -> anyhow::Result<()> {
        let path = self.value_path(led);
        let value = if lit { "0" } else { "1" };

        tokio::fs::write(&path, value)
            .await
            .with_context(|| format!("failed to write {}", path.display()))
    }
}

/// One step of a blink pattern: the LEDs lit and how long they stay so.
struct Step {
    lit: &'static [Led],
    duration: Duration,
}

const fn step(lit: &'static [Led], millis: u64) -> Step {
    Step {
        lit,
        duration: Duration::from_millis(millis),
    }
}

const STARTING_PATTERN: &[Step] = &[step(&[Led::Red], 5000)];
const ALMOST_THERE_PATTERN: &[Step] = &[step(&[Led::Red, Led::Green], 150), step(&[], 150)];
const PENDING_PATTERN: &[Step] = &[step(&[Led::Green], 500), step(&[], 500)];

/// Pattern played for a tier and how many times it repeats.
fn pattern_for(tier: NotificationTier) -> (&'static [Step], usize) {
    match tier {
        NotificationTier::Starting => (STARTING_PATTERN, 1),
        NotificationTier::AlmostThere => (ALMOST_THERE_PATTERN, 10),
        NotificationTier::Pending => (PENDING_PATTERN, 2),
        NotificationTier::Waiting | NotificationTier::Stop => (&[], 0),
    }
}

/// Blinks an RGB LED according to the tier of the tracked event.
///
/// Notifications received while a pattern is playing are dropped.
pub struct GpioNotifier {
    pins: Arc<dyn LedPins>,
    in_flight: InFlight,
}

impl GpioNotifier {
    pub fn new(pins: Arc<dyn LedPins>) -> Self {
        GpioNotifier {
            pins,
            in_flight: InFlight::default(),
        }
    }

    async fn show(&self, lit: &[Led]) -> anyhow::Result<()> {
        for led in ALL_LEDS {
            self.pins.set(led, lit.contains(&led)).await?;
        }
        Ok(())
    }

    async fn play(&self, tier: NotificationTier) -> anyhow::Result<()> {
        let (pattern, repeat) = pattern_for(tier);

        for _ in 0..repeat {
            for step in pattern {
                self.show(step.lit).await?;
                sleep(step.duration).await;
            }
        }

        self.show(&[]).await
    }
}

#[async_trait]
impl Notifier for GpioNotifier {
    async fn initialize(&self, _ctx: NotifierContext) {
        if let Err(e) = self.show(&[]).await {
            warn!("failed to turn the gpio led off: {:#}", e);
        }
    }

    async fn notify(&self, signal: TierSignal) {
        let Some(_guard) = self.in_flight.try_acquire() else {
            debug!("gpio led busy, dropping {}", signal);
            return;
        };

        if let Err(e) = self.play(signal.tier).await {
            warn!("failed to drive the gpio led: {:#}", e);
        }
    }
}
