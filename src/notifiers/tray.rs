//! System tray notifier.

use std::{fmt, sync::Mutex};

use async_trait::async_trait;
use log::{info, warn};
use mockall::automock;

use crate::notifiers::{Notifier, NotifierContext};
use crate::schedule::{NotificationTier, TierSignal};

/// Icons shown in the tray.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Icon {
    Clock,
    Sleep,
    Red,
    Yellow,
    Green,
}

impl fmt::Display for Icon {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            Icon::Clock => "clock",
            Icon::Sleep => "sleep",
            Icon::Red => "red",
            Icon::Yellow => "yellow",
            Icon::Green => "green",
        };
        write!(f, "{}", name)
    }
}

/// Everything the tray shows: a title, the main icon and the icon of the
/// meeting menu item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrayDisplay {
    pub title: String,
    pub icon: Icon,
    pub item_icon: Icon,
}

impl TrayDisplay {
    /// Display shown when no event is tracked.
    pub fn idle() -> Self {
        TrayDisplay {
            title: "No meeting".to_owned(),
            icon: Icon::Clock,
            item_icon: Icon::Sleep,
        }
    }

    pub fn for_signal(signal: &TierSignal) -> Self {
        let color = match signal.tier {
            NotificationTier::Waiting | NotificationTier::Stop => return Self::idle(),
            NotificationTier::Pending => Icon::Green,
            NotificationTier::AlmostThere => Icon::Yellow,
            NotificationTier::Starting => Icon::Red,
        };

        TrayDisplay {
            title: format!("Meeting: {}", signal.title),
            icon: color,
            item_icon: color,
        }
    }
}

/// Platform tray handle.
#[automock]
pub trait TrayIcon: Send + Sync {
    fn show(&self, display: &TrayDisplay);
}

/// Tray rendering to the log, for headless hosts.
pub struct LogTray;

impl TrayIcon for LogTray {
    fn show(&self, display: &TrayDisplay) {
        info!(
            "tray: {} [{}] item [{}]",
            display.title, display.icon, display.item_icon
        );
    }
}

/// Mirrors the tracked event in the system tray.
///
/// The tray is only updated when the display changes.
pub struct TrayNotifier {
    tray: Box<dyn TrayIcon>,
    shown: Mutex<Option<TrayDisplay>>,
}

impl TrayNotifier {
    pub fn new(tray: Box<dyn TrayIcon>) -> Self {
        TrayNotifier {
            tray,
            shown: Mutex::new(None),
        }
    }

    fn show(&self, display: TrayDisplay) {
        let mut shown = match self.shown.lock() {
            Ok(shown) => shown,
            Err(e) => {
                warn!("tray state poisoned, resetting it");
                e.into_inner()
            }
        };

        if shown.as_ref() == Some(&display) {
            return;
        }
        self.tray.show(&display);
        *shown = Some(display);
    }
}

#[async_trait]
impl Notifier for TrayNotifier {
    async fn initialize(&self, _ctx: NotifierContext) {
        self.show(TrayDisplay::idle());
    }

    async fn notify(&self, signal: TierSignal) {
        self.show(TrayDisplay::for_signal(&signal));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use mockall::predicate::eq;

    fn create_signal(tier: NotificationTier) -> TierSignal {
        TierSignal {
            title: "Standup".to_string(),
            start: Utc::now(),
            tier,
        }
    }

    #[test]
    fn test_display_for_signal() {
        let cases = [
            (NotificationTier::Pending, Icon::Green),
            (NotificationTier::AlmostThere, Icon::Yellow),
            (NotificationTier::Starting, Icon::Red),
        ];

        for (tier, color) in cases {
            let display = TrayDisplay::for_signal(&create_signal(tier));
            assert_eq!(display.title, "Meeting: Standup");
            assert_eq!(display.icon, color, "main icon for {}", tier);
            assert_eq!(display.item_icon, color, "item icon for {}", tier);
        }
    }

    #[test]
    fn test_waiting_and_stop_show_idle() {
        assert_eq!(
            TrayDisplay::for_signal(&create_signal(NotificationTier::Waiting)),
            TrayDisplay::idle()
        );
        assert_eq!(
            TrayDisplay::for_signal(&create_signal(NotificationTier::Stop)),
            TrayDisplay::idle()
        );
        assert_eq!(TrayDisplay::idle().title, "No meeting");
    }

    #[tokio::test]
    async fn test_initialize_shows_idle() {
        let mut mock_tray = MockTrayIcon::new();
        mock_tray
            .expect_show()
            .with(eq(TrayDisplay::idle()))
            .times(1)
            .return_const(());

        let notifier = TrayNotifier::new(Box::new(mock_tray));
        notifier.initialize(NotifierContext::default()).await;
    }

    #[tokio::test]
    async fn test_identical_updates_are_skipped() {
        let mut mock_tray = MockTrayIcon::new();
        mock_tray.expect_show().times(3).return_const(());

        let notifier = TrayNotifier::new(Box::new(mock_tray));
        notifier.initialize(NotifierContext::default()).await;
        notifier.notify(create_signal(NotificationTier::Pending)).await;
        notifier.notify(create_signal(NotificationTier::Pending)).await;
        notifier.notify(create_signal(NotificationTier::Stop)).await;
        notifier.notify(create_signal(NotificationTier::Waiting)).await;
    }
}
