//! Spoken announcements of the tracked event.

use std::sync::{Arc, Mutex};

use anyhow::{Context, ensure};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use mockall::automock;
use tokio::process::Command;

use crate::config::Voice;
use crate::notifiers::{InFlight, Notifier, NotifierContext};
use crate::schedule::{NotificationTier, TierSignal};

/// Number of identical notifications kept silent after an announcement.
pub const COOLDOWN_NOTIFICATIONS: u32 = 30;

/// Text-to-speech engine.
#[automock]
#[async_trait]
pub trait Speaker: Send + Sync {
    async fn say(&self, text: &str) -> anyhow::Result<()>;
}

/// [`Speaker`] running an external program with the text as last argument.
pub struct CommandSpeaker {
    program: String,
    args: Vec<String>,
}

impl CommandSpeaker {
    pub fn new(config: &Voice) -> Self {
        CommandSpeaker {
            program: config.program.clone(),
            args: config.args.clone(),
        }
    }
}

#[async_trait]
impl Speaker for CommandSpeaker {
    async fn say(&self, text: &str) -> anyhow::Result<()> {
        let status = Command::new(&self.program)
            .args(&self.args)
            .arg(text)
            .status()
            .await
            .with_context(|| format!("failed to run {}", self.program))?;

        ensure!(status.success(), "{} exited with {}", self.program, status);
        Ok(())
    }
}

/// Builds the announcement for a signal, `None` for silent tiers.
pub fn utterance(signal: &TierSignal, now: DateTime<Utc>) -> Option<String> {
    match signal.tier {
        NotificationTier::Pending => {
            let secs = (signal.start - now).num_seconds().max(0);
            let minutes = ((secs + 59) / 60).max(1);
            let unit = if minutes == 1 { "minute" } else { "minutes" };
            Some(format!("{} starts in {} {}", signal.title, minutes, unit))
        }
        NotificationTier::AlmostThere => {
            Some(format!("{} starts in less than a minute", signal.title))
        }
        NotificationTier::Starting => Some(format!("{} is starting now", signal.title)),
        NotificationTier::Waiting | NotificationTier::Stop => None,
    }
}

type CooldownKey = (String, DateTime<Utc>, NotificationTier);

#[derive(Default)]
struct Cooldown {
    last: Option<CooldownKey>,
    remaining: u32,
}

impl Cooldown {
    /// Returns whether the notification for `key` should be spoken.
    fn should_speak(&mut self, key: CooldownKey) -> bool {
        if self.last.as_ref() == Some(&key) && self.remaining > 0 {
            self.remaining -= 1;
            return false;
        }

        self.last = Some(key);
        self.remaining = COOLDOWN_NOTIFICATIONS;
        true
    }
}

/// Announces the tracked event through a [`Speaker`].
///
/// Signals arrive every second, so an announcement is only repeated after
/// [`COOLDOWN_NOTIFICATIONS`] identical notifications. Notifications received
/// while speaking are dropped.
pub struct VoiceNotifier {
    speaker: Arc<dyn Speaker>,
    cooldown: Mutex<Cooldown>,
    in_flight: InFlight,
}

impl VoiceNotifier {
    pub fn new(speaker: Arc<dyn Speaker>) -> Self {
        VoiceNotifier {
            speaker,
            cooldown: Mutex::new(Cooldown::default()),
            in_flight: InFlight::default(),
        }
    }

    fn should_speak(&self, signal: &TierSignal) -> bool {
        let key = (signal.title.clone(), signal.start, signal.tier);
        match self.cooldown.lock() {
            Ok(mut cooldown) => cooldown.should_speak(key),
            Err(e) => e.into_inner().should_speak(key),
        }
    }
}

#[async_trait]
impl Notifier for VoiceNotifier {
    async fn initialize(&self, _ctx: NotifierContext) {
        info!("voice notifier ready");
    }

    async fn notify(&self, signal: TierSignal) {
        let Some(text) = utterance(&signal, Utc::now()) else {
            return;
        };

        let Some(_guard) = self.in_flight.try_acquire() else {
            debug!("already speaking, dropping {}", signal);
            return;
        };

        if !self.should_speak(&signal) {
            return;
        }

        debug!("say \"{}\"", text);
        if let Err(e) = self.speaker.say(&text).await {
            warn!("failed to speak: {:#}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn create_signal(tier: NotificationTier, start: DateTime<Utc>) -> TierSignal {
        TierSignal {
            title: "Standup".to_string(),
            start,
            tier,
        }
    }

    fn recording_speaker(spoken: Arc<Mutex<Vec<String>>>) -> MockSpeaker {
        let mut mock = MockSpeaker::new();
        mock.expect_say().returning(move |text| {
            spoken.lock().unwrap().push(text.to_string());
            Ok(())
        });
        mock
    }

    #[test]
    fn test_utterances() {
        let now = Utc::now();
        let start = now + Duration::seconds(200);

        assert_eq!(
            utterance(&create_signal(NotificationTier::Pending, start), now).unwrap(),
            "Standup starts in 4 minutes"
        );
        assert_eq!(
            utterance(
                &create_signal(NotificationTier::Pending, now + Duration::seconds(60)),
                now
            )
            .unwrap(),
            "Standup starts in 1 minute"
        );
        assert_eq!(
            utterance(&create_signal(NotificationTier::AlmostThere, start), now).unwrap(),
            "Standup starts in less than a minute"
        );
        assert_eq!(
            utterance(&create_signal(NotificationTier::Starting, start), now).unwrap(),
            "Standup is starting now"
        );
        assert!(utterance(&create_signal(NotificationTier::Waiting, start), now).is_none());
        assert!(utterance(&create_signal(NotificationTier::Stop, start), now).is_none());
    }

    #[tokio::test]
    async fn test_cooldown_repeats_after_thirty_notifications() {
        let spoken = Arc::new(Mutex::new(vec![]));
        let notifier = VoiceNotifier::new(Arc::new(recording_speaker(spoken.clone())));
        let start = Utc::now() + Duration::seconds(30);

        for _ in 0..=COOLDOWN_NOTIFICATIONS {
            notifier
                .notify(create_signal(NotificationTier::AlmostThere, start))
                .await;
        }
        assert_eq!(spoken.lock().unwrap().len(), 1);

        notifier
            .notify(create_signal(NotificationTier::AlmostThere, start))
            .await;
        assert_eq!(spoken.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_tier_change_speaks_immediately() {
        let spoken = Arc::new(Mutex::new(vec![]));
        let notifier = VoiceNotifier::new(Arc::new(recording_speaker(spoken.clone())));
        let start = Utc::now() + Duration::seconds(30);

        notifier
            .notify(create_signal(NotificationTier::AlmostThere, start))
            .await;
        notifier
            .notify(create_signal(NotificationTier::Starting, start))
            .await;

        assert_eq!(
            *spoken.lock().unwrap(),
            vec![
                "Standup starts in less than a minute".to_string(),
                "Standup is starting now".to_string()
            ]
        );
    }

    #[tokio::test]
    async fn test_silent_tiers_never_speak() {
        let mut mock = MockSpeaker::new();
        mock.expect_say().times(0);
        let notifier = VoiceNotifier::new(Arc::new(mock));

        notifier
            .notify(create_signal(NotificationTier::Waiting, Utc::now()))
            .await;
        notifier
            .notify(create_signal(NotificationTier::Stop, Utc::now()))
            .await;
    }

    #[tokio::test]
    async fn test_speaker_failure_is_not_fatal() {
        let mut mock = MockSpeaker::new();
        mock.expect_say()
            .times(1)
            .returning(|_| Err(anyhow::anyhow!("no audio device")));
        let notifier = VoiceNotifier::new(Arc::new(mock));

        notifier
            .notify(create_signal(NotificationTier::Starting, Utc::now()))
            .await;
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_speaker() {
        let speaker = CommandSpeaker::new(&Voice {
            program: "true".to_string(),
            args: vec!["-v".to_string()],
        });
        assert!(speaker.say("hello").await.is_ok());

        let speaker = CommandSpeaker::new(&Voice {
            program: "false".to_string(),
            args: vec![],
        });
        assert!(speaker.say("hello").await.is_err());

        let speaker = CommandSpeaker::new(&Voice {
            program: "minder-missing-program".to_string(),
            args: vec![],
        });
        assert!(speaker.say("hello").await.is_err());
    }
}
