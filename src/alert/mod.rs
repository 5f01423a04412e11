//! Alert presentation.
//!
//! An alert goes out on several independent channels (sound, visual, badge,
//! desktop notification, in-surface banner). A channel that fails is logged
//! and skipped; the alarm state has already moved to ringing by then.

#[cfg(feature = "desktop")]
pub mod desktop;
#[cfg(feature = "sound")]
pub mod sound;
pub mod surface_channel;
pub mod tone;

use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, warn};
use thiserror::Error;

use crate::monitor::state::AlarmDetails;

pub use surface_channel::SurfaceAlertChannel;

pub const NOTIFICATION_TITLE: &str = "Email Match Found!";

pub fn notification_body(alarm: &AlarmDetails) -> String {
    format!("Matched email from {}", alarm.from)
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PresentationError {
    /// The host lacks the capability or the permission for this channel.
    #[error("{channel} unavailable: {reason}")]
    Unavailable { channel: String, reason: String },

    #[error("{channel} failed: {reason}")]
    Failed { channel: String, reason: String },
}

#[async_trait]
pub trait AlertChannel: Send + Sync {
    fn name(&self) -> &str;

    async fn present(&self, alarm: &AlarmDetails) -> Result<(), PresentationError>;

    async fn silence(&self) -> Result<(), PresentationError>;
}

/// Which channels took an alert and which refused it.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PresentationReport {
    pub delivered: Vec<String>,
    pub failed: Vec<(String, PresentationError)>,
}

impl PresentationReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

#[derive(Clone, Default)]
pub struct AlertPresenter {
    channels: Vec<Arc<dyn AlertChannel>>,
}

impl AlertPresenter {
    pub fn new(channels: Vec<Arc<dyn AlertChannel>>) -> Self {
        Self { channels }
    }

    pub fn with_channel(mut self, channel: Arc<dyn AlertChannel>) -> Self {
        self.channels.push(channel);
        self
    }

    pub async fn present(&self, alarm: &AlarmDetails) -> PresentationReport {
        let mut report = PresentationReport::default();
        for channel in &self.channels {
            match channel.present(alarm).await {
                Ok(()) => {
                    debug!("alert presented on {}", channel.name());
                    report.delivered.push(channel.name().to_string());
                }
                Err(err) => {
                    warn!("alert channel {} failed to present: {err}", channel.name());
                    report.failed.push((channel.name().to_string(), err));
                }
            }
        }
        report
    }

    pub async fn silence(&self) -> PresentationReport {
        let mut report = PresentationReport::default();
        for channel in &self.channels {
            match channel.silence().await {
                Ok(()) => report.delivered.push(channel.name().to_string()),
                Err(err) => {
                    warn!("alert channel {} failed to silence: {err}", channel.name());
                    report.failed.push((channel.name().to_string(), err));
                }
            }
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingChannel {
        name: &'static str,
        fail: bool,
        presented: AtomicUsize,
        silenced: AtomicUsize,
    }

    impl CountingChannel {
        fn new(name: &'static str, fail: bool) -> Arc<Self> {
            Arc::new(Self {
                name,
                fail,
                presented: AtomicUsize::new(0),
                silenced: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl AlertChannel for CountingChannel {
        fn name(&self) -> &str {
            self.name
        }

        async fn present(&self, _alarm: &AlarmDetails) -> Result<(), PresentationError> {
            self.presented.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(PresentationError::Unavailable {
                    channel: self.name.into(),
                    reason: "permission denied".into(),
                });
            }
            Ok(())
        }

        async fn silence(&self) -> Result<(), PresentationError> {
            self.silenced.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn alarm() -> AlarmDetails {
        AlarmDetails {
            from: "noreply@upwork.com".into(),
            subject: "New job".into(),
            time: Utc::now(),
        }
    }

    #[tokio::test]
    async fn one_failing_channel_does_not_stop_the_others() {
        let sound = CountingChannel::new("sound", false);
        let notification = CountingChannel::new("notification", true);
        let badge = CountingChannel::new("badge", false);
        let presenter = AlertPresenter::new(vec![
            sound.clone() as Arc<dyn AlertChannel>,
            notification.clone() as Arc<dyn AlertChannel>,
            badge.clone() as Arc<dyn AlertChannel>,
        ]);

        let report = presenter.present(&alarm()).await;

        assert_eq!(report.delivered, vec!["sound", "badge"]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, "notification");
        assert!(!report.is_complete());
        assert_eq!(badge.presented.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn silence_reaches_every_channel() {
        let sound = CountingChannel::new("sound", false);
        let badge = CountingChannel::new("badge", true);
        let presenter = AlertPresenter::default()
            .with_channel(sound.clone())
            .with_channel(badge.clone());

        let report = presenter.silence().await;
        assert!(report.is_complete());
        assert_eq!(sound.silenced.load(Ordering::SeqCst), 1);
        assert_eq!(badge.silenced.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn notification_text_names_the_sender() {
        assert_eq!(notification_body(&alarm()), "Matched email from noreply@upwork.com");
    }
}
