use std::{
    sync::atomic::{AtomicU64, Ordering},
    sync::Arc,
    time::Duration,
};

use async_trait::async_trait;
use log::{debug, warn};
use tauri::{AppHandle, Emitter, Manager, Runtime, UserAttentionType};
use tauri_plugin_notification::NotificationExt;

use super::{notification_body, AlertChannel, PresentationError, NOTIFICATION_TITLE};
use crate::monitor::state::AlarmDetails;

pub const ALARM_EVENT: &str = "alarm-raised";
pub const ALARM_CLEARED_EVENT: &str = "alarm-cleared";

fn failed(channel: &str, err: impl std::fmt::Display) -> PresentationError {
    PresentationError::Failed {
        channel: channel.into(),
        reason: err.to_string(),
    }
}

/// Brings the app's own windows to the user's attention and tells the UI.
pub struct VisualChannel<R: Runtime> {
    app: AppHandle<R>,
}

impl<R: Runtime> VisualChannel<R> {
    pub fn new(app: AppHandle<R>) -> Self {
        Self { app }
    }
}

#[async_trait]
impl<R: Runtime> AlertChannel for VisualChannel<R> {
    fn name(&self) -> &str {
        "visual"
    }

    async fn present(&self, alarm: &AlarmDetails) -> Result<(), PresentationError> {
        let windows = self.app.webview_windows();
        if windows.is_empty() {
            return Err(PresentationError::Unavailable {
                channel: self.name().into(),
                reason: "no window to flash".into(),
            });
        }

        for window in windows.values() {
            if let Err(err) = window.request_user_attention(Some(UserAttentionType::Critical)) {
                debug!("Attention request failed for {}: {err}", window.label());
            }
        }

        self.app
            .emit(ALARM_EVENT, alarm)
            .map_err(|err| failed(self.name(), err))
    }

    async fn silence(&self) -> Result<(), PresentationError> {
        for window in self.app.webview_windows().values() {
            let _ = window.request_user_attention(None);
        }
        self.app
            .emit(ALARM_CLEARED_EVENT, ())
            .map_err(|err| failed(self.name(), err))
    }
}

/// Shows a count badge on the app icon and clears it again after a delay.
pub struct BadgeChannel<R: Runtime> {
    app: AppHandle<R>,
    clear_after: Duration,
    // Bumped on every present so an old clear task never wipes a newer badge.
    generation: Arc<AtomicU64>,
}

impl<R: Runtime> BadgeChannel<R> {
    pub fn new(app: AppHandle<R>, clear_after: Duration) -> Self {
        Self {
            app,
            clear_after,
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    fn set_badge(app: &AppHandle<R>, count: Option<i64>) -> Result<(), String> {
        let mut last_err = None;
        let mut any = false;
        for window in app.webview_windows().values() {
            match window.set_badge_count(count) {
                Ok(()) => any = true,
                Err(err) => last_err = Some(err.to_string()),
            }
        }
        match (any, last_err) {
            (true, _) => Ok(()),
            (false, Some(err)) => Err(err),
            (false, None) => Err("no window to badge".into()),
        }
    }
}

#[async_trait]
impl<R: Runtime> AlertChannel for BadgeChannel<R> {
    fn name(&self) -> &str {
        "badge"
    }

    async fn present(&self, _alarm: &AlarmDetails) -> Result<(), PresentationError> {
        Self::set_badge(&self.app, Some(1)).map_err(|reason| PresentationError::Unavailable {
            channel: self.name().into(),
            reason,
        })?;

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let counter = Arc::clone(&self.generation);
        let app = self.app.clone();
        let delay = self.clear_after;
        tauri::async_runtime::spawn(async move {
            tokio::time::sleep(delay).await;
            if counter.load(Ordering::SeqCst) == generation {
                if let Err(err) = Self::set_badge(&app, None) {
                    debug!("Badge auto-clear skipped: {err}");
                }
            }
        });
        Ok(())
    }

    async fn silence(&self) -> Result<(), PresentationError> {
        self.generation.fetch_add(1, Ordering::SeqCst);
        Self::set_badge(&self.app, None).map_err(|reason| failed(self.name(), reason))
    }
}

/// Silent desktop notification; the alarm sound is the audible part.
pub struct NotificationChannel<R: Runtime> {
    app: AppHandle<R>,
    enabled: bool,
}

impl<R: Runtime> NotificationChannel<R> {
    pub fn new(app: AppHandle<R>, enabled: bool) -> Self {
        Self { app, enabled }
    }
}

#[async_trait]
impl<R: Runtime> AlertChannel for NotificationChannel<R> {
    fn name(&self) -> &str {
        "notification"
    }

    async fn present(&self, alarm: &AlarmDetails) -> Result<(), PresentationError> {
        if !self.enabled {
            return Err(PresentationError::Unavailable {
                channel: self.name().into(),
                reason: "notifications disabled in settings".into(),
            });
        }

        self.app
            .notification()
            .builder()
            .title(NOTIFICATION_TITLE)
            .body(notification_body(alarm))
            .silent()
            .show()
            .map_err(|err| {
                warn!("Notification failed: {err}");
                PresentationError::Unavailable {
                    channel: self.name().into(),
                    reason: err.to_string(),
                }
            })
    }

    async fn silence(&self) -> Result<(), PresentationError> {
        Ok(())
    }
}
