use anyhow::{Context, Result};
use log::warn;
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf, sync::RwLock, time::Duration};

use crate::monitor::MonitorConfig;

const MAX_CHECK_INTERVAL_SECS: u64 = 24 * 60 * 60;
const MAX_COOLDOWN_SECS: u64 = 24 * 60 * 60;
const MAX_SETTLE_TIMEOUT_MS: u64 = 60_000;
const MAX_RETENTION_WINDOWS: u32 = 1_000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AlarmSoundSettings {
    pub enabled: bool,
    pub volume: f32,
}

impl Default for AlarmSoundSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            volume: 0.8,
        }
    }
}

/// User-tunable knobs. Read once at launch; edits apply on the next launch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppSettings {
    pub check_interval_secs: u64,
    pub cooldown_secs: u64,
    pub settle_timeout_ms: u64,
    pub ledger_retention_windows: u32,
    pub surface_host: String,
    pub alarm_sound: AlarmSoundSettings,
    pub notifications_enabled: bool,
    pub badge_clear_secs: u64,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            check_interval_secs: 10,
            cooldown_secs: 30,
            settle_timeout_ms: 3000,
            ledger_retention_windows: 10,
            surface_host: "mail.google.com".into(),
            alarm_sound: AlarmSoundSettings::default(),
            notifications_enabled: true,
            badge_clear_secs: 6,
        }
    }
}

impl AppSettings {
    /// Values outside the supported range are clamped, never rejected, so a
    /// hand-edited file cannot keep monitoring from starting.
    pub fn monitor_config(&self) -> MonitorConfig {
        MonitorConfig {
            check_interval: Duration::from_secs(
                self.check_interval_secs.clamp(1, MAX_CHECK_INTERVAL_SECS),
            ),
            cooldown: Duration::from_secs(self.cooldown_secs.clamp(1, MAX_COOLDOWN_SECS)),
            settle_timeout: Duration::from_millis(
                self.settle_timeout_ms.clamp(1, MAX_SETTLE_TIMEOUT_MS),
            ),
            ledger_retention_windows: self
                .ledger_retention_windows
                .clamp(1, MAX_RETENTION_WINDOWS),
        }
    }

    pub fn badge_clear_after(&self) -> Duration {
        Duration::from_secs(self.badge_clear_secs)
    }
}

pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<AppSettings>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_else(|err| {
                warn!("Ignoring unreadable settings at {}: {err}", path.display());
                AppSettings::default()
            })
        } else {
            AppSettings::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn get(&self) -> AppSettings {
        match self.data.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn update(&self, settings: AppSettings) -> Result<()> {
        let mut guard = match self.data.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        self.persist(&settings)?;
        *guard = settings;
        Ok(())
    }

    fn persist(&self, data: &AppSettings) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::new(dir.path().join("settings.json")).unwrap();
        assert_eq!(store.get(), AppSettings::default());
    }

    #[test]
    fn corrupt_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, "{ not json").unwrap();

        let store = SettingsStore::new(path).unwrap();
        assert_eq!(store.get(), AppSettings::default());
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, r#"{ "cooldownSecs": 45, "alarmSound": { "volume": 0.3 } }"#).unwrap();

        let settings = SettingsStore::new(path).unwrap().get();
        assert_eq!(settings.cooldown_secs, 45);
        assert_eq!(settings.check_interval_secs, 10);
        assert!(settings.alarm_sound.enabled);
        assert_eq!(settings.alarm_sound.volume, 0.3);
    }

    #[test]
    fn updates_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");

        let store = SettingsStore::new(path.clone()).unwrap();
        let mut settings = store.get();
        settings.surface_host = "mail.example.com".into();
        settings.notifications_enabled = false;
        store.update(settings.clone()).unwrap();

        let reopened = SettingsStore::new(path).unwrap();
        assert_eq!(reopened.get(), settings);
    }

    #[test]
    fn monitor_config_clamps_zero_values() {
        let settings = AppSettings {
            check_interval_secs: 0,
            cooldown_secs: 0,
            settle_timeout_ms: 0,
            ledger_retention_windows: 0,
            ..AppSettings::default()
        };

        let config = settings.monitor_config();
        assert_eq!(config.check_interval, Duration::from_secs(1));
        assert_eq!(config.cooldown, Duration::from_secs(1));
        assert_eq!(config.settle_timeout, Duration::from_millis(1));
        assert_eq!(config.ledger_retention_windows, 1);
    }

    #[test]
    fn monitor_config_caps_huge_values() {
        let settings = AppSettings {
            check_interval_secs: 9_000_000_000_000,
            cooldown_secs: u64::MAX,
            settle_timeout_ms: u64::MAX,
            ledger_retention_windows: u32::MAX,
            ..AppSettings::default()
        };

        let config = settings.monitor_config();
        assert_eq!(config.check_interval, Duration::from_secs(86_400));
        assert_eq!(config.cooldown, Duration::from_secs(86_400));
        assert_eq!(config.settle_timeout, Duration::from_millis(60_000));
        assert_eq!(config.ledger_retention_windows, 1_000);
    }

    #[test]
    fn default_monitor_config_matches_controller_defaults() {
        assert_eq!(AppSettings::default().monitor_config(), MonitorConfig::default());
    }
}
