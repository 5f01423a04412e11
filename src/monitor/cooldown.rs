use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use log::debug;

const MAX_RETENTION_WINDOWS: u32 = 1_000;

/// Per-sender ledger of the last accepted alert.
///
/// This is the only gate against repeat alerts: a sender that fired less than
/// `window` ago is suppressed, and a suppressed match leaves its entry alone.
#[derive(Debug, Clone)]
pub struct CooldownTracker {
    window: Duration,
    retention: Duration,
    ledger: HashMap<String, DateTime<Utc>>,
}

impl CooldownTracker {
    /// `retention_windows` bounds the ledger: entries older than that many
    /// windows are dropped by [`CooldownTracker::sweep`].
    pub fn new(window: Duration, retention_windows: u32) -> Self {
        let multiplier = retention_windows.clamp(1, MAX_RETENTION_WINDOWS) as i32;
        let retention = window.checked_mul(multiplier).unwrap_or(Duration::MAX);
        Self {
            window,
            retention,
            ledger: HashMap::new(),
        }
    }

    fn key(source_identity: &str) -> String {
        source_identity.trim().to_lowercase()
    }

    pub fn accept(&mut self, source_identity: &str, now: DateTime<Utc>) -> bool {
        let key = Self::key(source_identity);
        match self.ledger.get(&key) {
            Some(last) if now.signed_duration_since(*last) < self.window => {
                debug!(
                    "cooldown: suppressing {key}, last alert {}s ago",
                    now.signed_duration_since(*last).num_seconds()
                );
                false
            }
            _ => {
                self.ledger.insert(key, now);
                true
            }
        }
    }

    pub fn last_trigger(&self, source_identity: &str) -> Option<DateTime<Utc>> {
        self.ledger.get(&Self::key(source_identity)).copied()
    }

    /// Drops entries that can no longer suppress anything. Returns how many
    /// were removed.
    pub fn sweep(&mut self, now: DateTime<Utc>) -> usize {
        let before = self.ledger.len();
        let retention = self.retention;
        self.ledger
            .retain(|_, last| now.signed_duration_since(*last) < retention);
        before - self.ledger.len()
    }

    pub fn len(&self) -> usize {
        self.ledger.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ledger.is_empty()
    }
}
