use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::matching::Match;
use crate::rules::{Rule, RuleSet};

/// What the most recent alert was about. Kept for display after the alarm
/// has been acknowledged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlarmDetails {
    pub from: String,
    pub subject: String,
    pub time: DateTime<Utc>,
}

impl AlarmDetails {
    pub fn from_match(matched: &Match, time: DateTime<Utc>) -> Self {
        Self {
            from: matched.source_identity.clone(),
            subject: matched.subject.clone(),
            time,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AlarmPhase {
    Idle,
    Ringing,
}

/// Idle -> Ringing on an accepted match, Ringing -> Idle on acknowledge.
/// Nothing else moves it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlarmState {
    pub is_ringing: bool,
    pub last_alarm: Option<AlarmDetails>,
}

impl AlarmState {
    pub fn phase(&self) -> AlarmPhase {
        if self.is_ringing {
            AlarmPhase::Ringing
        } else {
            AlarmPhase::Idle
        }
    }

    /// Overwrites `last_alarm`; a second ring while already ringing just
    /// replaces the details.
    pub fn ring(&mut self, details: AlarmDetails) {
        self.is_ringing = true;
        self.last_alarm = Some(details);
    }

    /// Returns whether the alarm was ringing. `last_alarm` is left in place.
    pub fn acknowledge(&mut self) -> bool {
        std::mem::replace(&mut self.is_ringing, false)
    }
}

/// Read-only view handed to UIs. Serialized field names are the wire contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSnapshot {
    pub active: bool,
    pub rules: Vec<Rule>,
    pub last_alarm: Option<AlarmDetails>,
    pub is_ringing: bool,
}

impl StatusSnapshot {
    pub fn summary(&self) -> String {
        let noun = if self.rules.len() == 1 { "host" } else { "hosts" };
        format!("Listening to {} defined {}", self.rules.len(), noun)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatusKind {
    #[serde(rename = "statusUpdate")]
    StatusUpdate,
}

/// Status broadcast payload: `{ "kind": "statusUpdate", ...snapshot }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub kind: StatusKind,
    #[serde(flatten)]
    pub status: StatusSnapshot,
}

impl From<StatusSnapshot> for StatusUpdate {
    fn from(status: StatusSnapshot) -> Self {
        Self {
            kind: StatusKind::StatusUpdate,
            status,
        }
    }
}

/// Everything the controller owns that survives a restart, in the shape the
/// durable store keeps it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PersistedState {
    pub rules: RuleSet,
    pub active: bool,
    pub alarm: AlarmState,
}

impl PersistedState {
    pub fn snapshot(&self) -> StatusSnapshot {
        StatusSnapshot {
            active: self.active,
            rules: self.rules.as_slice().to_vec(),
            last_alarm: self.alarm.last_alarm.clone(),
            is_ringing: self.alarm.is_ringing,
        }
    }
}
