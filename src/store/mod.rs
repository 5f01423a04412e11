//! Durable key-value storage for controller state.
//!
//! The controller writes four keys together after every transition and reads
//! them back independently on restore, so a store that lost some of them (or
//! holds garbage under one) still yields a usable state.

use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use log::warn;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::monitor::state::{AlarmDetails, AlarmState, PersistedState};
use crate::rules::RuleSet;

pub const KEY_RULES: &str = "rules";
pub const KEY_ACTIVE: &str = "active";
pub const KEY_LAST_ALARM: &str = "lastAlarm";
pub const KEY_IS_RINGING: &str = "isRinging";

pub const STATE_KEYS: [&str; 4] = [KEY_RULES, KEY_ACTIVE, KEY_LAST_ALARM, KEY_IS_RINGING];

#[async_trait]
pub trait DurableStore: Send + Sync {
    /// Values for whichever of `keys` are present.
    async fn load(&self, keys: &[&str]) -> Result<HashMap<String, Value>>;

    /// Writes all entries as one unit where the backend allows it.
    async fn save(&self, entries: Vec<(String, Value)>) -> Result<()>;
}

/// In-process store. Used headless and in tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entries(entries: impl IntoIterator<Item = (String, Value)>) -> Self {
        Self {
            entries: Mutex::new(entries.into_iter().collect()),
        }
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.entries
            .lock()
            .ok()
            .and_then(|guard| guard.get(key).cloned())
    }
}

#[async_trait]
impl DurableStore for MemoryStore {
    async fn load(&self, keys: &[&str]) -> Result<HashMap<String, Value>> {
        let guard = self
            .entries
            .lock()
            .map_err(|_| anyhow!("memory store lock poisoned"))?;
        Ok(keys
            .iter()
            .filter_map(|key| guard.get(*key).map(|value| (key.to_string(), value.clone())))
            .collect())
    }

    async fn save(&self, entries: Vec<(String, Value)>) -> Result<()> {
        let mut guard = self
            .entries
            .lock()
            .map_err(|_| anyhow!("memory store lock poisoned"))?;
        guard.extend(entries);
        Ok(())
    }
}

fn decode_or_default<T: DeserializeOwned + Default>(
    values: &mut HashMap<String, Value>,
    key: &str,
) -> T {
    match values.remove(key) {
        None | Some(Value::Null) => T::default(),
        Some(value) => serde_json::from_value(value).unwrap_or_else(|err| {
            warn!("ignoring undecodable persisted '{key}': {err}");
            T::default()
        }),
    }
}

pub fn encode_state(state: &PersistedState) -> Result<Vec<(String, Value)>> {
    Ok(vec![
        (KEY_RULES.to_string(), serde_json::to_value(&state.rules)?),
        (KEY_ACTIVE.to_string(), Value::Bool(state.active)),
        (
            KEY_LAST_ALARM.to_string(),
            serde_json::to_value(&state.alarm.last_alarm)?,
        ),
        (KEY_IS_RINGING.to_string(), Value::Bool(state.alarm.is_ringing)),
    ])
}

/// Builds a state from whatever subset of keys was found.
pub fn decode_state(mut values: HashMap<String, Value>) -> PersistedState {
    let rules = match values.remove(KEY_RULES) {
        Some(value) => RuleSet::from_value(value),
        None => RuleSet::default(),
    };
    let active: bool = decode_or_default(&mut values, KEY_ACTIVE);
    let last_alarm: Option<AlarmDetails> = decode_or_default(&mut values, KEY_LAST_ALARM);
    let is_ringing: bool = decode_or_default(&mut values, KEY_IS_RINGING);

    PersistedState {
        rules,
        active,
        alarm: AlarmState {
            is_ringing,
            last_alarm,
        },
    }
}

pub async fn load_state(store: &dyn DurableStore) -> Result<PersistedState> {
    let values = store.load(&STATE_KEYS).await?;
    Ok(decode_state(values))
}

pub async fn save_state(store: &dyn DurableStore, state: &PersistedState) -> Result<()> {
    store.save(encode_state(state)?).await
}
