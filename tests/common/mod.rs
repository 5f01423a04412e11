#![allow(dead_code)]

use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc, Mutex,
};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;
use tokio::sync::Notify;

use mailwatch_lib::{
    surface::RefreshOutcome, AlarmDetails, AlertChannel, AlertPresenter, Clock, DurableStore,
    ManualClock, MemoryStore, MonitorConfig, MonitorController, MonitorDeps,
    ObservationSurface, PresentationError, StaticDirectory, StatusSink, StatusUpdate,
    SurfaceDirectory, SurfaceEntry, SurfaceError, WakeTimer,
};

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap()
}

pub fn entry(key: &str, sender: &str, subject: &str) -> SurfaceEntry {
    SurfaceEntry {
        key: key.to_string(),
        sender: Some(sender.to_string()),
        subject: subject.to_string(),
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap()
}

/// Pauses a surface inside `unprocessed_entries` until released.
#[derive(Default)]
pub struct Gate {
    pub entered: Notify,
    pub release: Notify,
}

/// In-memory inbox. Marked rows disappear from later scans.
pub struct ScriptedSurface {
    id: String,
    entries: Mutex<Vec<SurfaceEntry>>,
    unreachable: AtomicBool,
    gate: Mutex<Option<Arc<Gate>>>,
    pub refreshes: AtomicUsize,
    pub alerts_shown: Mutex<Vec<String>>,
}

impl ScriptedSurface {
    pub fn new(id: &str) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_string(),
            entries: Mutex::new(Vec::new()),
            unreachable: AtomicBool::new(false),
            gate: Mutex::new(None),
            refreshes: AtomicUsize::new(0),
            alerts_shown: Mutex::new(Vec::new()),
        })
    }

    pub fn push(&self, entry: SurfaceEntry) {
        lock(&self.entries).push(entry);
    }

    pub fn remaining(&self) -> Vec<String> {
        lock(&self.entries).iter().map(|e| e.key.clone()).collect()
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    pub fn install_gate(&self) -> Arc<Gate> {
        let gate = Arc::new(Gate::default());
        *lock(&self.gate) = Some(Arc::clone(&gate));
        gate
    }

    pub fn refresh_count(&self) -> usize {
        self.refreshes.load(Ordering::SeqCst)
    }

    fn check_reachable(&self) -> Result<(), SurfaceError> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(SurfaceError::Unreachable {
                surface: self.id.clone(),
                reason: "tab closed".into(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ObservationSurface for ScriptedSurface {
    fn id(&self) -> &str {
        &self.id
    }

    async fn refresh(&self) -> Result<RefreshOutcome, SurfaceError> {
        self.refreshes.fetch_add(1, Ordering::SeqCst);
        self.check_reachable()?;
        Ok(RefreshOutcome::NoAffordance)
    }

    async fn wait_for_change(&self) -> Result<(), SurfaceError> {
        Ok(())
    }

    async fn unprocessed_entries(&self) -> Result<Vec<SurfaceEntry>, SurfaceError> {
        self.check_reachable()?;
        let gate = lock(&self.gate).take();
        if let Some(gate) = gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }
        Ok(lock(&self.entries).clone())
    }

    async fn mark_processed(&self, keys: &[String]) -> Result<(), SurfaceError> {
        lock(&self.entries).retain(|entry| !keys.contains(&entry.key));
        Ok(())
    }

    async fn present_alert(&self, from: &str) -> Result<(), SurfaceError> {
        self.check_reachable()?;
        lock(&self.alerts_shown).push(from.to_string());
        Ok(())
    }

    async fn silence_alert(&self) -> Result<(), SurfaceError> {
        Ok(())
    }
}

/// Alert channel that remembers what it was asked to do.
pub struct RecordingChannel {
    failing: bool,
    pub presented: Mutex<Vec<AlarmDetails>>,
    pub silenced: AtomicUsize,
}

impl RecordingChannel {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            failing: false,
            presented: Mutex::new(Vec::new()),
            silenced: AtomicUsize::new(0),
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            failing: true,
            presented: Mutex::new(Vec::new()),
            silenced: AtomicUsize::new(0),
        })
    }

    pub fn presented(&self) -> Vec<AlarmDetails> {
        lock(&self.presented).clone()
    }

    pub fn silence_count(&self) -> usize {
        self.silenced.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AlertChannel for RecordingChannel {
    fn name(&self) -> &str {
        "recording"
    }

    async fn present(&self, alarm: &AlarmDetails) -> Result<(), PresentationError> {
        lock(&self.presented).push(alarm.clone());
        if self.failing {
            return Err(PresentationError::Unavailable {
                channel: "recording".into(),
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

#[derive(Default)]
pub struct RecordingWakeTimer {
    deadline: Mutex<Option<DateTime<Utc>>>,
    pub arms: Mutex<Vec<DateTime<Utc>>>,
}

impl RecordingWakeTimer {
    pub fn arm_count(&self) -> usize {
        lock(&self.arms).len()
    }
}

impl WakeTimer for RecordingWakeTimer {
    fn arm(&self, deadline: DateTime<Utc>) {
        *lock(&self.deadline) = Some(deadline);
        lock(&self.arms).push(deadline);
    }

    fn disarm(&self) {
        *lock(&self.deadline) = None;
    }

    fn deadline(&self) -> Option<DateTime<Utc>> {
        *lock(&self.deadline)
    }
}

#[derive(Default)]
pub struct RecordingSink {
    pub updates: Mutex<Vec<StatusUpdate>>,
}

impl RecordingSink {
    pub fn updates(&self) -> Vec<StatusUpdate> {
        lock(&self.updates).clone()
    }
}

impl StatusSink for RecordingSink {
    fn publish(&self, update: &StatusUpdate) {
        lock(&self.updates).push(update.clone());
    }
}

/// Loads fine, refuses every write.
#[derive(Default)]
pub struct ReadOnlyStore;

#[async_trait]
impl DurableStore for ReadOnlyStore {
    async fn load(&self, _keys: &[&str]) -> Result<std::collections::HashMap<String, Value>> {
        Ok(Default::default())
    }

    async fn save(&self, _entries: Vec<(String, Value)>) -> Result<()> {
        Err(anyhow!("disk full"))
    }
}

pub struct Harness {
    pub controller: MonitorController,
    pub store: Arc<MemoryStore>,
    pub directory: Arc<StaticDirectory>,
    pub channel: Arc<RecordingChannel>,
    pub timer: Arc<RecordingWakeTimer>,
    pub clock: Arc<ManualClock>,
    pub sink: Arc<RecordingSink>,
}

pub struct HarnessBuilder {
    store: Arc<MemoryStore>,
    durable: Option<Arc<dyn DurableStore>>,
    channel: Arc<RecordingChannel>,
    surfaces: Vec<Arc<ScriptedSurface>>,
    config: MonitorConfig,
}

impl HarnessBuilder {
    pub fn config(mut self, config: MonitorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn store(mut self, store: Arc<MemoryStore>) -> Self {
        self.store = store;
        self
    }

    pub fn durable(mut self, durable: Arc<dyn DurableStore>) -> Self {
        self.durable = Some(durable);
        self
    }

    pub fn channel(mut self, channel: Arc<RecordingChannel>) -> Self {
        self.channel = channel;
        self
    }

    pub fn surface(mut self, surface: Arc<ScriptedSurface>) -> Self {
        self.surfaces.push(surface);
        self
    }

    pub fn build(self) -> Harness {
        let directory = Arc::new(StaticDirectory::new(
            self.surfaces
                .into_iter()
                .map(|surface| surface as Arc<dyn ObservationSurface>)
                .collect(),
        ));
        let timer = Arc::new(RecordingWakeTimer::default());
        let clock = Arc::new(ManualClock::new(t0()));
        let sink = Arc::new(RecordingSink::default());
        let durable = self
            .durable
            .unwrap_or_else(|| Arc::clone(&self.store) as Arc<dyn DurableStore>);

        let controller = MonitorController::new(
            MonitorDeps {
                store: durable,
                surfaces: Arc::clone(&directory) as Arc<dyn SurfaceDirectory>,
                presenter: AlertPresenter::default()
                    .with_channel(Arc::clone(&self.channel) as Arc<dyn AlertChannel>),
                status: Arc::clone(&sink) as Arc<dyn StatusSink>,
                wake_timer: Arc::clone(&timer) as Arc<dyn WakeTimer>,
                clock: Arc::clone(&clock) as Arc<dyn Clock>,
            },
            self.config,
        );

        Harness {
            controller,
            store: self.store,
            directory,
            channel: self.channel,
            timer,
            clock,
            sink,
        }
    }
}

impl Harness {
    pub fn builder() -> HarnessBuilder {
        HarnessBuilder {
            store: Arc::new(MemoryStore::new()),
            durable: None,
            channel: RecordingChannel::new(),
            surfaces: Vec::new(),
            config: MonitorConfig::default(),
        }
    }
}
