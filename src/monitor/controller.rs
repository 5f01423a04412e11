use std::{collections::HashMap, sync::Arc, time::Duration};

use log::{debug, error, info, warn};
use serde_json::Value;
use tokio::{sync::Mutex, task::JoinSet};
use uuid::Uuid;

use crate::{
    alert::AlertPresenter,
    matching::Match,
    rules::{Rule, RuleInput, RuleSet},
    store::{load_state, save_state, DurableStore},
    surface::{ObservationAgent, ObservationSurface, SurfaceDirectory},
    utils::Clock,
};

use super::{
    cooldown::CooldownTracker,
    error::{MonitorError, Result},
    state::{AlarmDetails, PersistedState, StatusSnapshot, StatusUpdate},
    status::StatusSink,
    wake::WakeTimer,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorConfig {
    pub check_interval: Duration,
    pub cooldown: Duration,
    pub settle_timeout: Duration,
    pub ledger_retention_windows: u32,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_secs(10),
            cooldown: Duration::from_secs(30),
            settle_timeout: Duration::from_millis(3000),
            ledger_retention_windows: 10,
        }
    }
}

/// Collaborators the controller drives but does not own.
pub struct MonitorDeps {
    pub store: Arc<dyn DurableStore>,
    pub surfaces: Arc<dyn SurfaceDirectory>,
    pub presenter: AlertPresenter,
    pub status: Arc<dyn StatusSink>,
    pub wake_timer: Arc<dyn WakeTimer>,
    pub clock: Arc<dyn Clock>,
}

/// Outcome of one inspection cycle, mostly for logging and tests.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub surfaces: usize,
    pub unreachable: Vec<String>,
    pub matches: usize,
    pub alerts: usize,
}

struct MonitorState {
    persisted: PersistedState,
    cooldown: CooldownTracker,
}

/// Sole owner of rules, lifecycle, alarm state and the cooldown ledger.
///
/// Every mutation happens under one lock and is persisted before the lock is
/// released, so concurrent reports, acknowledgements and stops resolve
/// last-write-wins and the durable copy trails memory by at most one
/// operation.
#[derive(Clone)]
pub struct MonitorController {
    state: Arc<Mutex<MonitorState>>,
    agents: Arc<Mutex<HashMap<String, Arc<ObservationAgent>>>>,
    deps: Arc<MonitorDeps>,
    config: MonitorConfig,
}

impl MonitorController {
    pub fn new(deps: MonitorDeps, config: MonitorConfig) -> Self {
        let cooldown_window = chrono::Duration::from_std(config.cooldown)
            .unwrap_or_else(|_| chrono::Duration::seconds(30));

        Self {
            state: Arc::new(Mutex::new(MonitorState {
                persisted: PersistedState::default(),
                cooldown: CooldownTracker::new(cooldown_window, config.ledger_retention_windows),
            })),
            agents: Arc::new(Mutex::new(HashMap::new())),
            deps: Arc::new(deps),
            config,
        }
    }

    /// Restores state from the durable store. If monitoring was active it
    /// resumes right away: one inspection now, then the regular schedule.
    pub async fn init(&self) -> Result<StatusSnapshot> {
        let restored = load_state(self.deps.store.as_ref())
            .await
            .map_err(MonitorError::Store)?;

        let snapshot = {
            let mut state = self.state.lock().await;
            state.persisted = restored;
            state.persisted.snapshot()
        };

        info!(
            "Monitor restored: active={}, rules={}, ringing={}",
            snapshot.active,
            snapshot.rules.len(),
            snapshot.is_ringing
        );
        self.broadcast(&snapshot);

        if snapshot.active {
            info!("Monitoring was active before shutdown; resuming");
            self.perform_inspection_cycle().await;
            self.arm_next_if_active().await;
        }

        Ok(self.get_status().await)
    }

    /// Stops scheduling and forgets per-surface agents. Persisted state is
    /// left as-is so the next `init` resumes from it.
    pub async fn teardown(&self) {
        self.deps.wake_timer.disarm();
        self.agents.lock().await.clear();
        info!("Monitor torn down");
    }

    pub async fn get_status(&self) -> StatusSnapshot {
        self.state.lock().await.persisted.snapshot()
    }

    pub async fn set_rules(&self, rules: RuleSet) -> Result<StatusSnapshot> {
        self.mutate(|persisted| {
            info!("Rules replaced ({} -> {})", persisted.rules.len(), rules.len());
            persisted.rules = rules;
            Ok(())
        })
        .await
    }

    /// Untyped variant for UI callers: anything but a list becomes no rules.
    pub async fn set_rules_value(&self, rules: Value) -> Result<StatusSnapshot> {
        self.set_rules(RuleSet::from_value(rules)).await
    }

    pub async fn add_rule(&self, input: RuleInput) -> Result<StatusSnapshot> {
        self.mutate(|persisted| {
            let added = persisted.rules.add(input)?;
            info!(
                "Rule added: source='{}' keyword='{}'",
                added.source_pattern, added.keyword_pattern
            );
            Ok(())
        })
        .await
    }

    pub async fn remove_rule(&self, index: usize) -> Result<StatusSnapshot> {
        self.mutate(|persisted| {
            let removed = persisted.rules.remove(index)?;
            info!("Rule removed: source='{}'", removed.source_pattern);
            Ok(())
        })
        .await
    }

    pub async fn start(&self) -> Result<StatusSnapshot> {
        let (snapshot, persisted) = {
            let mut state = self.state.lock().await;
            if state.persisted.rules.is_empty() {
                info!("Start refused: no rules configured");
                return Err(MonitorError::NoRulesConfigured);
            }
            if state.persisted.active {
                debug!("Start requested while already active");
                return Ok(state.persisted.snapshot());
            }

            state.persisted.active = true;
            let persisted = self.persist(&state.persisted).await;
            (state.persisted.snapshot(), persisted)
        };

        info!("Monitoring started. {}", snapshot.summary());
        self.broadcast(&snapshot);

        self.perform_inspection_cycle().await;
        self.arm_next_if_active().await;

        persisted?;
        Ok(self.get_status().await)
    }

    /// Cancels future cycles only. A cycle already running finishes and its
    /// matches are still applied.
    pub async fn stop(&self) -> Result<StatusSnapshot> {
        let (snapshot, persisted) = {
            let mut state = self.state.lock().await;
            if !state.persisted.active {
                self.deps.wake_timer.disarm();
                return Ok(state.persisted.snapshot());
            }

            state.persisted.active = false;
            self.deps.wake_timer.disarm();
            let persisted = self.persist(&state.persisted).await;
            (state.persisted.snapshot(), persisted)
        };

        info!("Monitoring stopped");
        self.broadcast(&snapshot);
        persisted.map(|_| snapshot)
    }

    pub async fn acknowledge_alarm(&self) -> Result<StatusSnapshot> {
        let (snapshot, persisted) = {
            let mut state = self.state.lock().await;
            let was_ringing = state.persisted.alarm.acknowledge();
            let persisted = self.persist(&state.persisted).await;

            // Silenced under the lock so a concurrent new alert cannot be
            // cut off by a stale acknowledgement.
            let report = self.deps.presenter.silence().await;
            if !report.is_complete() {
                warn!("Alarm silenced with {} channel failures", report.failed.len());
            }

            if was_ringing {
                info!("Alarm acknowledged");
            }
            (state.persisted.snapshot(), persisted)
        };

        self.broadcast(&snapshot);
        persisted.map(|_| snapshot)
    }

    pub async fn on_wake_timer_fired(&self) {
        {
            let state = self.state.lock().await;
            if !state.persisted.active {
                debug!("Wake timer fired while inactive; disarming");
                self.deps.wake_timer.disarm();
                return;
            }
        }

        self.perform_inspection_cycle().await;
        self.arm_next_if_active().await;
    }

    /// Gates a reported match through the cooldown ledger. Returns whether it
    /// raised an alert.
    pub async fn on_match_reported(&self, reported: Match) -> Result<bool> {
        let (snapshot, persisted) = {
            let mut state = self.state.lock().await;
            let now = self.deps.clock.now();

            if !state.cooldown.accept(&reported.source_identity, now) {
                debug!(
                    "Match from {} suppressed by cooldown",
                    reported.source_identity
                );
                return Ok(false);
            }

            let details = AlarmDetails::from_match(&reported, now);
            state.persisted.alarm.ring(details.clone());
            let persisted = self.persist(&state.persisted).await;

            info!(
                "Alarm raised: '{}' from {} (rule '{}')",
                details.subject, details.from, reported.matched_rule.source_pattern
            );

            let report = self.deps.presenter.present(&details).await;
            if !report.is_complete() {
                warn!(
                    "Alarm is ringing but {} of {} channels failed",
                    report.failed.len(),
                    report.failed.len() + report.delivered.len()
                );
            }

            (state.persisted.snapshot(), persisted)
        };

        self.broadcast(&snapshot);
        persisted.map(|_| true)
    }

    /// Asks every open surface to inspect itself and applies the results in
    /// arrival order. Per-surface failures are logged and retried next cycle.
    pub async fn perform_inspection_cycle(&self) -> CycleReport {
        let cycle_id = Uuid::new_v4();
        let rules: Arc<[Rule]> = {
            let mut state = self.state.lock().await;
            let swept = state.cooldown.sweep(self.deps.clock.now());
            if swept > 0 {
                debug!("Cycle {cycle_id}: dropped {swept} stale cooldown entries");
            }
            state.persisted.rules.as_slice().into()
        };

        let surfaces = self.deps.surfaces.surfaces().await;
        let mut report = CycleReport {
            surfaces: surfaces.len(),
            ..CycleReport::default()
        };

        if surfaces.is_empty() {
            info!("Cycle {cycle_id}: no observation surfaces open");
            return report;
        }

        let agents = self.agents_for(surfaces).await;
        let mut inspections = JoinSet::new();
        for agent in agents {
            let rules = Arc::clone(&rules);
            inspections.spawn(async move {
                let surface_id = agent.surface_id().to_string();
                let outcome = agent.inspect(&rules).await;
                (surface_id, outcome)
            });
        }

        while let Some(joined) = inspections.join_next().await {
            match joined {
                Ok((_, Ok(matches))) => {
                    report.matches += matches.len();
                    for reported in matches {
                        match self.on_match_reported(reported).await {
                            Ok(true) => report.alerts += 1,
                            Ok(false) => {}
                            Err(err) => {
                                report.alerts += 1;
                                error!("Cycle {cycle_id}: alert raised but not persisted: {err}");
                            }
                        }
                    }
                }
                Ok((surface_id, Err(err))) => {
                    warn!("Cycle {cycle_id}: {err}; retrying next cycle");
                    report.unreachable.push(surface_id);
                }
                Err(join_err) => {
                    error!("Cycle {cycle_id}: inspection task failed: {join_err}");
                }
            }
        }

        info!(
            "Cycle {cycle_id}: {} surfaces, {} unreachable, {} matches, {} alerts",
            report.surfaces,
            report.unreachable.len(),
            report.matches,
            report.alerts
        );
        report
    }

    async fn agents_for(
        &self,
        surfaces: Vec<Arc<dyn ObservationSurface>>,
    ) -> Vec<Arc<ObservationAgent>> {
        let mut agents = self.agents.lock().await;
        agents.retain(|id, _| surfaces.iter().any(|surface| surface.id() == id));

        surfaces
            .into_iter()
            .map(|surface| {
                let current = agents
                    .get(surface.id())
                    .filter(|agent| Arc::ptr_eq(agent.surface(), &surface))
                    .cloned();

                current.unwrap_or_else(|| {
                    let agent = Arc::new(ObservationAgent::new(
                        Arc::clone(&surface),
                        self.config.settle_timeout,
                        Arc::clone(&self.deps.clock),
                    ));
                    agents.insert(surface.id().to_string(), Arc::clone(&agent));
                    agent
                })
            })
            .collect()
    }

    async fn arm_next_if_active(&self) {
        let state = self.state.lock().await;
        if state.persisted.active {
            let now = self.deps.clock.now();
            let interval = chrono::Duration::from_std(self.config.check_interval)
                .unwrap_or_else(|_| chrono::Duration::seconds(10));
            let deadline = now.checked_add_signed(interval).unwrap_or_else(|| {
                warn!(
                    "check interval {:?} overflows the clock; using 10s",
                    self.config.check_interval
                );
                now + chrono::Duration::seconds(10)
            });
            self.deps.wake_timer.arm(deadline);
        } else {
            self.deps.wake_timer.disarm();
        }
    }

    /// Applies a rule-set edit, persists, broadcasts.
    async fn mutate<F>(&self, edit: F) -> Result<StatusSnapshot>
    where
        F: FnOnce(&mut PersistedState) -> Result<()>,
    {
        let (snapshot, persisted) = {
            let mut state = self.state.lock().await;
            edit(&mut state.persisted)?;
            let persisted = self.persist(&state.persisted).await;
            (state.persisted.snapshot(), persisted)
        };

        self.broadcast(&snapshot);
        persisted.map(|_| snapshot)
    }

    async fn persist(&self, persisted: &PersistedState) -> Result<()> {
        save_state(self.deps.store.as_ref(), persisted)
            .await
            .map_err(|err| {
                error!("Failed to persist monitor state: {err:#}");
                MonitorError::Store(err)
            })
    }

    fn broadcast(&self, snapshot: &StatusSnapshot) {
        self.deps
            .status
            .publish(&StatusUpdate::from(snapshot.clone()));
    }
}
