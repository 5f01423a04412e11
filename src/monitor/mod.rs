#[cfg(feature = "desktop")]
pub mod commands;
pub mod controller;
pub mod cooldown;
pub mod error;
pub mod state;
pub mod status;
pub mod wake;

pub use controller::{CycleReport, MonitorConfig, MonitorController, MonitorDeps};
pub use cooldown::CooldownTracker;
pub use error::MonitorError;
pub use state::{AlarmDetails, AlarmPhase, AlarmState, PersistedState, StatusSnapshot, StatusUpdate};
pub use status::{BroadcastStatusSink, StatusSink};
pub use wake::{spawn_wake_listener, TokioWakeTimer, WakeTimer};
