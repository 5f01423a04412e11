//! Observation surfaces: live views of a message list that the core can
//! refresh, scan and annotate, but does not own.

pub mod agent;
#[cfg(feature = "desktop")]
pub mod webview;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::matching::ObservedItem;

pub use agent::ObservationAgent;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SurfaceError {
    /// The surface is gone or not ready (page still loading, window closed).
    #[error("surface {surface} is unreachable: {reason}")]
    Unreachable { surface: String, reason: String },

    #[error("surface {surface} script failed: {reason}")]
    Script { surface: String, reason: String },

    #[error("surface {surface} did not answer within {waited_ms}ms")]
    Timeout { surface: String, waited_ms: u64 },
}

impl SurfaceError {
    pub fn surface(&self) -> &str {
        match self {
            SurfaceError::Unreachable { surface, .. }
            | SurfaceError::Script { surface, .. }
            | SurfaceError::Timeout { surface, .. } => surface,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    Triggered,
    /// The surface has no refresh control; scan it as-is.
    NoAffordance,
}

/// One unprocessed row as reported by the surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SurfaceEntry {
    /// Surface-local handle used to mark the row processed.
    pub key: String,
    /// Address attribute when present, else the displayed sender text.
    #[serde(default)]
    pub sender: Option<String>,
    #[serde(default)]
    pub subject: String,
}

impl SurfaceEntry {
    /// `None` when the row has no usable sender and cannot be matched.
    pub fn observed_item(&self) -> Option<ObservedItem> {
        let sender = self.sender.as_deref().map(str::trim).unwrap_or_default();
        if sender.is_empty() {
            return None;
        }
        Some(ObservedItem::new(sender, self.subject.trim()))
    }
}

#[async_trait]
pub trait ObservationSurface: Send + Sync {
    /// Stable identifier (window label, tab id).
    fn id(&self) -> &str;

    async fn refresh(&self) -> Result<RefreshOutcome, SurfaceError>;

    /// Resolves when the surface reports a change. May never resolve; callers
    /// bound it with a timeout.
    async fn wait_for_change(&self) -> Result<(), SurfaceError>;

    async fn unprocessed_entries(&self) -> Result<Vec<SurfaceEntry>, SurfaceError>;

    /// Marks rows as processed so the next scan skips them.
    async fn mark_processed(&self, keys: &[String]) -> Result<(), SurfaceError>;

    /// Starts the in-surface alert for a match from `from`.
    async fn present_alert(&self, from: &str) -> Result<(), SurfaceError>;

    async fn silence_alert(&self) -> Result<(), SurfaceError>;
}

/// Enumerates the surfaces that currently exist.
#[async_trait]
pub trait SurfaceDirectory: Send + Sync {
    async fn surfaces(&self) -> Vec<Arc<dyn ObservationSurface>>;
}

/// Fixed list of surfaces, for headless hosts and tests.
#[derive(Default)]
pub struct StaticDirectory {
    surfaces: Vec<Arc<dyn ObservationSurface>>,
}

impl StaticDirectory {
    pub fn new(surfaces: Vec<Arc<dyn ObservationSurface>>) -> Self {
        Self { surfaces }
    }
}

#[async_trait]
impl SurfaceDirectory for StaticDirectory {
    async fn surfaces(&self) -> Vec<Arc<dyn ObservationSurface>> {
        self.surfaces.clone()
    }
}
