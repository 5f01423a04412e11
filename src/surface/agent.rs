use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::matching::{find_matches, Match, ObservedItem};
use crate::rules::Rule;
use crate::utils::Clock;

use super::{ObservationSurface, RefreshOutcome, SurfaceError};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

/// Drives one surface through refresh -> settle -> scan.
///
/// A surface is only ever scanned by one inspection at a time, so the
/// "mark processed" writes of one scan cannot interleave with the reads of
/// the next.
pub struct ObservationAgent {
    surface: Arc<dyn ObservationSurface>,
    settle_timeout: Duration,
    clock: Arc<dyn Clock>,
    scan_lock: Mutex<()>,
}

impl ObservationAgent {
    pub fn new(
        surface: Arc<dyn ObservationSurface>,
        settle_timeout: Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            surface,
            settle_timeout,
            clock,
            scan_lock: Mutex::new(()),
        }
    }

    pub fn surface_id(&self) -> &str {
        self.surface.id()
    }

    pub fn surface(&self) -> &Arc<dyn ObservationSurface> {
        &self.surface
    }

    /// Returns every match found in this pass. Matched rows are marked
    /// processed before this returns, whether or not the controller later
    /// suppresses them.
    pub async fn inspect(&self, rules: &[Rule]) -> Result<Vec<Match>, SurfaceError> {
        let _guard = self.scan_lock.lock().await;
        let surface_id = self.surface.id().to_string();
        let started = Instant::now();

        match self.surface.refresh().await {
            Ok(RefreshOutcome::Triggered) => self.await_settle(&surface_id).await,
            Ok(RefreshOutcome::NoAffordance) => {
                log_debug!("surface {} has no refresh control, scanning as-is", surface_id);
            }
            Err(err @ SurfaceError::Unreachable { .. }) => return Err(err),
            Err(err) => {
                log_warn!("refresh failed on surface {}: {err}; scanning anyway", surface_id);
            }
        }

        let entries = self.surface.unprocessed_entries().await?;
        let observed_at = self.clock.now();

        let (keys, items): (Vec<&str>, Vec<ObservedItem>) = entries
            .iter()
            .filter_map(|entry| match entry.observed_item() {
                Some(item) => Some((entry.key.as_str(), item)),
                None => {
                    log_debug!("surface {}: row {} has no sender, skipping", surface_id, entry.key);
                    None
                }
            })
            .unzip();

        let mut matches = Vec::new();
        let mut matched_keys = Vec::new();
        for (index, found) in find_matches(&items, rules, observed_at) {
            log_info!(
                "surface {}: '{}' from {} matched rule {}",
                surface_id,
                found.subject,
                found.source_identity,
                found.matched_rule.source_pattern
            );
            matched_keys.push(keys[index].to_string());
            matches.push(found);
        }

        if !matched_keys.is_empty() {
            if let Err(err) = self.surface.mark_processed(&matched_keys).await {
                log_warn!(
                    "surface {}: failed to mark {} rows processed: {err}",
                    surface_id,
                    matched_keys.len()
                );
            }
        }

        log_debug!(
            "surface {}: scanned {} unprocessed rows, {} matches in {}ms",
            surface_id,
            entries.len(),
            matches.len(),
            started.elapsed().as_millis()
        );

        Ok(matches)
    }

    async fn await_settle(&self, surface_id: &str) {
        match tokio::time::timeout(self.settle_timeout, self.surface.wait_for_change()).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                log_warn!("change signal failed on surface {}: {err}", surface_id);
            }
            Err(_) => {
                log_debug!(
                    "surface {} showed no change within {}ms, scanning anyway",
                    surface_id,
                    self.settle_timeout.as_millis()
                );
            }
        }
    }
}
