use std::sync::Arc;

use async_trait::async_trait;
use log::warn;

use crate::monitor::state::AlarmDetails;
use crate::surface::SurfaceDirectory;

use super::{AlertChannel, PresentationError};

/// Forwards `presentAlert` / `silenceAlert` to every open surface so the alert
/// also shows inside the view the user is looking at.
///
/// Unreachable surfaces are skipped; the channel only fails when surfaces
/// exist and none of them accepted the command.
pub struct SurfaceAlertChannel {
    directory: Arc<dyn SurfaceDirectory>,
}

impl SurfaceAlertChannel {
    pub fn new(directory: Arc<dyn SurfaceDirectory>) -> Self {
        Self { directory }
    }
}

#[async_trait]
impl AlertChannel for SurfaceAlertChannel {
    fn name(&self) -> &str {
        "surface"
    }

    async fn present(&self, alarm: &AlarmDetails) -> Result<(), PresentationError> {
        let surfaces = self.directory.surfaces().await;
        if surfaces.is_empty() {
            return Err(PresentationError::Unavailable {
                channel: self.name().into(),
                reason: "no open surface to present in".into(),
            });
        }

        let mut reached = 0usize;
        for surface in &surfaces {
            match surface.present_alert(&alarm.from).await {
                Ok(()) => reached += 1,
                Err(err) => warn!("presentAlert failed on surface {}: {err}", surface.id()),
            }
        }

        if reached == 0 {
            return Err(PresentationError::Failed {
                channel: self.name().into(),
                reason: format!("none of {} surfaces accepted the alert", surfaces.len()),
            });
        }
        Ok(())
    }

    async fn silence(&self) -> Result<(), PresentationError> {
        for surface in self.directory.surfaces().await {
            if let Err(err) = surface.silence_alert().await {
                warn!("silenceAlert failed on surface {}: {err}", surface.id());
            }
        }
        Ok(())
    }
}
