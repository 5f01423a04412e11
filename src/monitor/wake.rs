use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use log::{debug, error, info};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::utils::Clock;

use super::controller::MonitorController;

/// Host scheduling primitive: fires once at or after `deadline`.
/// Arming again replaces the pending deadline.
pub trait WakeTimer: Send + Sync {
    fn arm(&self, deadline: DateTime<Utc>);
    fn disarm(&self);
    fn deadline(&self) -> Option<DateTime<Utc>>;
}

struct PendingWake {
    deadline: DateTime<Utc>,
    cancel: CancellationToken,
}

/// Wake timer backed by one sleeping tokio task per deadline. Fires are
/// delivered on the channel returned by [`TokioWakeTimer::new`].
pub struct TokioWakeTimer {
    pending: Mutex<Option<PendingWake>>,
    tx: mpsc::UnboundedSender<DateTime<Utc>>,
    clock: Arc<dyn Clock>,
}

impl TokioWakeTimer {
    pub fn new(clock: Arc<dyn Clock>) -> (Self, mpsc::UnboundedReceiver<DateTime<Utc>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                pending: Mutex::new(None),
                tx,
                clock,
            },
            rx,
        )
    }

    fn take_pending(&self) -> Option<PendingWake> {
        match self.pending.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        }
    }
}

impl WakeTimer for TokioWakeTimer {
    fn arm(&self, deadline: DateTime<Utc>) {
        if let Some(previous) = self.take_pending() {
            previous.cancel.cancel();
        }

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            error!("wake timer armed outside a tokio runtime; deadline {deadline} dropped");
            return;
        };

        let delay = deadline
            .signed_duration_since(self.clock.now())
            .to_std()
            .unwrap_or(std::time::Duration::ZERO);
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let tx = self.tx.clone();

        runtime.spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {
                    let _ = tx.send(deadline);
                }
                _ = token.cancelled() => {}
            }
        });

        debug!("wake timer armed for {deadline} (in {}ms)", delay.as_millis());

        let mut guard = match self.pending.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = Some(PendingWake { deadline, cancel });
    }

    fn disarm(&self) {
        if let Some(previous) = self.take_pending() {
            previous.cancel.cancel();
            debug!("wake timer disarmed (was due {})", previous.deadline);
        }
    }

    fn deadline(&self) -> Option<DateTime<Utc>> {
        match self.pending.lock() {
            Ok(guard) => guard.as_ref().map(|pending| pending.deadline),
            Err(poisoned) => poisoned.into_inner().as_ref().map(|pending| pending.deadline),
        }
    }
}

/// Forwards every timer fire to the controller until the timer is dropped.
pub fn spawn_wake_listener(
    controller: MonitorController,
    mut fires: mpsc::UnboundedReceiver<DateTime<Utc>>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(deadline) = fires.recv().await {
            debug!("wake timer fired (due {deadline})");
            controller.on_wake_timer_fired().await;
        }
        info!("wake listener shutting down");
    })
}
