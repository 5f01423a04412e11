use tokio::sync::broadcast;

use super::state::StatusUpdate;

/// Receives a status update after every state-changing operation. Having no
/// listener is normal.
pub trait StatusSink: Send + Sync {
    fn publish(&self, update: &StatusUpdate);
}

/// Fans status updates out to any number of in-process subscribers.
#[derive(Clone)]
pub struct BroadcastStatusSink {
    sender: broadcast::Sender<StatusUpdate>,
}

impl BroadcastStatusSink {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StatusUpdate> {
        self.sender.subscribe()
    }
}

impl StatusSink for BroadcastStatusSink {
    fn publish(&self, update: &StatusUpdate) {
        // Err only means nobody is listening right now.
        let _ = self.sender.send(update.clone());
    }
}
