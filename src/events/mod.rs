use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::warn;

/// Domain events emitted by the engine after a successful commit.
/// Consumers (webhooks, audit trails, planning) subscribe on the receiving
/// end of the channel; the engine itself never blocks on them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    StructureCreated {
        structure_id: i64,
    },
    StructureUpdated {
        structure_id: i64,
    },
    StructureDeleted {
        structure_id: i64,
    },
    StructureImported {
        structure_id: i64,
        version_id: i64,
        node_count: usize,
    },
    VersionCreated {
        structure_id: i64,
        version_id: i64,
        version_number: i32,
    },
    VersionCloned {
        structure_id: i64,
        source_version_id: i64,
        target_version_id: i64,
        node_count: usize,
    },
    CurrentVersionChanged {
        structure_id: i64,
        version_id: i64,
    },
    ItemAddedToVersion {
        version_id: i64,
        item_id: i64,
    },
    ItemRemovedFromVersion {
        version_id: i64,
        item_id: i64,
    },
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Sends an event, logging instead of failing when the receiving side
    /// is gone. Used after commits, where the mutation has already
    /// succeeded and must not be reported as failed.
    pub async fn send_or_log(&self, event: Event) {
        if let Err(e) = self.send(event).await {
            warn!("Event dropped: {}", e);
        }
    }
}

/// Builds an event channel pair with the given buffer size.
pub fn channel(buffer: usize) -> (EventSender, mpsc::Receiver<Event>) {
    let (tx, rx) = mpsc::channel(buffer);
    (EventSender::new(tx), rx)
}
