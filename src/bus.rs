use crate::chat::ChatMessage;
use crate::status::{ChatStatus, Connectivity};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// What the presentation shell gets to see of the controller.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum Event {
    /// A message was appended to the live sequence
    MessageAppended(ChatMessage),

    /// Streamed text was added to the assistant message with this id
    MessageUpdated { id: String, text: String },

    /// The request lifecycle moved
    StatusChanged { from: ChatStatus, to: ChatStatus },

    /// The derived online/offline signal flipped
    ConnectivityChanged(Connectivity),
}

pub struct EventBus {
    tx: broadcast::Sender<Event>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(100);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    pub fn publish(&self, event: Event) {
        // No subscribers is fine
        let _ = self.tx.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
