use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// App-wide lifecycle events published by the realtime layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum Event {
    ChannelOpened { channel_id: String },
    ChannelClosed { channel_id: String },
    ChannelError { channel_id: String, message: String },
    AuthExpired { channel_id: String },
    NotificationArrived { title: String },
    UnreadChanged { count: usize },
    #[serde(other)]
    Unknown,
}

/// Broadcast fan-out for [`Event`]s. Subscribers that lag past the buffer
/// capacity lose the oldest events, never block the publisher.
pub struct EventBus {
    sender: broadcast::Sender<Event>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }

    pub fn publish(&self, event: Event) -> usize {
        self.sender.send(event).unwrap_or(0)
    }
}
