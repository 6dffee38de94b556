//! Registry of live channels.
//!
//! Enforces the one-socket-per-channel-id invariant and fans channel
//! lifecycle out onto the shared [`EventBus`] for app-wide listeners,
//! while each caller keeps its own per-channel event stream.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, RwLock};

use synapse_common::{Event, EventBus};

use super::channel::RealtimeChannel;
use super::types::{
    ChannelKind, ChannelState, ChannelStatus, ClientFrame, RealtimeConfig, RealtimeEvent,
};
use crate::RealtimeError;

pub struct ConnectionManager {
    channels: RwLock<HashMap<String, RealtimeChannel>>,
    bus: Arc<EventBus>,
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
            bus: Arc::new(EventBus::new(64)),
        }
    }

    /// Subscribe to app-wide channel lifecycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.bus.subscribe()
    }

    /// Open a channel under `channel_id`. Fails if a live channel already
    /// holds that id; a terminally disconnected entry is replaced.
    pub async fn connect(
        &self,
        channel_id: &str,
        kind: ChannelKind,
        config: RealtimeConfig,
    ) -> Result<mpsc::Receiver<RealtimeEvent>, RealtimeError> {
        let mut channels = self.channels.write().await;
        if let Some(existing) = channels.get(channel_id) {
            if existing.status().await.state != ChannelState::Disconnected {
                return Err(RealtimeError::AlreadyConnected(channel_id.to_string()));
            }
            channels.remove(channel_id);
        }

        let (channel, mut raw_rx) = RealtimeChannel::connect(channel_id, kind, config)?;
        channels.insert(channel_id.to_string(), channel);

        let (tx, rx) = mpsc::channel(256);
        let bus = Arc::clone(&self.bus);
        let id = channel_id.to_string();
        tokio::spawn(async move {
            while let Some(event) = raw_rx.recv().await {
                match &event {
                    RealtimeEvent::Opened => {
                        bus.publish(Event::ChannelOpened {
                            channel_id: id.clone(),
                        });
                    }
                    RealtimeEvent::Closed => {
                        bus.publish(Event::ChannelClosed {
                            channel_id: id.clone(),
                        });
                    }
                    RealtimeEvent::AuthFailure => {
                        bus.publish(Event::AuthExpired {
                            channel_id: id.clone(),
                        });
                    }
                    RealtimeEvent::Error(message) => {
                        bus.publish(Event::ChannelError {
                            channel_id: id.clone(),
                            message: message.clone(),
                        });
                    }
                    RealtimeEvent::RetriesExhausted { .. } => {
                        bus.publish(Event::ChannelError {
                            channel_id: id.clone(),
                            message: "reconnect attempts exhausted".to_string(),
                        });
                    }
                    RealtimeEvent::Frame(_) => {}
                }
                if tx.send(event).await.is_err() {
                    break;
                }
            }
        });

        Ok(rx)
    }

    /// Send a frame on a registered channel.
    pub async fn send(&self, channel_id: &str, frame: ClientFrame) -> Result<(), RealtimeError> {
        match self.channels.read().await.get(channel_id) {
            Some(channel) => {
                channel.send(frame).await;
                Ok(())
            }
            None => Err(RealtimeError::NotConnected(channel_id.to_string())),
        }
    }

    /// Close a channel and drop it from the registry.
    pub async fn close(&self, channel_id: &str) {
        if let Some(channel) = self.channels.write().await.remove(channel_id) {
            channel.close().await;
        }
    }

    pub async fn status(&self, channel_id: &str) -> Option<ChannelStatus> {
        match self.channels.read().await.get(channel_id) {
            Some(channel) => Some(channel.status().await),
            None => None,
        }
    }

    /// A lightweight handle onto a registered channel.
    pub async fn channel(&self, channel_id: &str) -> Option<RealtimeChannel> {
        self.channels
            .read()
            .await
            .get(channel_id)
            .map(|c| c.clone_sender())
    }
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new()
    }
}
