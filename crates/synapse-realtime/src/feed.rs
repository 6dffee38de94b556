//! Notification feed facade.
//!
//! Connects the notification channel, bootstraps history over REST, and
//! keeps the read state monotonic. Read-marks ride the socket while it is
//! open and fall back to the REST endpoints during outages so they are not
//! lost.

use std::sync::Arc;

use tokio::sync::{mpsc, Mutex, RwLock};
use tracing::debug;

use synapse_api::{RequestError, RestClient};
use synapse_common::AuthSession;

use super::channel::RealtimeChannel;
use super::queue::ActionQueue;
use super::store::{SessionSnapshot, SessionStore};
use super::types::{
    ChannelKind, ChannelStatus, ClientFrame, RealtimeConfig, RealtimeEvent, ServerFrame,
};
use crate::RealtimeError;

/// Configuration for the notification feed.
#[derive(Debug, Clone)]
pub struct FeedConfig {
    pub api_base_url: String,
    pub ws_base_url: String,
    pub queue_capacity: usize,
    pub reconnect_delay_secs: u64,
    pub max_reconnect_delay_secs: u64,
    pub max_reconnect_attempts: Option<u32>,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:8000".to_string(),
            ws_base_url: "ws://localhost:8000".to_string(),
            queue_capacity: 64,
            reconnect_delay_secs: 3,
            max_reconnect_delay_secs: 30,
            max_reconnect_attempts: Some(10),
        }
    }
}

/// Events the feed surfaces to the UI layer.
#[derive(Debug, Clone)]
pub enum NotificationEvent {
    Connected,
    Disconnected,
    Arrived { id: String, title: String },
    AuthExpired,
    ConnectionLost { attempts: u32 },
    Error(String),
}

/// A live notification stream plus its read-state surface.
pub struct NotificationFeed {
    rest: Arc<RestClient>,
    store: Arc<RwLock<SessionStore>>,
    queue: Arc<Mutex<ActionQueue>>,
    channel: RealtimeChannel,
}

impl NotificationFeed {
    /// Open the per-user notification channel.
    pub fn connect(
        auth: AuthSession,
        config: FeedConfig,
    ) -> Result<(Self, mpsc::Receiver<NotificationEvent>), RealtimeError> {
        let ws_url = format!(
            "{}/api/notifications/ws/{}",
            config.ws_base_url, auth.user_id
        );
        let rt_config = RealtimeConfig::new(ws_url, auth.token())
            .with_reconnect_delays(config.reconnect_delay_secs, config.max_reconnect_delay_secs)
            .with_max_reconnect_attempts(config.max_reconnect_attempts);

        let (channel, rt_rx) =
            RealtimeChannel::connect("notifications", ChannelKind::Notification, rt_config)?;

        let rest = Arc::new(RestClient::new(config.api_base_url.clone(), auth));
        let store = Arc::new(RwLock::new(SessionStore::new()));
        let queue = Arc::new(Mutex::new(ActionQueue::new(config.queue_capacity)));
        let (event_tx, event_rx) = mpsc::channel(256);

        tokio::spawn(feed_translator(
            rt_rx,
            event_tx,
            Arc::clone(&store),
            Arc::clone(&queue),
            channel.clone_sender(),
        ));

        Ok((
            Self {
                rest,
                store,
                queue,
                channel,
            },
            event_rx,
        ))
    }

    /// Load notification history from the backend.
    pub async fn bootstrap(&self) -> Result<(), RequestError> {
        let history = self.rest.fetch_notifications().await?;
        self.store
            .write()
            .await
            .load_notifications(history.notifications);
        Ok(())
    }

    /// Mark one notification read. The local transition happens first and
    /// is monotonic; delivery uses the socket while open, REST otherwise.
    pub async fn mark_read(&self, id: &str) -> Result<(), RequestError> {
        self.store.write().await.mark_read(id);
        if self.channel.is_open().await {
            let mut queue = self.queue.lock().await;
            queue.enqueue(ClientFrame::MarkRead { id: id.to_string() });
            queue.flush(&self.channel).await;
            Ok(())
        } else {
            self.rest.mark_read(id).await
        }
    }

    /// Mark every notification read. Idempotent locally; the REST call is
    /// the durable half.
    pub async fn mark_all_read(&self) -> Result<(), RequestError> {
        self.store.write().await.mark_all_read();
        self.rest.mark_all_read().await
    }

    /// Delete one notification locally and on the backend.
    pub async fn delete(&self, id: &str) -> Result<(), RequestError> {
        self.store.write().await.delete_notification(id);
        self.rest.delete_notification(id).await
    }

    pub async fn unread_count(&self) -> usize {
        self.store.read().await.unread_count()
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        self.store.read().await.snapshot()
    }

    pub async fn is_connected(&self) -> bool {
        self.channel.is_open().await
    }

    pub async fn status(&self) -> ChannelStatus {
        self.channel.status().await
    }

    pub async fn disconnect(&self) {
        self.channel.close().await;
    }
}

async fn feed_translator(
    mut rt_rx: mpsc::Receiver<RealtimeEvent>,
    event_tx: mpsc::Sender<NotificationEvent>,
    store: Arc<RwLock<SessionStore>>,
    queue: Arc<Mutex<ActionQueue>>,
    channel: RealtimeChannel,
) {
    while let Some(event) = rt_rx.recv().await {
        match event {
            RealtimeEvent::Opened => {
                let flushed = queue.lock().await.flush(&channel).await;
                if flushed > 0 {
                    debug!(flushed, "flushed queued read-marks after reconnect");
                }
                let _ = event_tx.send(NotificationEvent::Connected).await;
            }
            RealtimeEvent::Closed => {
                let _ = event_tx.send(NotificationEvent::Disconnected).await;
            }
            RealtimeEvent::AuthFailure => {
                let _ = event_tx.send(NotificationEvent::AuthExpired).await;
            }
            RealtimeEvent::RetriesExhausted { attempts } => {
                let _ = event_tx
                    .send(NotificationEvent::ConnectionLost { attempts })
                    .await;
            }
            RealtimeEvent::Error(message) => {
                let _ = event_tx.send(NotificationEvent::Error(message)).await;
            }
            RealtimeEvent::Frame(ServerFrame::Notification(record)) => {
                store
                    .write()
                    .await
                    .apply_frame(&ServerFrame::Notification(record.clone()));
                let _ = event_tx
                    .send(NotificationEvent::Arrived {
                        id: record.id,
                        title: record.title,
                    })
                    .await;
            }
            RealtimeEvent::Frame(other) => {
                debug!(frame = ?other, "ignoring non-notification frame on feed channel");
            }
        }
    }
}
