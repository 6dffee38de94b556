//! Collaboration session facade.
//!
//! Ties one collaboration channel to a session store and an action queue:
//! a single translator task owns every store mutation (frames in transport
//! order plus a periodic roster re-poll), and user actions go out through
//! the coalescing queue.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex, RwLock};
use tracing::debug;

use synapse_api::{RequestError, RestClient};
use synapse_common::{AuthSession, SessionId};

use super::channel::RealtimeChannel;
use super::queue::ActionQueue;
use super::store::{SessionSnapshot, SessionStore};
use super::types::{
    ChannelKind, ChannelStatus, ClientFrame, Participant, RealtimeConfig, RealtimeEvent,
    ServerFrame,
};
use crate::RealtimeError;

/// Configuration for a collaboration session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// HTTP origin for the REST collaborators.
    pub api_base_url: String,
    /// WebSocket origin, e.g. `wss://synapse-api.onrender.com`.
    pub ws_base_url: String,
    pub session_name: String,
    pub session_kind: String,
    /// Roster re-poll period (fallback for missed join/leave frames).
    pub roster_poll_secs: u64,
    /// Participants silent for longer than this are shown offline.
    pub liveness_window_secs: u64,
    pub queue_capacity: usize,
    pub reconnect_delay_secs: u64,
    pub max_reconnect_delay_secs: u64,
    pub max_reconnect_attempts: Option<u32>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:8000".to_string(),
            ws_base_url: "ws://localhost:8000".to_string(),
            session_name: "Collaboration Session".to_string(),
            session_kind: "document".to_string(),
            roster_poll_secs: 5,
            liveness_window_secs: 30,
            queue_capacity: 256,
            reconnect_delay_secs: 3,
            max_reconnect_delay_secs: 30,
            max_reconnect_attempts: Some(10),
        }
    }
}

/// Events the session surfaces to the UI layer.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    Connected,
    Disconnected,
    ParticipantJoined { user_id: String, username: String },
    ParticipantLeft { user_id: String, username: String },
    EditorChanged,
    CursorMoved { user_id: String },
    CommentAdded {
        user_id: String,
        username: String,
        text: String,
    },
    NotificationArrived { id: String, title: String },
    AuthExpired,
    ConnectionLost { attempts: u32 },
    Error(String),
}

/// A live collaboration session.
pub struct CollabSession {
    session_id: SessionId,
    rest: Arc<RestClient>,
    store: Arc<RwLock<SessionStore>>,
    queue: Arc<Mutex<ActionQueue>>,
    channel: RealtimeChannel,
}

impl CollabSession {
    /// Create a new backend session and join it.
    pub async fn create(
        auth: AuthSession,
        config: SessionConfig,
    ) -> Result<(Self, mpsc::Receiver<SessionEvent>), RealtimeError> {
        let rest = RestClient::new(config.api_base_url.clone(), auth.clone());
        let session_id = rest
            .create_session(&config.session_name, &config.session_kind)
            .await?;
        Self::start(auth, config, rest, session_id)
    }

    /// Join an existing session by id.
    pub fn attach(
        auth: AuthSession,
        config: SessionConfig,
        session_id: SessionId,
    ) -> Result<(Self, mpsc::Receiver<SessionEvent>), RealtimeError> {
        let rest = RestClient::new(config.api_base_url.clone(), auth.clone());
        Self::start(auth, config, rest, session_id)
    }

    fn start(
        auth: AuthSession,
        config: SessionConfig,
        rest: RestClient,
        session_id: SessionId,
    ) -> Result<(Self, mpsc::Receiver<SessionEvent>), RealtimeError> {
        let ws_url = format!("{}/ws/{}", config.ws_base_url, session_id);
        let rt_config = RealtimeConfig::new(ws_url, auth.token())
            .with_reconnect_delays(config.reconnect_delay_secs, config.max_reconnect_delay_secs)
            .with_max_reconnect_attempts(config.max_reconnect_attempts);

        let (channel, rt_rx) = RealtimeChannel::connect(
            format!("collab-{session_id}"),
            ChannelKind::Collaboration,
            rt_config,
        )?;

        let rest = Arc::new(rest);
        let store = Arc::new(RwLock::new(SessionStore::new()));
        let queue = Arc::new(Mutex::new(ActionQueue::new(config.queue_capacity)));
        let (event_tx, event_rx) = mpsc::channel(256);

        tokio::spawn(session_translator(
            rt_rx,
            event_tx,
            Arc::clone(&store),
            Arc::clone(&queue),
            channel.clone_sender(),
            Arc::clone(&rest),
            session_id.clone(),
            Duration::from_secs(config.roster_poll_secs),
            Duration::from_secs(config.liveness_window_secs),
        ));

        Ok((
            Self {
                session_id,
                rest,
                store,
                queue,
                channel,
            },
            event_rx,
        ))
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// Local edit: update the store and queue a `text_edit` frame. Sends
    /// are throttled so per-keystroke calls coalesce.
    pub async fn edit_text(&self, content: &str, position: u32) {
        self.store.write().await.set_editor_content(content);
        let mut queue = self.queue.lock().await;
        queue.enqueue(ClientFrame::TextEdit {
            content: content.to_string(),
            position,
        });
        queue.flush_throttled(&self.channel).await;
    }

    /// Broadcast our cursor position. Throttled like edits.
    pub async fn move_cursor(&self, x: i32, y: i32) {
        let mut queue = self.queue.lock().await;
        queue.enqueue(ClientFrame::CursorMove {
            position: synapse_api::CursorPos { x, y },
        });
        queue.flush_throttled(&self.channel).await;
    }

    /// Post a comment. Comments are never coalesced and flush immediately.
    pub async fn comment(&self, text: &str) {
        let mut queue = self.queue.lock().await;
        queue.enqueue(ClientFrame::Comment {
            text: text.to_string(),
        });
        queue.flush(&self.channel).await;
    }

    /// Force a roster re-fetch outside the poll schedule.
    pub async fn refresh_roster(&self) -> Result<(), RequestError> {
        let roster = self.rest.fetch_roster(&self.session_id).await?;
        let participants = roster.into_iter().map(Participant::from_roster).collect();
        self.store.write().await.apply_roster_snapshot(participants);
        Ok(())
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

    /// Leave the session and tear the channel down.
    pub async fn disconnect(&self) {
        self.channel.close().await;
    }
}

#[allow(clippy::too_many_arguments)]
async fn session_translator(
    mut rt_rx: mpsc::Receiver<RealtimeEvent>,
    event_tx: mpsc::Sender<SessionEvent>,
    store: Arc<RwLock<SessionStore>>,
    queue: Arc<Mutex<ActionQueue>>,
    channel: RealtimeChannel,
    rest: Arc<RestClient>,
    session_id: SessionId,
    poll_interval: Duration,
    liveness_window: Duration,
) {
    let mut roster_tick = tokio::time::interval(poll_interval);
    roster_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            maybe_event = rt_rx.recv() => {
                let Some(event) = maybe_event else { break };
                match event {
                    RealtimeEvent::Opened => {
                        let flushed = queue.lock().await.flush(&channel).await;
                        if flushed > 0 {
                            debug!(flushed, "flushed queued actions after reconnect");
                        }
                        let _ = event_tx.send(SessionEvent::Connected).await;
                    }
                    RealtimeEvent::Closed => {
                        let _ = event_tx.send(SessionEvent::Disconnected).await;
                    }
                    RealtimeEvent::AuthFailure => {
                        let _ = event_tx.send(SessionEvent::AuthExpired).await;
                    }
                    RealtimeEvent::RetriesExhausted { attempts } => {
                        let _ = event_tx.send(SessionEvent::ConnectionLost { attempts }).await;
                    }
                    RealtimeEvent::Error(message) => {
                        let _ = event_tx.send(SessionEvent::Error(message)).await;
                    }
                    RealtimeEvent::Frame(frame) => {
                        store.write().await.apply_frame(&frame);
                        if let Some(event) = translate_frame(frame) {
                            let _ = event_tx.send(event).await;
                        }
                    }
                }
            }
            _ = roster_tick.tick() => {
                match rest.fetch_roster(&session_id).await {
                    Ok(roster) => {
                        let participants =
                            roster.into_iter().map(Participant::from_roster).collect();
                        let mut store = store.write().await;
                        store.apply_roster_snapshot(participants);
                        store.mark_stale(liveness_window);
                    }
                    Err(RequestError::AuthExpired) => {
                        let _ = event_tx.send(SessionEvent::AuthExpired).await;
                    }
                    Err(e) => {
                        debug!(error = %e, "roster poll failed");
                    }
                }
            }
        }
    }
}

fn translate_frame(frame: ServerFrame) -> Option<SessionEvent> {
    match frame {
        ServerFrame::UserJoined { user_id, username } => {
            Some(SessionEvent::ParticipantJoined { user_id, username })
        }
        ServerFrame::UserLeft { user_id, username } => {
            Some(SessionEvent::ParticipantLeft { user_id, username })
        }
        ServerFrame::TextEdit { .. } => Some(SessionEvent::EditorChanged),
        ServerFrame::CursorMove { user_id, .. } => Some(SessionEvent::CursorMoved { user_id }),
        ServerFrame::Comment {
            user_id,
            username,
            text,
            ..
        } => Some(SessionEvent::CommentAdded {
            user_id,
            username,
            text,
        }),
        ServerFrame::Notification(record) => Some(SessionEvent::NotificationArrived {
            id: record.id,
            title: record.title,
        }),
        ServerFrame::Unknown => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::{SinkExt, StreamExt};
    use tokio::net::TcpListener;
    use tokio_tungstenite::accept_async;
    use tokio_tungstenite::tungstenite::Message as WsMessage;

    fn test_config(ws_base_url: String) -> SessionConfig {
        SessionConfig {
            // REST endpoint that refuses connections; polls just log.
            api_base_url: "http://127.0.0.1:9".to_string(),
            ws_base_url,
            roster_poll_secs: 3600,
            reconnect_delay_secs: 0,
            max_reconnect_delay_secs: 0,
            ..SessionConfig::default()
        }
    }

    async fn next_event(rx: &mut mpsc::Receiver<SessionEvent>) -> SessionEvent {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for session event")
            .expect("session event stream ended")
    }

    #[tokio::test]
    async fn session_applies_frames_and_sends_user_actions() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (collected_tx, collected_rx) = tokio::sync::oneshot::channel();

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();
            ws.send(WsMessage::Text(
                r#"{"type":"user_joined","user_id":"u2","username":"bob"}"#.into(),
            ))
            .await
            .unwrap();

            let mut collected = Vec::new();
            while let Some(Ok(msg)) = ws.next().await {
                if let WsMessage::Text(text) = msg {
                    collected.push(text.to_string());
                    if collected.len() == 3 {
                        break;
                    }
                }
            }
            let _ = collected_tx.send(collected);
        });

        let auth = AuthSession::new("u1", "alice", "tok");
        let (session, mut rx) = CollabSession::attach(
            auth,
            test_config(format!("ws://{addr}")),
            SessionId::from_raw("s1"),
        )
        .unwrap();

        assert!(matches!(next_event(&mut rx).await, SessionEvent::Connected));
        match next_event(&mut rx).await {
            SessionEvent::ParticipantJoined { user_id, username } => {
                assert_eq!(user_id, "u2");
                assert_eq!(username, "bob");
            }
            other => panic!("unexpected event: {other:?}"),
        }

        // First edit flushes right away; the next two land inside the
        // throttle window and coalesce until the comment forces a flush.
        session.edit_text("a", 1).await;
        session.edit_text("ab", 2).await;
        session.edit_text("abc", 3).await;
        session.comment("done").await;

        let collected = tokio::time::timeout(Duration::from_secs(5), collected_rx)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(collected.len(), 3);
        let first: serde_json::Value = serde_json::from_str(&collected[0]).unwrap();
        let second: serde_json::Value = serde_json::from_str(&collected[1]).unwrap();
        let third: serde_json::Value = serde_json::from_str(&collected[2]).unwrap();
        assert_eq!(first["type"], "text_edit");
        assert_eq!(first["content"], "a");
        assert_eq!(second["type"], "text_edit");
        assert_eq!(second["content"], "abc");
        assert_eq!(third["type"], "comment");
        assert_eq!(third["text"], "done");

        let snapshot = session.snapshot().await;
        assert_eq!(snapshot.editor_content, "abc");
        assert!(snapshot.participants.iter().any(|p| p.user_id == "u2"));

        session.disconnect().await;
    }

    #[tokio::test]
    async fn remote_edit_clobbers_local_content() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();
            // Give the client a moment to type locally, then overwrite.
            tokio::time::sleep(Duration::from_millis(200)).await;
            ws.send(WsMessage::Text(
                r#"{"type":"text_edit","content":"remote wins","position":0}"#.into(),
            ))
            .await
            .unwrap();
            tokio::time::sleep(Duration::from_secs(1)).await;
        });

        let auth = AuthSession::new("u1", "alice", "tok");
        let (session, mut rx) = CollabSession::attach(
            auth,
            test_config(format!("ws://{addr}")),
            SessionId::from_raw("s1"),
        )
        .unwrap();

        assert!(matches!(next_event(&mut rx).await, SessionEvent::Connected));
        session.edit_text("local draft", 11).await;

        loop {
            if let SessionEvent::EditorChanged = next_event(&mut rx).await {
                break;
            }
        }
        assert_eq!(session.snapshot().await.editor_content, "remote wins");
        session.disconnect().await;
    }
}
