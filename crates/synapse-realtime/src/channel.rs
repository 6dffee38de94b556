//! Public handle for one realtime channel.

use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};
use tracing::debug;

use super::connection::connection_loop;
use super::types::{
    ChannelCommand, ChannelKind, ChannelState, ChannelStatus, ClientFrame, RealtimeConfig,
    RealtimeEvent,
};
use crate::RealtimeError;

/// Handle for one realtime channel.
///
/// All methods are non-blocking and send commands to the background
/// connection task. The task owns the socket and its reconnect schedule.
pub struct RealtimeChannel {
    channel_id: String,
    kind: ChannelKind,
    command_tx: mpsc::Sender<ChannelCommand>,
    status: Arc<RwLock<ChannelStatus>>,
}

impl RealtimeChannel {
    /// Validate the config, spawn the connection task, and return the
    /// handle together with the channel's event stream.
    pub fn connect(
        channel_id: impl Into<String>,
        kind: ChannelKind,
        config: RealtimeConfig,
    ) -> Result<(Self, mpsc::Receiver<RealtimeEvent>), RealtimeError> {
        config.validate()?;

        let channel_id = channel_id.into();
        let (event_tx, event_rx) = mpsc::channel(256);
        let (command_tx, command_rx) = mpsc::channel(64);
        let status = Arc::new(RwLock::new(ChannelStatus {
            state: ChannelState::Connecting,
            ..ChannelStatus::default()
        }));

        tokio::spawn(connection_loop(
            config,
            channel_id.clone(),
            Arc::clone(&status),
            event_tx,
            command_rx,
        ));

        Ok((
            Self {
                channel_id,
                kind,
                command_tx,
                status,
            },
            event_rx,
        ))
    }

    /// Clone a lightweight handle onto the same connection.
    pub fn clone_sender(&self) -> Self {
        Self {
            channel_id: self.channel_id.clone(),
            kind: self.kind,
            command_tx: self.command_tx.clone(),
            status: Arc::clone(&self.status),
        }
    }

    pub fn channel_id(&self) -> &str {
        &self.channel_id
    }

    pub fn kind(&self) -> ChannelKind {
        self.kind
    }

    /// Hand a frame to the connection task for transmission. A frame sent
    /// while the channel is not open is dropped here; buffering across
    /// outages is the action queue's job, not the channel's.
    pub async fn send(&self, frame: ClientFrame) {
        if !self.is_open().await {
            debug!(channel = %self.channel_id, "channel not open, dropping frame");
            return;
        }
        let _ = self.command_tx.send(ChannelCommand::Send(frame)).await;
    }

    /// Deterministic teardown: close the socket if open and cancel any
    /// pending reconnect.
    pub async fn close(&self) {
        let _ = self.command_tx.send(ChannelCommand::Close).await;
    }

    pub async fn is_open(&self) -> bool {
        self.status.read().await.state == ChannelState::Open
    }

    /// Point-in-time channel status.
    pub async fn status(&self) -> ChannelStatus {
        self.status.read().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ServerFrame;
    use futures_util::{SinkExt, StreamExt};
    use std::time::Duration;
    use tokio::net::TcpListener;
    use tokio_tungstenite::accept_async;
    use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
    use tokio_tungstenite::tungstenite::protocol::CloseFrame;
    use tokio_tungstenite::tungstenite::Message as WsMessage;

    async fn bind_server() -> (TcpListener, String) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        (listener, format!("ws://{addr}/ws/test-session"))
    }

    fn fast_config(url: String) -> RealtimeConfig {
        RealtimeConfig::new(url, "tok")
            .with_reconnect_delays(0, 0)
            .with_max_reconnect_attempts(Some(5))
    }

    async fn next_event(rx: &mut mpsc::Receiver<RealtimeEvent>) -> RealtimeEvent {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for event")
            .expect("event stream ended")
    }

    #[tokio::test]
    async fn rejects_invalid_url_and_empty_token() {
        let result = RealtimeChannel::connect(
            "c1",
            ChannelKind::Notification,
            RealtimeConfig::new("http://example.com", "tok"),
        );
        assert!(matches!(result, Err(RealtimeError::InvalidUrl(_))));

        let result = RealtimeChannel::connect(
            "c1",
            ChannelKind::Notification,
            RealtimeConfig::new("ws://example.com", ""),
        );
        assert!(matches!(result, Err(RealtimeError::MissingToken)));
    }

    #[tokio::test]
    async fn opens_and_receives_frames() {
        let (listener, url) = bind_server().await;
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();
            ws.send(WsMessage::Text(
                r#"{"type":"user_joined","user_id":"u1","username":"alice"}"#.into(),
            ))
            .await
            .unwrap();
            tokio::time::sleep(Duration::from_millis(500)).await;
        });

        let (channel, mut rx) =
            RealtimeChannel::connect("c1", ChannelKind::Collaboration, fast_config(url)).unwrap();

        assert!(matches!(next_event(&mut rx).await, RealtimeEvent::Opened));
        match next_event(&mut rx).await {
            RealtimeEvent::Frame(ServerFrame::UserJoined { user_id, username }) => {
                assert_eq!(user_id, "u1");
                assert_eq!(username, "alice");
            }
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(channel.is_open().await);
        channel.close().await;
    }

    #[tokio::test]
    async fn reconnects_after_abnormal_close_and_resets_retry_count() {
        let (listener, url) = bind_server().await;
        tokio::spawn(async move {
            // First connection: handshake, then drop without a close frame.
            let (stream, _) = listener.accept().await.unwrap();
            let ws = accept_async(stream).await.unwrap();
            drop(ws);
            // Second connection: stay up.
            let (stream, _) = listener.accept().await.unwrap();
            let _ws = accept_async(stream).await.unwrap();
            tokio::time::sleep(Duration::from_secs(2)).await;
        });

        let (channel, mut rx) =
            RealtimeChannel::connect("c1", ChannelKind::Collaboration, fast_config(url)).unwrap();

        assert!(matches!(next_event(&mut rx).await, RealtimeEvent::Opened));
        assert!(matches!(next_event(&mut rx).await, RealtimeEvent::Closed));

        // Skip any connection errors the retry loop reports on its way back.
        loop {
            match next_event(&mut rx).await {
                RealtimeEvent::Opened => break,
                RealtimeEvent::Error(_) | RealtimeEvent::Closed => continue,
                other => panic!("unexpected event: {other:?}"),
            }
        }

        let status = channel.status().await;
        assert_eq!(status.state, ChannelState::Open);
        assert_eq!(status.retry_count, 0);
        channel.close().await;
    }

    #[tokio::test]
    async fn close_cancels_pending_reconnect() {
        let (listener, url) = bind_server().await;
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let ws = accept_async(stream).await.unwrap();
            drop(ws);
            drop(listener);
        });

        let config = RealtimeConfig::new(url, "tok")
            .with_reconnect_delays(60, 60)
            .with_max_reconnect_attempts(None);
        let (channel, mut rx) =
            RealtimeChannel::connect("c1", ChannelKind::Collaboration, config).unwrap();

        assert!(matches!(next_event(&mut rx).await, RealtimeEvent::Opened));
        assert!(matches!(next_event(&mut rx).await, RealtimeEvent::Closed));

        // The loop is now sleeping out a 60s backoff; close must cancel it.
        channel.close().await;
        let ended = tokio::time::timeout(Duration::from_secs(2), rx.recv()).await;
        assert!(matches!(ended, Ok(None)));
        assert_eq!(channel.status().await.state, ChannelState::Disconnected);
    }

    #[tokio::test]
    async fn send_delivers_frames_in_order() {
        let (listener, url) = bind_server().await;
        let (collected_tx, collected_rx) = tokio::sync::oneshot::channel();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();
            let mut collected = Vec::new();
            while let Some(Ok(msg)) = ws.next().await {
                if let WsMessage::Text(text) = msg {
                    collected.push(text.to_string());
                    if collected.len() == 2 {
                        break;
                    }
                }
            }
            let _ = collected_tx.send(collected);
        });

        let (channel, mut rx) =
            RealtimeChannel::connect("c1", ChannelKind::Collaboration, fast_config(url)).unwrap();
        assert!(matches!(next_event(&mut rx).await, RealtimeEvent::Opened));

        channel
            .send(ClientFrame::TextEdit {
                content: "abc".into(),
                position: 3,
            })
            .await;
        channel
            .send(ClientFrame::Comment {
                text: "looks good".into(),
            })
            .await;

        let collected = tokio::time::timeout(Duration::from_secs(5), collected_rx)
            .await
            .unwrap()
            .unwrap();
        let first: serde_json::Value = serde_json::from_str(&collected[0]).unwrap();
        let second: serde_json::Value = serde_json::from_str(&collected[1]).unwrap();
        assert_eq!(first["type"], "text_edit");
        assert_eq!(first["content"], "abc");
        assert_eq!(second["type"], "comment");
        assert_eq!(second["text"], "looks good");
        channel.close().await;
    }

    #[tokio::test]
    async fn malformed_frames_are_dropped_without_closing() {
        let (listener, url) = bind_server().await;
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();
            ws.send(WsMessage::Text("this is not json".into()))
                .await
                .unwrap();
            ws.send(WsMessage::Text(
                r#"{"type":"comment","user_id":"u1","username":"alice","text":"hi","timestamp":"now"}"#
                    .into(),
            ))
            .await
            .unwrap();
            tokio::time::sleep(Duration::from_millis(500)).await;
        });

        let (channel, mut rx) =
            RealtimeChannel::connect("c1", ChannelKind::Collaboration, fast_config(url)).unwrap();
        assert!(matches!(next_event(&mut rx).await, RealtimeEvent::Opened));

        // The garbage frame is swallowed; the next event is the valid comment.
        match next_event(&mut rx).await {
            RealtimeEvent::Frame(ServerFrame::Comment { text, .. }) => {
                assert_eq!(text, "hi");
            }
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(channel.is_open().await);
        channel.close().await;
    }

    #[tokio::test]
    async fn auth_close_is_terminal() {
        let (listener, url) = bind_server().await;
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();
            ws.close(Some(CloseFrame {
                code: CloseCode::Policy,
                reason: "token expired".into(),
            }))
            .await
            .unwrap();
        });

        // Infinite retries configured, but an auth close must still stop.
        let config = RealtimeConfig::new(url, "tok")
            .with_reconnect_delays(0, 0)
            .with_max_reconnect_attempts(None);
        let (channel, mut rx) =
            RealtimeChannel::connect("c1", ChannelKind::Notification, config).unwrap();

        assert!(matches!(next_event(&mut rx).await, RealtimeEvent::Opened));
        assert!(matches!(next_event(&mut rx).await, RealtimeEvent::Closed));
        assert!(matches!(
            next_event(&mut rx).await,
            RealtimeEvent::AuthFailure
        ));

        let ended = tokio::time::timeout(Duration::from_secs(2), rx.recv()).await;
        assert!(matches!(ended, Ok(None)));
        assert!(channel.status().await.last_error.is_some());
    }

    #[tokio::test]
    async fn retries_exhausted_after_ceiling() {
        // Bind then drop so the port refuses connections.
        let (listener, url) = bind_server().await;
        drop(listener);

        let config = RealtimeConfig::new(url, "tok")
            .with_reconnect_delays(0, 0)
            .with_max_reconnect_attempts(Some(2));
        let (_channel, mut rx) =
            RealtimeChannel::connect("c1", ChannelKind::Collaboration, config).unwrap();

        let mut errors = 0;
        loop {
            match next_event(&mut rx).await {
                RealtimeEvent::Error(_) => errors += 1,
                RealtimeEvent::RetriesExhausted { attempts } => {
                    assert_eq!(attempts, 2);
                    break;
                }
                other => panic!("unexpected event: {other:?}"),
            }
        }
        // Initial attempt plus two retries.
        assert_eq!(errors, 3);

        let ended = tokio::time::timeout(Duration::from_secs(2), rx.recv()).await;
        assert!(matches!(ended, Ok(None)));
    }

    #[tokio::test]
    async fn send_while_disconnected_is_a_noop() {
        let (listener, url) = bind_server().await;
        drop(listener);

        let config = RealtimeConfig::new(url, "tok")
            .with_reconnect_delays(60, 60)
            .with_max_reconnect_attempts(None);
        let (channel, mut rx) =
            RealtimeChannel::connect("c1", ChannelKind::Collaboration, config).unwrap();

        assert!(matches!(next_event(&mut rx).await, RealtimeEvent::Error(_)));
        assert!(!channel.is_open().await);

        // Must not error or panic.
        channel
            .send(ClientFrame::CursorMove {
                position: synapse_api::CursorPos { x: 1, y: 2 },
            })
            .await;
        channel.close().await;
    }
}
