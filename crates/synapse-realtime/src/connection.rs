//! Background WebSocket connection loop with bounded auto-reconnect.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, error, info, warn};

use super::types::{
    ChannelCommand, ChannelState, ChannelStatus, RealtimeConfig, RealtimeEvent, ServerFrame,
};

/// Close codes that mean the server rejected our credentials. These are
/// terminal; reconnecting would only repeat the rejection.
fn is_auth_close(code: CloseCode) -> bool {
    matches!(code, CloseCode::Policy) || matches!(u16::from(code), 4001 | 4003)
}

/// Background task owning one socket. Reconnects with exponential backoff
/// until the attempt ceiling is hit, the server rejects authentication, or
/// the handle asks for a close.
pub(crate) async fn connection_loop(
    config: RealtimeConfig,
    channel_id: String,
    status: Arc<RwLock<ChannelStatus>>,
    event_tx: mpsc::Sender<RealtimeEvent>,
    command_rx: mpsc::Receiver<ChannelCommand>,
) {
    let command_rx = Arc::new(Mutex::new(command_rx));
    let shutdown = Arc::new(AtomicBool::new(false));
    let mut reconnect_delay = config.reconnect_delay_secs;
    let mut attempts: u32 = 0;

    loop {
        status.write().await.state = ChannelState::Connecting;
        let url = config.ws_url();
        info!(channel = %channel_id, "connecting realtime channel");

        match tokio::time::timeout(
            Duration::from_secs(config.connect_timeout_secs),
            tokio_tungstenite::connect_async(&url),
        )
        .await
        {
            Ok(Ok((ws_stream, _))) => {
                reconnect_delay = config.reconnect_delay_secs;
                attempts = 0;
                {
                    let mut st = status.write().await;
                    st.state = ChannelState::Open;
                    st.retry_count = 0;
                    st.last_error = None;
                }
                let _ = event_tx.send(RealtimeEvent::Opened).await;

                let (ws_write, mut ws_read) = ws_stream.split();
                let ws_write = Arc::new(Mutex::new(ws_write));

                let forwarder = tokio::spawn(command_forwarder(
                    Arc::clone(&command_rx),
                    Arc::clone(&ws_write),
                    Arc::clone(&status),
                    Arc::clone(&shutdown),
                    channel_id.clone(),
                ));

                let mut auth_failed = false;
                while let Some(msg_result) = ws_read.next().await {
                    match msg_result {
                        Ok(WsMessage::Text(text)) => {
                            match serde_json::from_str::<ServerFrame>(&text) {
                                Ok(frame) => {
                                    let _ = event_tx.send(RealtimeEvent::Frame(frame)).await;
                                }
                                Err(e) => {
                                    warn!(
                                        channel = %channel_id,
                                        error = %e,
                                        "dropping malformed frame"
                                    );
                                }
                            }
                        }
                        Ok(WsMessage::Close(close_frame)) => {
                            if let Some(cf) = &close_frame {
                                if is_auth_close(cf.code) {
                                    auth_failed = true;
                                }
                            }
                            info!(channel = %channel_id, "server closed channel");
                            break;
                        }
                        Err(e) => {
                            warn!(channel = %channel_id, error = %e, "websocket error");
                            break;
                        }
                        _ => {}
                    }
                }

                forwarder.abort();
                status.write().await.state = ChannelState::Disconnected;
                let _ = event_tx.send(RealtimeEvent::Closed).await;

                if auth_failed {
                    error!(channel = %channel_id, "authentication rejected, not retrying");
                    status.write().await.last_error =
                        Some("authentication rejected".to_string());
                    let _ = event_tx.send(RealtimeEvent::AuthFailure).await;
                    return;
                }
            }
            Ok(Err(e)) => {
                error!(channel = %channel_id, error = %e, "failed to connect");
                {
                    let mut st = status.write().await;
                    st.state = ChannelState::Disconnected;
                    st.last_error = Some(e.to_string());
                }
                let _ = event_tx
                    .send(RealtimeEvent::Error(format!("connection failed: {e}")))
                    .await;
            }
            Err(_elapsed) => {
                error!(
                    channel = %channel_id,
                    timeout_secs = config.connect_timeout_secs,
                    "websocket connection timed out"
                );
                {
                    let mut st = status.write().await;
                    st.state = ChannelState::Disconnected;
                    st.last_error = Some("connection timed out".to_string());
                }
                let _ = event_tx
                    .send(RealtimeEvent::Error("connection timed out".to_string()))
                    .await;
            }
        }

        if shutdown.load(Ordering::SeqCst) {
            info!(channel = %channel_id, "channel closed by caller");
            return;
        }

        attempts += 1;
        status.write().await.retry_count = attempts;
        if let Some(max) = config.max_reconnect_attempts {
            if attempts > max {
                warn!(channel = %channel_id, attempts = max, "reconnect attempts exhausted");
                let _ = event_tx
                    .send(RealtimeEvent::RetriesExhausted { attempts: max })
                    .await;
                return;
            }
        }

        info!(
            channel = %channel_id,
            delay = reconnect_delay,
            "reconnecting in {} seconds", reconnect_delay
        );
        // A close request during backoff cancels the pending reconnect.
        if wait_backoff_or_close(&command_rx, reconnect_delay, &channel_id).await {
            status.write().await.state = ChannelState::Disconnected;
            return;
        }
        reconnect_delay = (reconnect_delay * 2).min(config.max_reconnect_delay_secs);
    }
}

/// Sleep out the backoff while watching for a close request. Returns `true`
/// if the channel should shut down instead of reconnecting.
async fn wait_backoff_or_close(
    command_rx: &Arc<Mutex<mpsc::Receiver<ChannelCommand>>>,
    delay_secs: u64,
    channel_id: &str,
) -> bool {
    let mut rx = command_rx.lock().await;
    let sleep = tokio::time::sleep(Duration::from_secs(delay_secs));
    tokio::pin!(sleep);
    loop {
        tokio::select! {
            _ = &mut sleep => return false,
            cmd = rx.recv() => match cmd {
                Some(ChannelCommand::Close) | None => return true,
                Some(ChannelCommand::Send(_)) => {
                    debug!(channel = %channel_id, "dropping outbound frame while disconnected");
                }
            }
        }
    }
}

/// Forwards handle commands onto the socket while it is open.
async fn command_forwarder<S>(
    command_rx: Arc<Mutex<mpsc::Receiver<ChannelCommand>>>,
    ws_write: Arc<Mutex<S>>,
    status: Arc<RwLock<ChannelStatus>>,
    shutdown: Arc<AtomicBool>,
    channel_id: String,
) where
    S: futures_util::Sink<WsMessage> + Unpin,
{
    let mut rx = command_rx.lock().await;
    while let Some(cmd) = rx.recv().await {
        match cmd {
            ChannelCommand::Send(frame) => match serde_json::to_string(&frame) {
                Ok(json) => {
                    let mut writer = ws_write.lock().await;
                    if writer.send(WsMessage::Text(json.into())).await.is_err() {
                        warn!(channel = %channel_id, "socket write failed, frame dropped");
                    }
                }
                Err(e) => {
                    warn!(channel = %channel_id, error = %e, "failed to encode frame");
                }
            },
            ChannelCommand::Close => {
                shutdown.store(true, Ordering::SeqCst);
                status.write().await.state = ChannelState::Closing;
                let mut writer = ws_write.lock().await;
                let _ = writer.send(WsMessage::Close(None)).await;
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn policy_and_custom_codes_are_auth_closes() {
        assert!(is_auth_close(CloseCode::Policy));
        assert!(is_auth_close(CloseCode::from(4001)));
        assert!(is_auth_close(CloseCode::from(4003)));
    }

    #[test]
    fn normal_closes_are_not_auth_closes() {
        assert!(!is_auth_close(CloseCode::Normal));
        assert!(!is_auth_close(CloseCode::Away));
        assert!(!is_auth_close(CloseCode::Abnormal));
    }
}
