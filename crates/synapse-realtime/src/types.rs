//! Configuration, wire frames, and event/command enums for realtime channels.

use std::time::Instant;

use serde::{Deserialize, Serialize};

use synapse_api::{CursorPos, NotificationRecord, RosterEntry};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Configuration for one realtime channel connection.
#[derive(Clone)]
pub struct RealtimeConfig {
    /// WebSocket endpoint, e.g. `wss://synapse-api.onrender.com/ws/<session>`.
    pub url: String,
    /// Bearer token appended as a query parameter, the way the backend
    /// expects it.
    pub auth_token: String,
    /// Deadline for one connection attempt.
    pub connect_timeout_secs: u64,
    /// Reconnect base delay in seconds.
    pub reconnect_delay_secs: u64,
    /// Maximum reconnect delay in seconds.
    pub max_reconnect_delay_secs: u64,
    /// Reconnect ceiling; `None` retries indefinitely.
    pub max_reconnect_attempts: Option<u32>,
}

impl std::fmt::Debug for RealtimeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealtimeConfig")
            .field("url", &self.url)
            .field("auth_token", &"[REDACTED]")
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .field("reconnect_delay_secs", &self.reconnect_delay_secs)
            .field("max_reconnect_delay_secs", &self.max_reconnect_delay_secs)
            .field("max_reconnect_attempts", &self.max_reconnect_attempts)
            .finish()
    }
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            auth_token: String::new(),
            connect_timeout_secs: 15,
            reconnect_delay_secs: 3,
            max_reconnect_delay_secs: 30,
            max_reconnect_attempts: Some(10),
        }
    }
}

impl RealtimeConfig {
    pub fn new(url: impl Into<String>, auth_token: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            auth_token: auth_token.into(),
            ..Self::default()
        }
    }

    pub fn with_reconnect_delays(mut self, base_secs: u64, max_secs: u64) -> Self {
        self.reconnect_delay_secs = base_secs;
        self.max_reconnect_delay_secs = max_secs;
        self
    }

    pub fn with_max_reconnect_attempts(mut self, attempts: Option<u32>) -> Self {
        self.max_reconnect_attempts = attempts;
        self
    }

    /// Check the endpoint and credentials before a socket is opened.
    pub(crate) fn validate(&self) -> Result<(), crate::RealtimeError> {
        if !(self.url.starts_with("ws://") || self.url.starts_with("wss://")) {
            return Err(crate::RealtimeError::InvalidUrl(self.url.clone()));
        }
        if self.auth_token.is_empty() {
            return Err(crate::RealtimeError::MissingToken);
        }
        Ok(())
    }

    /// The full connection URL with the token attached.
    pub(crate) fn ws_url(&self) -> String {
        format!("{}?token={}", self.url, self.auth_token)
    }
}

// ---------------------------------------------------------------------------
// Channel identity & state
// ---------------------------------------------------------------------------

/// What a channel carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelKind {
    Notification,
    Collaboration,
}

/// Lifecycle state of a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Disconnected,
    Connecting,
    Open,
    Closing,
}

/// Point-in-time view of a channel for the UI.
#[derive(Debug, Clone)]
pub struct ChannelStatus {
    pub state: ChannelState,
    pub retry_count: u32,
    pub last_error: Option<String>,
}

impl Default for ChannelStatus {
    fn default() -> Self {
        Self {
            state: ChannelState::Disconnected,
            retry_count: 0,
            last_error: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Wire frames
// ---------------------------------------------------------------------------

/// Server-pushed frames, keyed by the `type` discriminator. Frames with an
/// unrecognized discriminator land on `Unknown` instead of failing the
/// decode. Inbound only; the client never encodes these.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    UserJoined {
        user_id: String,
        username: String,
    },
    UserLeft {
        user_id: String,
        username: String,
    },
    TextEdit {
        content: String,
        #[serde(default)]
        position: u32,
    },
    CursorMove {
        user_id: String,
        position: CursorPos,
    },
    Comment {
        user_id: String,
        username: String,
        text: String,
        timestamp: String,
    },
    Notification(NotificationRecord),
    #[serde(other)]
    Unknown,
}

/// Client-originated frames.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    TextEdit { content: String, position: u32 },
    CursorMove { position: CursorPos },
    Comment { text: String },
    MarkRead { id: String },
}

// ---------------------------------------------------------------------------
// Events & commands
// ---------------------------------------------------------------------------

/// Events emitted by a channel to its subscriber.
#[derive(Debug, Clone)]
pub enum RealtimeEvent {
    /// Socket established; `retry_count` has been reset.
    Opened,
    /// Socket lost. A reconnect follows unless a terminal event does.
    Closed,
    /// A decoded server frame.
    Frame(ServerFrame),
    /// The server rejected our credentials. Terminal; never retried.
    AuthFailure,
    /// The reconnect ceiling was reached. Terminal.
    RetriesExhausted { attempts: u32 },
    /// A non-terminal connection error; a retry is scheduled.
    Error(String),
}

/// Commands sent from channel handles to the connection task.
#[derive(Debug)]
pub(crate) enum ChannelCommand {
    Send(ClientFrame),
    Close,
}

// ---------------------------------------------------------------------------
// Participants
// ---------------------------------------------------------------------------

/// Presence status of a remote participant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParticipantStatus {
    #[default]
    Active,
    Idle,
    Offline,
}

/// A remote user visible in a collaboration session.
#[derive(Debug, Clone)]
pub struct Participant {
    pub user_id: String,
    pub username: String,
    pub status: ParticipantStatus,
    pub cursor: Option<CursorPos>,
    pub last_activity_at: String,
    pub(crate) last_seen: Instant,
}

impl Participant {
    pub fn new(user_id: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            username: username.into(),
            status: ParticipantStatus::Active,
            cursor: None,
            last_activity_at: chrono::Utc::now().to_rfc3339(),
            last_seen: Instant::now(),
        }
    }

    /// Build from a roster endpoint entry.
    pub fn from_roster(entry: RosterEntry) -> Self {
        let status = match entry.status.as_deref() {
            Some("idle") => ParticipantStatus::Idle,
            Some("offline") => ParticipantStatus::Offline,
            _ => ParticipantStatus::Active,
        };
        Self {
            user_id: entry.user_id,
            username: entry.username,
            status,
            cursor: entry.cursor_position,
            last_activity_at: entry
                .last_activity
                .unwrap_or_else(|| chrono::Utc::now().to_rfc3339()),
            last_seen: Instant::now(),
        }
    }

    pub(crate) fn touch(&mut self) {
        self.last_seen = Instant::now();
        self.last_activity_at = chrono::Utc::now().to_rfc3339();
        self.status = ParticipantStatus::Active;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_debug_redacts_token() {
        let config = RealtimeConfig::new("wss://example.com/ws/s1", "secret-token");
        let debug = format!("{config:?}");
        assert!(!debug.contains("secret-token"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn config_rejects_non_websocket_url() {
        let config = RealtimeConfig::new("https://example.com", "tok");
        assert!(matches!(
            config.validate(),
            Err(crate::RealtimeError::InvalidUrl(_))
        ));
    }

    #[test]
    fn config_rejects_empty_token() {
        let config = RealtimeConfig::new("ws://example.com/ws/s1", "");
        assert!(matches!(
            config.validate(),
            Err(crate::RealtimeError::MissingToken)
        ));
    }

    #[test]
    fn ws_url_appends_token() {
        let config = RealtimeConfig::new("ws://example.com/ws/s1", "tok");
        assert_eq!(config.ws_url(), "ws://example.com/ws/s1?token=tok");
    }

    #[test]
    fn server_frame_decodes_user_joined() {
        let json = r#"{"type":"user_joined","user_id":"u1","username":"alice"}"#;
        let frame: ServerFrame = serde_json::from_str(json).unwrap();
        assert!(
            matches!(frame, ServerFrame::UserJoined { ref user_id, ref username } if user_id == "u1" && username == "alice")
        );
    }

    #[test]
    fn server_frame_decodes_text_edit() {
        let json = r#"{"type":"text_edit","content":"hello world","position":5}"#;
        let frame: ServerFrame = serde_json::from_str(json).unwrap();
        assert!(matches!(frame, ServerFrame::TextEdit { ref content, position: 5 } if content == "hello world"));
    }

    #[test]
    fn server_frame_decodes_cursor_move() {
        let json = r#"{"type":"cursor_move","user_id":"u2","position":{"x":14,"y":98}}"#;
        let frame: ServerFrame = serde_json::from_str(json).unwrap();
        assert!(matches!(
            frame,
            ServerFrame::CursorMove {
                position: CursorPos { x: 14, y: 98 },
                ..
            }
        ));
    }

    #[test]
    fn server_frame_decodes_notification() {
        let json = r#"{"type":"notification","id":"n1","title":"Task due","message":"Report","timestamp":"now","priority":"high"}"#;
        let frame: ServerFrame = serde_json::from_str(json).unwrap();
        match frame {
            ServerFrame::Notification(record) => {
                assert_eq!(record.id, "n1");
                assert_eq!(record.title, "Task due");
                assert!(!record.read);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn unrecognized_discriminator_is_unknown() {
        let json = r#"{"type":"presence_sync","payload":{}}"#;
        let frame: ServerFrame = serde_json::from_str(json).unwrap();
        assert!(matches!(frame, ServerFrame::Unknown));
    }

    #[test]
    fn malformed_frame_fails_decode() {
        assert!(serde_json::from_str::<ServerFrame>("not json").is_err());
        assert!(serde_json::from_str::<ServerFrame>(r#"{"no_type":true}"#).is_err());
    }

    #[test]
    fn client_frame_encodes_with_discriminator() {
        let frame = ClientFrame::TextEdit {
            content: "abc".into(),
            position: 3,
        };
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["type"], "text_edit");
        assert_eq!(json["content"], "abc");
        assert_eq!(json["position"], 3);

        let frame = ClientFrame::CursorMove {
            position: CursorPos { x: 1, y: 2 },
        };
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["type"], "cursor_move");
        assert_eq!(json["position"]["x"], 1);
    }

    #[test]
    fn participant_from_roster_maps_status() {
        let entry: RosterEntry = serde_json::from_str(
            r#"{"user_id":"u1","username":"alice","status":"idle"}"#,
        )
        .unwrap();
        let participant = Participant::from_roster(entry);
        assert_eq!(participant.status, ParticipantStatus::Idle);
        assert!(participant.cursor.is_none());
    }
}
