//! HTTP collaborators for the Synapse backend.
//!
//! Provides the cold-start-aware chat client plus the small REST surface
//! the realtime features bootstrap from:
//! - Adaptive request deadlines (the backend sleeps on free-tier hosting)
//! - Progressive status reporting while a cold backend warms up
//! - Bearer-token auth with a classified error taxonomy
//! - Session create / roster / notification-history endpoints

pub mod chat;
pub mod rest;
pub mod session;

use async_trait::async_trait;
use serde::Deserialize;

pub use chat::{BackendConfig, ChatClient, ExchangePhase, HttpTransport};
pub use rest::{CursorPos, NotificationHistory, NotificationRecord, Priority, RestClient, RosterEntry};
pub use session::{ChatExchange, ChatMessage, ChatOutcome, ChatSession, ExchangeState, Role};

/// Failure classification for every backend call.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RequestError {
    /// HTTP 401. Never retried; the user must re-authenticate.
    #[error("authentication expired")]
    AuthExpired,
    /// Transport-level failure (DNS, connection refused, offline).
    #[error("network unreachable: {0}")]
    NetworkUnreachable(String),
    /// No response inside the adaptive deadline.
    #[error("request timed out")]
    Timeout,
    /// Any other non-2xx response.
    #[error("server error: HTTP {status}: {message}")]
    ServerError { status: u16, message: String },
    /// A 2xx response whose body was not the expected JSON.
    #[error("parse error: {0}")]
    Parse(String),
}

impl From<RequestError> for synapse_common::SynapseError {
    fn from(e: RequestError) -> Self {
        synapse_common::SynapseError::Api(e.to_string())
    }
}

impl RequestError {
    /// Whether a caller-side retry loop may try again.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, RequestError::AuthExpired)
    }

    pub(crate) fn from_reqwest(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            RequestError::Timeout
        } else {
            RequestError::NetworkUnreachable(e.to_string())
        }
    }
}

/// Map a non-success status plus body text into the error taxonomy.
pub(crate) fn classify_status(status: reqwest::StatusCode, body: String) -> RequestError {
    if status == reqwest::StatusCode::UNAUTHORIZED {
        RequestError::AuthExpired
    } else {
        RequestError::ServerError {
            status: status.as_u16(),
            message: body,
        }
    }
}

/// Reply payload of the chat completion endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatReply {
    #[serde(rename = "response")]
    pub content: String,
    #[serde(rename = "agent_used", default)]
    pub agent: Option<String>,
}

/// One-attempt transport underneath [`ChatClient`]. The deadline and
/// warm/cold policy live above this seam, so tests can script exchanges
/// without HTTP.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Execute one chat completion. No internal deadline.
    async fn execute(&self, message: &str) -> Result<ChatReply, RequestError>;

    /// Lightweight health probe. No internal deadline.
    async fn probe(&self) -> Result<(), RequestError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_expired_is_not_retryable() {
        assert!(!RequestError::AuthExpired.is_retryable());
        assert!(RequestError::Timeout.is_retryable());
        assert!(RequestError::NetworkUnreachable("refused".into()).is_retryable());
        assert!(RequestError::ServerError {
            status: 500,
            message: "boom".into()
        }
        .is_retryable());
    }

    #[test]
    fn classify_401_as_auth_expired() {
        let err = classify_status(reqwest::StatusCode::UNAUTHORIZED, "expired".into());
        assert!(matches!(err, RequestError::AuthExpired));
    }

    #[test]
    fn classify_other_status_as_server_error() {
        let err = classify_status(reqwest::StatusCode::BAD_GATEWAY, "upstream".into());
        match err {
            RequestError::ServerError { status, message } => {
                assert_eq!(status, 502);
                assert_eq!(message, "upstream");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn chat_reply_deserializes() {
        let json = r#"{"response":"hello","agent_used":"general"}"#;
        let reply: ChatReply = serde_json::from_str(json).unwrap();
        assert_eq!(reply.content, "hello");
        assert_eq!(reply.agent.as_deref(), Some("general"));
    }

    #[test]
    fn chat_reply_without_agent() {
        let json = r#"{"response":"hello"}"#;
        let reply: ChatReply = serde_json::from_str(json).unwrap();
        assert!(reply.agent.is_none());
    }

    #[test]
    fn converts_into_umbrella_error() {
        let err: synapse_common::SynapseError = RequestError::Timeout.into();
        assert!(matches!(err, synapse_common::SynapseError::Api(_)));
        assert!(err.to_string().contains("timed out"));
    }
}
