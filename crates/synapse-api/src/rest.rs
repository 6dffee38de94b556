//! REST collaborators for the realtime features.
//!
//! Small bearer-token JSON endpoints: collaboration session bootstrap,
//! roster polling, and the notification history/read-state surface. All
//! calls share the [`RequestError`] classification.

use serde::{Deserialize, Serialize};
use tracing::debug;

use synapse_common::{AuthSession, SessionId};

use crate::{classify_status, RequestError};

/// Wire shape of a remote cursor position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CursorPos {
    pub x: i32,
    pub y: i32,
}

/// One participant as returned by the roster endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct RosterEntry {
    pub user_id: String,
    pub username: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub cursor_position: Option<CursorPos>,
    #[serde(default)]
    pub last_activity: Option<String>,
}

/// Notification priority as pushed by the backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

/// One server-side notification. Push frames occasionally omit the id;
/// the store assigns one before the record becomes addressable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationRecord {
    #[serde(default)]
    pub id: String,
    /// Server-side category, e.g. `task_due` or `mention`.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    pub title: String,
    pub message: String,
    pub timestamp: String,
    #[serde(default)]
    pub read: bool,
    #[serde(default)]
    pub priority: Priority,
}

/// Response of the notification history endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct NotificationHistory {
    pub notifications: Vec<NotificationRecord>,
    #[serde(default)]
    pub unread_count: usize,
}

#[derive(Deserialize)]
struct CreateSessionResponse {
    session_id: String,
}

#[derive(Deserialize)]
struct RosterResponse {
    #[serde(default)]
    participants: Vec<RosterEntry>,
}

/// Bearer-token JSON client for the backend's REST surface.
pub struct RestClient {
    http: reqwest::Client,
    base_url: String,
    auth: AuthSession,
}

impl RestClient {
    pub fn new(base_url: impl Into<String>, auth: AuthSession) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            auth,
        }
    }

    /// Create a collaboration session, returning its id.
    pub async fn create_session(
        &self,
        name: &str,
        kind: &str,
    ) -> Result<SessionId, RequestError> {
        let body = serde_json::json!({
            "session_name": name,
            "session_type": kind,
        });
        let response = self
            .http
            .post(format!("{}/api/realtime/sessions/create", self.base_url))
            .header(reqwest::header::AUTHORIZATION, self.auth.bearer())
            .json(&body)
            .send()
            .await
            .map_err(RequestError::from_reqwest)?;

        let parsed: CreateSessionResponse = Self::read_json(response).await?;
        debug!(session_id = %parsed.session_id, "collaboration session created");
        Ok(SessionId::from_raw(parsed.session_id))
    }

    /// Fetch the current participant roster for a session.
    pub async fn fetch_roster(
        &self,
        session_id: &SessionId,
    ) -> Result<Vec<RosterEntry>, RequestError> {
        let response = self
            .http
            .get(format!(
                "{}/api/realtime/sessions/{}/participants",
                self.base_url, session_id
            ))
            .header(reqwest::header::AUTHORIZATION, self.auth.bearer())
            .send()
            .await
            .map_err(RequestError::from_reqwest)?;

        let parsed: RosterResponse = Self::read_json(response).await?;
        Ok(parsed.participants)
    }

    /// Fetch notification history plus the server's unread count.
    pub async fn fetch_notifications(&self) -> Result<NotificationHistory, RequestError> {
        let response = self
            .http
            .get(format!("{}/api/notifications/history", self.base_url))
            .header(reqwest::header::AUTHORIZATION, self.auth.bearer())
            .send()
            .await
            .map_err(RequestError::from_reqwest)?;

        Self::read_json(response).await
    }

    /// Mark one notification read.
    pub async fn mark_read(&self, id: &str) -> Result<(), RequestError> {
        let response = self
            .http
            .patch(format!("{}/api/notifications/{}/read", self.base_url, id))
            .header(reqwest::header::AUTHORIZATION, self.auth.bearer())
            .send()
            .await
            .map_err(RequestError::from_reqwest)?;

        Self::read_empty(response).await
    }

    /// Mark every notification read.
    pub async fn mark_all_read(&self) -> Result<(), RequestError> {
        let response = self
            .http
            .post(format!("{}/api/notifications/mark-all-read", self.base_url))
            .header(reqwest::header::AUTHORIZATION, self.auth.bearer())
            .send()
            .await
            .map_err(RequestError::from_reqwest)?;

        Self::read_empty(response).await
    }

    /// Delete one notification.
    pub async fn delete_notification(&self, id: &str) -> Result<(), RequestError> {
        let response = self
            .http
            .delete(format!("{}/api/notifications/{}", self.base_url, id))
            .header(reqwest::header::AUTHORIZATION, self.auth.bearer())
            .send()
            .await
            .map_err(RequestError::from_reqwest)?;

        Self::read_empty(response).await
    }

    async fn read_json<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, RequestError> {
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(classify_status(status, text));
        }
        response
            .json::<T>()
            .await
            .map_err(|e| RequestError::Parse(e.to_string()))
    }

    async fn read_empty(response: reqwest::Response) -> Result<(), RequestError> {
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(classify_status(status, text));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roster_entry_deserializes_with_optional_fields() {
        let json = r#"{
            "user_id": "u1",
            "username": "alice",
            "status": "active",
            "cursor_position": { "x": 10, "y": 20 },
            "last_activity": "2025-11-02T10:00:00Z"
        }"#;
        let entry: RosterEntry = serde_json::from_str(json).unwrap();
        assert_eq!(entry.user_id, "u1");
        assert_eq!(entry.cursor_position, Some(CursorPos { x: 10, y: 20 }));
    }

    #[test]
    fn roster_entry_minimal() {
        let json = r#"{ "user_id": "u2", "username": "bob" }"#;
        let entry: RosterEntry = serde_json::from_str(json).unwrap();
        assert!(entry.status.is_none());
        assert!(entry.cursor_position.is_none());
        assert!(entry.last_activity.is_none());
    }

    #[test]
    fn notification_record_defaults() {
        let json = r#"{
            "id": "n1",
            "title": "Task due",
            "message": "Ship the report",
            "timestamp": "2025-11-02T10:00:00Z"
        }"#;
        let record: NotificationRecord = serde_json::from_str(json).unwrap();
        assert!(!record.read);
        assert!(record.kind.is_none());
        assert_eq!(record.priority, Priority::Medium);
    }

    #[test]
    fn notification_record_keeps_category() {
        let json = r#"{
            "id": "n2",
            "type": "task_due",
            "title": "Task due",
            "message": "Ship the report",
            "timestamp": "2025-11-02T10:00:00Z"
        }"#;
        let record: NotificationRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.kind.as_deref(), Some("task_due"));
    }

    #[test]
    fn priority_deserializes_lowercase() {
        let record: NotificationRecord = serde_json::from_str(
            r#"{"id":"n","title":"t","message":"m","timestamp":"now","priority":"high"}"#,
        )
        .unwrap();
        assert_eq!(record.priority, Priority::High);
    }

    #[test]
    fn history_deserializes() {
        let json = r#"{
            "notifications": [
                {"id":"n1","title":"a","message":"b","timestamp":"t","read":true,"priority":"low"}
            ],
            "unread_count": 0
        }"#;
        let history: NotificationHistory = serde_json::from_str(json).unwrap();
        assert_eq!(history.notifications.len(), 1);
        assert_eq!(history.unread_count, 0);
        assert!(history.notifications[0].read);
    }
}
