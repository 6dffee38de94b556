//! Authoritative render-ready state for one feature area.
//!
//! The store holds participants, editor content, the comment feed, and
//! notifications. It is mutated only from a single translator task plus
//! explicit local user actions, always behind one lock, so arriving frames
//! apply in transport order.
//!
//! Remote `text_edit` frames replace the editor content verbatim: the last
//! writer's full buffer wins and concurrent local typing can be clobbered.
//! That is the protocol's conflict model, kept as-is.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use tracing::debug;

use synapse_api::NotificationRecord;
use synapse_common::id::new_id;

use super::types::{Participant, ParticipantStatus, ServerFrame};

const MAX_COMMENTS: usize = 500;
const MAX_NOTIFICATIONS: usize = 200;

/// Whether a feed entry is a user comment or a system line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedKind {
    Comment,
    System,
}

/// One entry in the session's activity feed.
#[derive(Debug, Clone)]
pub struct FeedEntry {
    pub kind: FeedKind,
    pub user_id: String,
    pub username: String,
    pub text: String,
    pub timestamp: String,
}

/// Cloneable view of the store for the rendering layer.
#[derive(Debug, Clone, Default)]
pub struct SessionSnapshot {
    pub participants: Vec<Participant>,
    pub editor_content: String,
    pub feed: Vec<FeedEntry>,
    pub notifications: Vec<NotificationRecord>,
    pub unread_count: usize,
}

/// In-memory session state.
pub struct SessionStore {
    participants: HashMap<String, Participant>,
    editor_content: String,
    feed: VecDeque<FeedEntry>,
    notifications: VecDeque<NotificationRecord>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self {
            participants: HashMap::new(),
            editor_content: String::new(),
            feed: VecDeque::new(),
            notifications: VecDeque::new(),
        }
    }

    // -----------------------------------------------------------------
    // Roster
    // -----------------------------------------------------------------

    /// Replace the participant set wholesale (polling fallback). The last
    /// snapshot wins, except cursor positions, which survive for
    /// participants still present.
    pub fn apply_roster_snapshot(&mut self, roster: Vec<Participant>) {
        let old = std::mem::take(&mut self.participants);
        for mut participant in roster {
            if participant.cursor.is_none() {
                if let Some(prev) = old.get(&participant.user_id) {
                    participant.cursor = prev.cursor;
                }
            }
            self.participants
                .insert(participant.user_id.clone(), participant);
        }
    }

    /// Mark participants without activity inside `window` as offline.
    pub fn mark_stale(&mut self, window: Duration) {
        for participant in self.participants.values_mut() {
            if participant.last_seen.elapsed() >= window {
                participant.status = ParticipantStatus::Offline;
            }
        }
    }

    pub fn participant(&self, user_id: &str) -> Option<&Participant> {
        self.participants.get(user_id)
    }

    // -----------------------------------------------------------------
    // Incremental events
    // -----------------------------------------------------------------

    /// Apply one decoded server frame.
    pub fn apply_frame(&mut self, frame: &ServerFrame) {
        match frame {
            ServerFrame::UserJoined { user_id, username } => {
                self.participants
                    .insert(user_id.clone(), Participant::new(user_id, username));
                self.push_system_line(user_id, username, format!("{username} joined the session"));
            }
            ServerFrame::UserLeft { user_id, username } => {
                self.participants.remove(user_id);
                self.push_system_line(user_id, username, format!("{username} left the session"));
            }
            ServerFrame::TextEdit { content, .. } => {
                // Remote edits always win; no merge.
                self.editor_content = content.clone();
            }
            ServerFrame::CursorMove { user_id, position } => {
                match self.participants.get_mut(user_id) {
                    Some(participant) => {
                        participant.cursor = Some(*position);
                        participant.touch();
                    }
                    None => {
                        debug!(user_id = %user_id, "cursor_move for unknown participant");
                    }
                }
            }
            ServerFrame::Comment {
                user_id,
                username,
                text,
                timestamp,
            } => {
                if let Some(participant) = self.participants.get_mut(user_id) {
                    participant.touch();
                }
                self.push_feed(FeedEntry {
                    kind: FeedKind::Comment,
                    user_id: user_id.clone(),
                    username: username.clone(),
                    text: text.clone(),
                    timestamp: timestamp.clone(),
                });
            }
            ServerFrame::Notification(record) => {
                self.push_notification(record.clone());
            }
            ServerFrame::Unknown => {
                debug!("ignoring frame with unknown discriminator");
            }
        }
    }

    fn push_system_line(&mut self, user_id: &str, username: &str, text: String) {
        self.push_feed(FeedEntry {
            kind: FeedKind::System,
            user_id: user_id.to_string(),
            username: username.to_string(),
            text,
            timestamp: chrono::Utc::now().to_rfc3339(),
        });
    }

    fn push_feed(&mut self, entry: FeedEntry) {
        if self.feed.len() >= MAX_COMMENTS {
            self.feed.pop_front();
        }
        self.feed.push_back(entry);
    }

    /// Local editor change. Same last-writer-wins rule as remote edits.
    pub fn set_editor_content(&mut self, content: impl Into<String>) {
        self.editor_content = content.into();
    }

    pub fn editor_content(&self) -> &str {
        &self.editor_content
    }

    // -----------------------------------------------------------------
    // Notifications
    // -----------------------------------------------------------------

    /// Replace the notification list from a history fetch.
    pub fn load_notifications(&mut self, notifications: Vec<NotificationRecord>) {
        self.notifications = notifications
            .into_iter()
            .map(|mut record| {
                if record.id.is_empty() {
                    record.id = new_id();
                }
                record
            })
            .collect();
    }

    fn push_notification(&mut self, mut record: NotificationRecord) {
        if record.id.is_empty() {
            record.id = new_id();
        } else if self.notifications.iter().any(|n| n.id == record.id) {
            // Redelivery must not resurrect an already-read notification.
            debug!(id = %record.id, "duplicate notification ignored");
            return;
        }
        if self.notifications.len() >= MAX_NOTIFICATIONS {
            self.notifications.pop_front();
        }
        self.notifications.push_back(record);
    }

    /// Mark one notification read. Read state only ever moves false→true.
    /// Returns whether the id was found.
    pub fn mark_read(&mut self, id: &str) -> bool {
        match self.notifications.iter_mut().find(|n| n.id == id) {
            Some(record) => {
                record.read = true;
                true
            }
            None => false,
        }
    }

    /// Mark every notification read. Idempotent.
    pub fn mark_all_read(&mut self) {
        for record in self.notifications.iter_mut() {
            record.read = true;
        }
    }

    /// Remove one notification. Returns whether the id was found.
    pub fn delete_notification(&mut self, id: &str) -> bool {
        let before = self.notifications.len();
        self.notifications.retain(|n| n.id != id);
        self.notifications.len() != before
    }

    pub fn unread_count(&self) -> usize {
        self.notifications.iter().filter(|n| !n.read).count()
    }

    // -----------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------

    /// Pure read for the rendering layer.
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            participants: self.participants.values().cloned().collect(),
            editor_content: self.editor_content.clone(),
            feed: self.feed.iter().cloned().collect(),
            notifications: self.notifications.iter().cloned().collect(),
            unread_count: self.unread_count(),
        }
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}
