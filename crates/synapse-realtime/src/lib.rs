//! Realtime client layer for the Synapse dashboard backend.
//!
//! Provides the resilient session coordination the dashboard runs on:
//! - One WebSocket per logical channel with bounded auto-reconnect
//! - Tagged JSON frames with forward-compatible decoding
//! - A render-ready session store (participants, editor, notifications)
//! - A coalescing outbound action queue
//! - Collaboration and notification facades wiring the three together

mod connection;

pub mod channel;
pub mod collab;
pub mod feed;
pub mod manager;
pub mod queue;
pub mod store;
pub mod types;

pub use channel::RealtimeChannel;
pub use collab::{CollabSession, SessionConfig, SessionEvent};
pub use feed::{FeedConfig, NotificationEvent, NotificationFeed};
pub use manager::ConnectionManager;
pub use queue::{ActionQueue, PendingAction};
pub use store::{FeedEntry, FeedKind, SessionSnapshot, SessionStore};
pub use types::{
    ChannelKind, ChannelState, ChannelStatus, ClientFrame, Participant, ParticipantStatus,
    RealtimeConfig, RealtimeEvent, ServerFrame,
};

use synapse_api::RequestError;

#[derive(Debug, thiserror::Error)]
pub enum RealtimeError {
    #[error("invalid websocket url: {0}")]
    InvalidUrl(String),

    #[error("auth token is empty")]
    MissingToken,

    #[error("channel already connected: {0}")]
    AlreadyConnected(String),

    #[error("no such channel: {0}")]
    NotConnected(String),

    #[error(transparent)]
    Api(#[from] RequestError),
}

impl From<RealtimeError> for synapse_common::SynapseError {
    fn from(e: RealtimeError) -> Self {
        synapse_common::SynapseError::Realtime(e.to_string())
    }
}
