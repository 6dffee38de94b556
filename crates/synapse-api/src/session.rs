//! Chat transcript management.
//!
//! A `ChatSession` holds the conversation history and guards against
//! out-of-order UI updates: while a request is in flight the user may send
//! another, and a response whose request no longer matches the newest
//! in-flight exchange is discarded instead of being committed.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::debug;

use synapse_common::id::{new_id, new_request_id};

use crate::chat::{ChatClient, ExchangePhase};
use crate::{ChatReply, RequestError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One transcript entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub role: Role,
    pub content: String,
    pub agent: Option<String>,
    pub timestamp: String,
}

/// Lifecycle of one request/response turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeState {
    Sent,
    WarmingUp,
    Succeeded,
    Failed,
}

/// Record of one request/response turn with the backend.
#[derive(Debug, Clone)]
pub struct ChatExchange {
    pub request_id: String,
    pub state: ExchangeState,
    pub sent_at: Instant,
    pub timeout: Duration,
}

/// Result of a [`ChatSession::send`] call.
#[derive(Debug)]
pub enum ChatOutcome {
    /// The reply was committed to the transcript.
    Reply(ChatReply),
    /// A newer exchange superseded this one; nothing was committed.
    Stale,
}

/// A conversation with the backend assistant.
pub struct ChatSession {
    client: ChatClient,
    messages: Mutex<Vec<ChatMessage>>,
    exchanges: Arc<Mutex<Vec<ChatExchange>>>,
    latest: AtomicU64,
}

impl ChatSession {
    pub fn new(client: ChatClient) -> Self {
        Self {
            client,
            messages: Mutex::new(Vec::new()),
            exchanges: Arc::new(Mutex::new(Vec::new())),
            latest: AtomicU64::new(0),
        }
    }

    pub fn client(&self) -> &ChatClient {
        &self.client
    }

    /// Send a user message. The reply is appended to the transcript only
    /// if no newer exchange was started while this one was in flight.
    pub async fn send(&self, text: &str) -> Result<ChatOutcome, RequestError> {
        let generation = self.latest.fetch_add(1, Ordering::SeqCst) + 1;
        let request_id = new_request_id();

        self.push_message(Role::User, text.to_string(), None);

        {
            let mut exchanges = self.exchanges.lock().unwrap_or_else(|e| e.into_inner());
            exchanges.push(ChatExchange {
                request_id: request_id.clone(),
                state: ExchangeState::Sent,
                sent_at: Instant::now(),
                timeout: self.client.current_timeout(),
            });
        }

        let slot = Arc::clone(&self.exchanges);
        let phase_request_id = request_id.clone();
        let on_phase = Box::new(move |phase: ExchangePhase| {
            let state = match phase {
                ExchangePhase::Sent => ExchangeState::Sent,
                ExchangePhase::WarmingUp => ExchangeState::WarmingUp,
                ExchangePhase::Succeeded => ExchangeState::Succeeded,
                ExchangePhase::Failed(_) => ExchangeState::Failed,
            };
            let mut exchanges = slot.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(ex) = exchanges
                .iter_mut()
                .find(|ex| ex.request_id == phase_request_id)
            {
                ex.state = state;
            }
        });

        let result = self.client.send_with_status(text, on_phase).await;

        if self.latest.load(Ordering::SeqCst) != generation {
            debug!(request_id = %request_id, "discarding stale chat response");
            return Ok(ChatOutcome::Stale);
        }

        match result {
            Ok(reply) => {
                self.push_message(Role::Assistant, reply.content.clone(), reply.agent.clone());
                Ok(ChatOutcome::Reply(reply))
            }
            Err(e) => Err(e),
        }
    }

    fn push_message(&self, role: Role, content: String, agent: Option<String>) {
        let mut messages = self.messages.lock().unwrap_or_else(|e| e.into_inner());
        messages.push(ChatMessage {
            id: new_id(),
            role,
            content,
            agent,
            timestamp: chrono::Utc::now().to_rfc3339(),
        });
    }

    /// The full conversation so far.
    pub fn transcript(&self) -> Vec<ChatMessage> {
        self.messages
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn message_count(&self) -> usize {
        self.messages
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    /// Record of the most recently started exchange.
    pub fn last_exchange(&self) -> Option<ChatExchange> {
        self.exchanges
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .last()
            .cloned()
    }

    /// Clear conversation history. Exchange records are kept.
    pub fn clear(&self) {
        self.messages
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }
}
