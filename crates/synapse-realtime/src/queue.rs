//! Outbound action queue.
//!
//! Decouples user input cadence from network send cadence. Text edits and
//! cursor moves coalesce (only the newest unsent payload of each kind goes
//! out); comments and read-marks are appended and always delivered. The
//! queue is bounded with a drop-oldest policy so a long outage cannot grow
//! memory without limit.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use synapse_common::id::new_id;

use super::channel::RealtimeChannel;
use super::types::ClientFrame;

const DEFAULT_CAPACITY: usize = 256;
/// Floor between automatic flushes, roughly 20 Hz.
const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_millis(50);

/// A locally originated mutation not yet handed to the socket.
#[derive(Debug, Clone)]
pub struct PendingAction {
    pub action_id: String,
    pub frame: ClientFrame,
    pub enqueued_at: Instant,
}

/// Bounded, coalescing queue of [`PendingAction`]s for one channel.
pub struct ActionQueue {
    actions: VecDeque<PendingAction>,
    capacity: usize,
    min_flush_interval: Duration,
    last_flush: Option<Instant>,
}

impl ActionQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            actions: VecDeque::with_capacity(capacity.min(64)),
            capacity,
            min_flush_interval: DEFAULT_FLUSH_INTERVAL,
            last_flush: None,
        }
    }

    pub fn with_flush_interval(mut self, interval: Duration) -> Self {
        self.min_flush_interval = interval;
        self
    }

    /// Enqueue an action. `TextEdit` and `CursorMove` replace any unsent
    /// action of the same kind instead of stacking up per keystroke;
    /// `Comment` and `MarkRead` are appended.
    pub fn enqueue(&mut self, frame: ClientFrame) {
        let coalesce_slot = match frame {
            ClientFrame::TextEdit { .. } => self
                .actions
                .iter_mut()
                .find(|a| matches!(a.frame, ClientFrame::TextEdit { .. })),
            ClientFrame::CursorMove { .. } => self
                .actions
                .iter_mut()
                .find(|a| matches!(a.frame, ClientFrame::CursorMove { .. })),
            ClientFrame::Comment { .. } | ClientFrame::MarkRead { .. } => None,
        };

        if let Some(action) = coalesce_slot {
            action.frame = frame;
            action.enqueued_at = Instant::now();
            return;
        }

        if self.actions.len() >= self.capacity {
            if let Some(dropped) = self.actions.pop_front() {
                warn!(action_id = %dropped.action_id, "action queue full, dropping oldest");
            }
        }
        self.actions.push_back(PendingAction {
            action_id: new_id(),
            frame,
            enqueued_at: Instant::now(),
        });
    }

    /// Pop every queued action, in enqueue order, for callers that hand
    /// frames to their own transport.
    pub fn drain(&mut self) -> Vec<ClientFrame> {
        self.actions.drain(..).map(|a| a.frame).collect()
    }

    /// Send every queued action over `channel`, in enqueue order. If the
    /// channel is not open nothing is popped; actions wait for the reopen.
    pub async fn flush(&mut self, channel: &RealtimeChannel) -> usize {
        if !channel.is_open().await {
            debug!(
                queued = self.actions.len(),
                "channel not open, keeping actions queued"
            );
            return 0;
        }
        let mut sent = 0;
        while let Some(action) = self.actions.pop_front() {
            channel.send(action.frame).await;
            sent += 1;
        }
        if sent > 0 {
            self.last_flush = Some(Instant::now());
        }
        sent
    }

    /// Like `flush`, but a no-op when called again within the flush
    /// interval. Bounds network chatter for per-keystroke callers.
    pub async fn flush_throttled(&mut self, channel: &RealtimeChannel) -> usize {
        if let Some(last) = self.last_flush {
            if last.elapsed() < self.min_flush_interval {
                return 0;
            }
        }
        self.flush(channel).await
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn clear(&mut self) {
        self.actions.clear();
    }
}

impl Default for ActionQueue {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
