//! Priority-ordered waiting list for sessions
//!
//! The queue holds ids of waiting sessions ordered by descending priority,
//! ties broken by ascending creation time (FIFO within a priority band).
//! The dispatcher owns the writer role; reads return snapshots.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::debug;

/// One waiting session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuedSession {
    pub session_id: String,
    pub priority: u8,
    pub created_at: DateTime<Utc>,
    pub enqueued_at: DateTime<Utc>,
}

/// The priority queue. Exactly one entry per waiting session.
pub struct SessionQueue {
    entries: RwLock<Vec<QueuedSession>>,
}

impl SessionQueue {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
        }
    }

    /// Insert or re-insert a session. An existing entry for the same
    /// session is removed first, so escalation and priority changes
    /// re-place the session under its current priority.
    pub async fn enqueue(&self, session_id: &str, priority: u8, created_at: DateTime<Utc>) {
        let mut entries = self.entries.write().await;
        entries.retain(|e| e.session_id != session_id);

        let entry = QueuedSession {
            session_id: session_id.to_string(),
            priority,
            created_at,
            enqueued_at: Utc::now(),
        };

        // First position with strictly lower priority, or with equal
        // priority and a later creation time (FIFO within the band).
        let position = entries
            .iter()
            .position(|e| {
                e.priority < priority
                    || (e.priority == priority && e.created_at > created_at)
            })
            .unwrap_or(entries.len());
        entries.insert(position, entry);
        debug!(session_id, priority, position, "session enqueued");
    }

    /// Remove a session wherever it sits; true if it was present.
    pub async fn remove(&self, session_id: &str) -> bool {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|e| e.session_id != session_id);
        entries.len() < before
    }

    /// Highest-priority waiter without removing it.
    pub async fn peek(&self) -> Option<QueuedSession> {
        self.entries.read().await.first().cloned()
    }

    /// Remove and return the highest-priority waiter.
    pub async fn pop(&self) -> Option<QueuedSession> {
        let mut entries = self.entries.write().await;
        if entries.is_empty() {
            None
        } else {
            Some(entries.remove(0))
        }
    }

    /// Push a previously popped entry back at the position its priority
    /// and creation time dictate.
    pub async fn push_back(&self, entry: QueuedSession) {
        self.enqueue(&entry.session_id, entry.priority, entry.created_at)
            .await;
    }

    /// 1-indexed queue position, or None if the session is not waiting.
    pub async fn position(&self, session_id: &str) -> Option<usize> {
        self.entries
            .read()
            .await
            .iter()
            .position(|e| e.session_id == session_id)
            .map(|p| p + 1)
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Ordered snapshot of the current queue.
    pub async fn snapshot(&self) -> Vec<QueuedSession> {
        self.entries.read().await.clone()
    }
}

impl Default for SessionQueue {
    fn default() -> Self {
        Self::new()
    }
}
