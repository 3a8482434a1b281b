//! In-process typed event bus
//!
//! Named events with typed payloads, delivered at least once to every
//! current subscriber in publication order per publisher. The bus is not a
//! persistence mechanism; subscribers must be non-blocking, which the
//! unbounded channels guarantee on the publishing side.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::RwLock;
use tokio::sync::mpsc;
use tracing::debug;

use crate::entities::session::ResponseType;

/// Every event the engine publishes
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    SessionCreated {
        session_id: String,
        customer_id: String,
        priority: u8,
        ts: DateTime<Utc>,
    },
    SessionEnqueued {
        session_id: String,
        priority: u8,
        ts: DateTime<Utc>,
    },
    SessionAssigned {
        session_id: String,
        agent_id: String,
        agent_tier: u8,
        ts: DateTime<Utc>,
    },
    SessionUpdated {
        session_id: String,
        ts: DateTime<Utc>,
    },
    SessionCompleted {
        session_id: String,
        resolution_time_ms: i64,
        ts: DateTime<Utc>,
    },
    SessionEscalated {
        session_id: String,
        rule_id: String,
        reason: String,
        from_tier: u8,
        to_tier: u8,
        sla: DateTime<Utc>,
        ts: DateTime<Utc>,
    },
    SlaBreach {
        session_id: String,
        sla: DateTime<Utc>,
        overdue_ms: i64,
        ts: DateTime<Utc>,
    },
    TypingStart {
        session_id: String,
        agent_id: String,
        ts: DateTime<Utc>,
    },
    TypingProgress {
        session_id: String,
        elapsed_ms: u64,
        ts: DateTime<Utc>,
    },
    TypingEnd {
        session_id: String,
        ts: DateTime<Utc>,
    },
    ResponseReady {
        session_id: String,
        agent_id: String,
        content: String,
        response_type: ResponseType,
        ts: DateTime<Utc>,
    },
    EvaluationCreated {
        evaluation_id: String,
        interaction_id: String,
        scorecard_id: String,
        ts: DateTime<Utc>,
    },
    CriterionScored {
        evaluation_id: String,
        criterion_id: String,
        score: f64,
        ts: DateTime<Utc>,
    },
    EvaluationCompleted {
        evaluation_id: String,
        weighted_score: f64,
        passed: bool,
        ts: DateTime<Utc>,
    },
    CalibrationRequired {
        evaluation_id: String,
        qa_agent_id: String,
        deviation: f64,
        ts: DateTime<Utc>,
    },
}

impl EngineEvent {
    /// Stable event-kind name, matching the serde tag
    pub fn kind(&self) -> &'static str {
        match self {
            EngineEvent::SessionCreated { .. } => "session_created",
            EngineEvent::SessionEnqueued { .. } => "session_enqueued",
            EngineEvent::SessionAssigned { .. } => "session_assigned",
            EngineEvent::SessionUpdated { .. } => "session_updated",
            EngineEvent::SessionCompleted { .. } => "session_completed",
            EngineEvent::SessionEscalated { .. } => "session_escalated",
            EngineEvent::SlaBreach { .. } => "sla_breach",
            EngineEvent::TypingStart { .. } => "typing_start",
            EngineEvent::TypingProgress { .. } => "typing_progress",
            EngineEvent::TypingEnd { .. } => "typing_end",
            EngineEvent::ResponseReady { .. } => "response_ready",
            EngineEvent::EvaluationCreated { .. } => "evaluation_created",
            EngineEvent::CriterionScored { .. } => "criterion_scored",
            EngineEvent::EvaluationCompleted { .. } => "evaluation_completed",
            EngineEvent::CalibrationRequired { .. } => "calibration_required",
        }
    }

    /// Session the event belongs to, if any
    pub fn session_id(&self) -> Option<&str> {
        match self {
            EngineEvent::SessionCreated { session_id, .. }
            | EngineEvent::SessionEnqueued { session_id, .. }
            | EngineEvent::SessionAssigned { session_id, .. }
            | EngineEvent::SessionUpdated { session_id, .. }
            | EngineEvent::SessionCompleted { session_id, .. }
            | EngineEvent::SessionEscalated { session_id, .. }
            | EngineEvent::SlaBreach { session_id, .. }
            | EngineEvent::TypingStart { session_id, .. }
            | EngineEvent::TypingProgress { session_id, .. }
            | EngineEvent::TypingEnd { session_id, .. }
            | EngineEvent::ResponseReady { session_id, .. } => Some(session_id),
            _ => None,
        }
    }
}

/// Fan-out publish/subscribe hub
pub struct EventBus {
    subscribers: RwLock<Vec<mpsc::UnboundedSender<EngineEvent>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            subscribers: RwLock::new(Vec::new()),
        }
    }

    /// Register a subscriber. Every event published after this call is
    /// delivered to the returned receiver in publication order.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<EngineEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.write().unwrap().push(tx);
        rx
    }

    /// Publish to all live subscribers; dropped receivers are pruned.
    pub fn publish(&self, event: EngineEvent) {
        debug!(kind = event.kind(), "publishing event");
        let mut subscribers = self.subscribers.write().unwrap();
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().unwrap().len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
