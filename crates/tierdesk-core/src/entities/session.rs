//! Session, message and customer entities

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use validator::Validate;

use super::escalation::RulePriority;

/// Session lifecycle status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Created and waiting in the queue
    Waiting,
    /// Assigned to an agent
    Active,
    /// Escalated and waiting for a higher-tier pickup
    Escalated,
    /// Resolved and closed
    Completed,
}

/// Customer segment tiers
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum CustomerTier {
    #[default]
    Standard,
    Premium,
    Vip,
    Urgent,
    NewClient,
}

/// Urgency declared at session creation
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    Low,
    #[default]
    Normal,
    High,
    Critical,
}

/// Customer identity attached to a session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Customer {
    pub id: String,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub tier: CustomerTier,
}

/// Inbound session-creation payload
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CustomerData {
    #[validate(length(min = 1, message = "customer name must not be empty"))]
    pub name: String,
    #[validate(email)]
    pub email: Option<String>,
    pub phone: Option<String>,
    #[serde(default)]
    pub tier: CustomerTier,
    #[serde(default)]
    pub urgency: Urgency,
    pub category: Option<String>,
}

/// Who authored a message
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    Customer,
    Agent,
    System,
}

/// Shape of an agent response, used by the stealth pacer to pick a
/// pacing pattern
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ResponseType {
    Greeting,
    SimpleAnswer,
    ComplexAnswer,
    Escalation,
}

/// A single message in a session's append-only log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub session_id: String,
    pub ts: DateTime<Utc>,
    pub role: MessageRole,
    pub content: String,
    pub agent_id: Option<String>,
    pub response_type: Option<ResponseType>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

/// Audit entry for a status transition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusChange {
    pub ts: DateTime<Utc>,
    pub from: SessionStatus,
    pub to: SessionStatus,
}

/// Audit entry for a tier promotion
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierChange {
    pub ts: DateTime<Utc>,
    pub from: u8,
    pub to: u8,
}

/// Per-session conversation state owned by the conversation runtime
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationContext {
    /// Prompt the runtime is currently driving
    pub active_prompt_id: String,
    /// 1-indexed pointer into the prompt's conversation flow
    pub current_step: usize,
    pub extracted_fields: HashMap<String, String>,
    pub customer_intent: Option<String>,
    pub issue_category: Option<String>,
    /// Total customer messages processed (the escalation quota counter)
    pub message_count: u32,
    pub escalation_triggers: Vec<String>,
    pub status_changes: Vec<StatusChange>,
    pub tier_changes: Vec<TierChange>,
}

impl ConversationContext {
    pub fn new<S: Into<String>>(prompt_id: S) -> Self {
        Self {
            active_prompt_id: prompt_id.into(),
            current_step: 1,
            extracted_fields: HashMap::new(),
            customer_intent: None,
            issue_category: None,
            message_count: 0,
            escalation_triggers: Vec::new(),
            status_changes: Vec::new(),
            tier_changes: Vec::new(),
        }
    }
}

/// Entry in a session's escalation history
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscalationRecord {
    pub ts: DateTime<Utc>,
    pub reason: String,
    pub from_tier: u8,
    pub to_tier: u8,
    pub rule_id: String,
    pub priority: RulePriority,
    /// Absolute deadline by which the escalated session must be picked up
    pub sla: DateTime<Utc>,
}

/// A customer's conversation from creation to completion
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub customer: Customer,
    pub status: SessionStatus,
    /// Required agent tier; starts at 1 and only increases
    pub tier: u8,
    /// Queue priority in [1, 10]; higher is served first
    pub priority: u8,
    pub category: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    pub assigned_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub assigned_agent_id: Option<String>,
    pub messages: Vec<Message>,
    pub context: ConversationContext,
    pub escalation_history: Vec<EscalationRecord>,
    pub escalation_reason: Option<String>,
    pub escalation_sla: Option<DateTime<Utc>>,
    pub resolution_time_ms: Option<i64>,
}

impl Session {
    /// Messages authored by the customer
    pub fn customer_message_count(&self) -> usize {
        self.messages
            .iter()
            .filter(|m| m.role == MessageRole::Customer)
            .count()
    }

    pub fn is_completed(&self) -> bool {
        self.status == SessionStatus::Completed
    }
}

/// Durable per-customer record, updated across sessions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomerProfile {
    pub id: String,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub first_contact: DateTime<Utc>,
    pub last_contact: DateTime<Utc>,
    pub total_sessions: u64,
    pub resolved_issues: u64,
    pub escalated_issues: u64,
    pub average_resolution_time_ms: f64,
    pub tags: Vec<String>,
    pub notes: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_customer_data_validation() {
        let data = CustomerData {
            name: "Maria Gomez".to_string(),
            email: Some("maria@example.com".to_string()),
            phone: None,
            tier: CustomerTier::Vip,
            urgency: Urgency::Normal,
            category: None,
        };
        assert!(data.validate().is_ok());

        let bad = CustomerData {
            name: "".to_string(),
            email: Some("not-an-email".to_string()),
            phone: None,
            tier: CustomerTier::Standard,
            urgency: Urgency::Normal,
            category: None,
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_unknown_tier_defaults_to_standard() {
        let json = r#"{"name": "Sam"}"#;
        let data: CustomerData = serde_json::from_str(json).unwrap();
        assert_eq!(data.tier, CustomerTier::Standard);
        assert_eq!(data.urgency, Urgency::Normal);
    }

    #[test]
    fn test_context_starts_at_step_one() {
        let ctx = ConversationContext::new("general-support");
        assert_eq!(ctx.current_step, 1);
        assert_eq!(ctx.message_count, 0);
        assert!(ctx.extracted_fields.is_empty());
    }

    #[test]
    fn test_status_serde_snake_case() {
        let json = serde_json::to_string(&SessionStatus::Waiting).unwrap();
        assert_eq!(json, r#""waiting""#);
    }
}
